//! Bidirectional sync engine
//!
//! Reconciles a local pharmacy instance with the remote server by walking
//! the shared entity registry twice per cycle, once in each direction.
//! Rows travel as `to_jsonb` documents and land via
//! `jsonb_populate_record`, so the engine never needs per-entity code.
//! Timestamps are copied verbatim; last-writer-wins comparisons only ever
//! look at `updated_at`.
//!
//! Watermarks live in the local `sync_state` table, one per entity and
//! direction, and advance to the pass start time so rows written during a
//! pass are picked up by the next one. A failure on one row or one entity
//! never stops the rest of the pass.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppResult;
use shared::sync::{decide_row_action, SyncAction, SyncDirection, SyncEntity, SYNC_REGISTRY};

#[derive(Clone)]
pub struct SyncService {
    local: PgPool,
    remote: PgPool,
    /// Restricts pharmacy-scoped entities to one pharmacy; None syncs all
    pharmacy_id: Option<Uuid>,
}

/// Row counts for one entity in one pass
#[derive(Debug, Clone, Serialize)]
pub struct EntityReport {
    pub table: &'static str,
    pub inserted: u64,
    pub overwritten: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl EntityReport {
    fn new(table: &'static str) -> Self {
        Self {
            table,
            inserted: 0,
            overwritten: 0,
            skipped: 0,
            failed: 0,
        }
    }
}

/// Outcome of one directional pass over the whole registry
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub entities: Vec<EntityReport>,
    /// Entities whose pass failed outright, by table name
    pub failed_entities: Vec<&'static str>,
}

impl SyncReport {
    pub fn inserted(&self) -> u64 {
        self.entities.iter().map(|entity| entity.inserted).sum()
    }

    pub fn overwritten(&self) -> u64 {
        self.entities.iter().map(|entity| entity.overwritten).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.entities.iter().map(|entity| entity.skipped).sum()
    }

    pub fn failed_rows(&self) -> u64 {
        self.entities.iter().map(|entity| entity.failed).sum()
    }
}

type SourceRow = (Uuid, Option<DateTime<Utc>>, serde_json::Value);

impl SyncService {
    pub fn new(local: PgPool, remote: PgPool, pharmacy_id: Option<Uuid>) -> Self {
        Self {
            local,
            remote,
            pharmacy_id,
        }
    }

    /// Push local changes up, then pull remote changes down
    pub async fn run_cycle(&self) -> (SyncReport, SyncReport) {
        let push = self.run_pass(SyncDirection::Push).await;
        let pull = self.run_pass(SyncDirection::Pull).await;
        (push, pull)
    }

    /// One directional pass over every registered entity
    pub async fn run_pass(&self, direction: SyncDirection) -> SyncReport {
        let mut report = SyncReport {
            direction,
            entities: Vec::with_capacity(SYNC_REGISTRY.len()),
            failed_entities: Vec::new(),
        };

        for entity in SYNC_REGISTRY {
            match self.reconcile_entity(entity, direction).await {
                Ok(entity_report) => {
                    if entity_report.inserted + entity_report.overwritten + entity_report.failed > 0
                    {
                        tracing::debug!(
                            table = entity.table,
                            direction = %direction,
                            inserted = entity_report.inserted,
                            overwritten = entity_report.overwritten,
                            skipped = entity_report.skipped,
                            failed = entity_report.failed,
                            "Reconciled entity"
                        );
                    }
                    report.entities.push(entity_report);
                }
                Err(err) => {
                    tracing::error!(
                        table = entity.table,
                        direction = %direction,
                        error = %err,
                        "Entity pass failed; continuing with the next"
                    );
                    report.failed_entities.push(entity.table);
                }
            }
        }

        tracing::info!(
            direction = %direction,
            inserted = report.inserted(),
            overwritten = report.overwritten(),
            skipped = report.skipped(),
            failed_rows = report.failed_rows(),
            failed_entities = report.failed_entities.len(),
            "Sync pass finished"
        );

        report
    }

    async fn reconcile_entity(
        &self,
        entity: &'static SyncEntity,
        direction: SyncDirection,
    ) -> AppResult<EntityReport> {
        let (source, target) = match direction {
            SyncDirection::Push => (&self.local, &self.remote),
            SyncDirection::Pull => (&self.remote, &self.local),
        };

        // Captured before reading so rows written mid-pass are not lost
        let pass_started = Utc::now();

        let scope_bind = self
            .pharmacy_id
            .filter(|_| entity.scope.predicate().is_some());
        let scoped = scope_bind.is_some();

        let watermark = if entity.has_updated_at {
            self.last_synced_at(entity.table, direction).await?
        } else {
            None
        };

        let query = source_query(entity, scoped, watermark.is_some());
        let mut source_rows = sqlx::query_as::<_, SourceRow>(&query);
        if let Some(pharmacy_id) = scope_bind {
            source_rows = source_rows.bind(pharmacy_id);
        }
        if let Some(watermark) = watermark {
            source_rows = source_rows.bind(watermark);
        }
        let rows = source_rows.fetch_all(source).await?;

        let mut entity_report = EntityReport::new(entity.table);
        if rows.is_empty() {
            if entity.has_updated_at {
                self.store_watermark(entity.table, direction, pass_started)
                    .await?;
            }
            return Ok(entity_report);
        }

        // Target-side id and timestamp inventory for the conflict decision
        let query = target_state_query(entity, scoped);
        let mut target_rows = sqlx::query_as::<_, (Uuid, Option<DateTime<Utc>>)>(&query);
        if let Some(pharmacy_id) = scope_bind {
            target_rows = target_rows.bind(pharmacy_id);
        }
        let target_state: HashMap<Uuid, Option<DateTime<Utc>>> =
            target_rows.fetch_all(target).await?.into_iter().collect();

        let insert_sql = insert_statement(entity);
        let update_sql = update_statement(entity);

        for (id, source_updated_at, doc) in rows {
            let target_updated_at = target_state.get(&id).copied();
            let action = decide_row_action(
                target_updated_at.is_some(),
                entity.has_updated_at,
                source_updated_at,
                target_updated_at.flatten(),
            );

            let applied = match action {
                SyncAction::Insert => sqlx::query(&insert_sql).bind(&doc).execute(target).await,
                SyncAction::Overwrite => {
                    sqlx::query(&update_sql)
                        .bind(&doc)
                        .bind(id)
                        .execute(target)
                        .await
                }
                SyncAction::Skip => {
                    entity_report.skipped += 1;
                    continue;
                }
            };

            match applied {
                Ok(_) => match action {
                    SyncAction::Insert => entity_report.inserted += 1,
                    _ => entity_report.overwritten += 1,
                },
                Err(err) => {
                    tracing::warn!(
                        table = entity.table,
                        row_id = %id,
                        error = %err,
                        "Failed to apply row; continuing"
                    );
                    entity_report.failed += 1;
                }
            }
        }

        if entity.has_updated_at {
            self.store_watermark(entity.table, direction, pass_started)
                .await?;
        }

        Ok(entity_report)
    }

    async fn last_synced_at(
        &self,
        entity: &str,
        direction: SyncDirection,
    ) -> AppResult<Option<DateTime<Utc>>> {
        let watermark = sqlx::query_scalar::<_, DateTime<Utc>>(
            "SELECT last_synced_at FROM sync_state WHERE entity = $1 AND direction = $2",
        )
        .bind(entity)
        .bind(direction.as_str())
        .fetch_optional(&self.local)
        .await?;

        Ok(watermark)
    }

    async fn store_watermark(
        &self,
        entity: &str,
        direction: SyncDirection,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_state (entity, direction, last_synced_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (entity, direction) DO UPDATE SET last_synced_at = $3
            "#,
        )
        .bind(entity)
        .bind(direction.as_str())
        .bind(at)
        .execute(&self.local)
        .await?;

        Ok(())
    }
}

/// Changed-row query against the source side
///
/// Create-once entities select a NULL timestamp so every row decodes the
/// same shape. The pharmacy filter always binds `$1`, pushing a watermark
/// bind to `$2`.
fn source_query(entity: &SyncEntity, scoped: bool, with_watermark: bool) -> String {
    let timestamp = if entity.has_updated_at {
        "t.updated_at"
    } else {
        "NULL::timestamptz"
    };
    let mut sql = format!(
        "SELECT t.id, {} AS updated_at, to_jsonb(t) AS doc FROM {} t",
        timestamp, entity.table
    );

    let mut conditions = Vec::new();
    if scoped {
        if let Some(predicate) = entity.scope.predicate() {
            conditions.push(predicate.to_string());
        }
    }
    if with_watermark {
        let slot = if scoped { 2 } else { 1 };
        conditions.push(format!("t.updated_at > ${}", slot));
    }
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }

    sql.push_str(" ORDER BY t.id");
    sql
}

/// Id and timestamp inventory of the target side
fn target_state_query(entity: &SyncEntity, scoped: bool) -> String {
    let timestamp = if entity.has_updated_at {
        "updated_at"
    } else {
        "NULL::timestamptz AS updated_at"
    };
    let mut sql = format!("SELECT id, {} FROM {}", timestamp, entity.table);

    if scoped {
        if let Some(predicate) = entity.scope.predicate() {
            sql.push_str(" WHERE ");
            sql.push_str(predicate);
        }
    }

    sql
}

fn insert_statement(entity: &SyncEntity) -> String {
    let columns = entity.column_list();
    format!(
        "INSERT INTO {table} ({columns}) SELECT {columns} FROM jsonb_populate_record(NULL::{table}, $1)",
        table = entity.table,
        columns = columns,
    )
}

fn update_statement(entity: &SyncEntity) -> String {
    let assignments: Vec<String> = entity
        .columns
        .iter()
        .filter(|column| **column != "id")
        .map(|column| format!("{column} = r.{column}"))
        .collect();

    format!(
        "UPDATE {table} SET {assignments} FROM jsonb_populate_record(NULL::{table}, $1) AS r WHERE {table}.id = $2",
        table = entity.table,
        assignments = assignments.join(", "),
    )
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use shared::sync::sync_entity;

    #[test]
    fn test_source_query_global_without_watermark() {
        let entity = sync_entity("manufacturers").unwrap();
        assert_eq!(
            source_query(entity, false, false),
            "SELECT t.id, t.updated_at AS updated_at, to_jsonb(t) AS doc FROM manufacturers t ORDER BY t.id"
        );
    }

    #[test]
    fn test_source_query_scoped_with_watermark_binds_in_order() {
        let entity = sync_entity("catalog_entries").unwrap();
        let sql = source_query(entity, true, true);
        assert!(sql.contains("WHERE pharmacy_id = $1 AND t.updated_at > $2"));
    }

    #[test]
    fn test_source_query_watermark_slot_shifts_without_scope() {
        let entity = sync_entity("exchange_rates").unwrap();
        let sql = source_query(entity, false, true);
        assert!(sql.contains("WHERE t.updated_at > $1"));
    }

    #[test]
    fn test_source_query_create_once_selects_null_timestamp() {
        let entity = sync_entity("pharmacies").unwrap();
        let sql = source_query(entity, false, false);
        assert!(sql.contains("NULL::timestamptz AS updated_at"));
        assert!(!sql.contains("t.updated_at"));
    }

    #[test]
    fn test_target_state_query_scoped() {
        let entity = sync_entity("users").unwrap();
        assert_eq!(
            target_state_query(entity, true),
            "SELECT id, NULL::timestamptz AS updated_at FROM users WHERE pharmacy_id = $1"
        );
    }

    #[test]
    fn test_insert_statement_lists_columns_on_both_sides() {
        let entity = sync_entity("manufacturers").unwrap();
        assert_eq!(
            insert_statement(entity),
            "INSERT INTO manufacturers (id, name, country, updated_at) \
             SELECT id, name, country, updated_at FROM jsonb_populate_record(NULL::manufacturers, $1)"
        );
    }

    #[test]
    fn test_update_statement_exact_shape() {
        let entity = sync_entity("exchange_rates").unwrap();
        assert_eq!(
            update_statement(entity),
            "UPDATE exchange_rates SET rate = r.rate, rate_date = r.rate_date, \
             updated_at = r.updated_at FROM jsonb_populate_record(NULL::exchange_rates, $1) AS r \
             WHERE exchange_rates.id = $2"
        );
    }

    #[test]
    fn test_update_statement_never_reassigns_id() {
        for entity in SYNC_REGISTRY {
            let sql = update_statement(entity);
            assert!(
                !sql.contains("id = r.id,") && !sql.contains("SET id = r.id"),
                "{} reassigns its primary key",
                entity.table
            );
        }
    }
}
