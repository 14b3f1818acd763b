//! Lot ledger
//!
//! Lots record discrete received batches under a catalog entry. The
//! entry's aggregate quantity stays authoritative for availability; the
//! ledger drives FIFO depletion and expiry tracking, and the audit
//! operations surface any drift between the two.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};
use shared::models::{generate_lot_number, Lot};
use shared::validation::validate_lot_number;

const MAX_GENERATION_ATTEMPTS: usize = 16;

#[derive(Clone)]
pub struct LotService {
    db: PgPool,
    inventory: InventoryConfig,
}

#[derive(Debug, Deserialize)]
pub struct CreateLotInput {
    pub catalog_entry_id: Uuid,
    pub quantity: i32,
    /// Supplier-provided number; unset numbers are generated
    pub lot_number: Option<String>,
    pub expires_on: Option<NaiveDate>,
    /// Price snapshots; default to the parent entry's cached prices
    pub unit_cost: Option<Decimal>,
    pub sale_price: Option<Decimal>,
}

/// Aggregate quantity vs the lot ledger for one catalog entry
#[derive(Debug, Clone, Serialize)]
pub struct StockAudit {
    pub catalog_entry_id: Uuid,
    pub name: String,
    pub aggregate_quantity: i32,
    pub lot_quantity: i32,
    /// `aggregate_quantity - lot_quantity`; zero when the ledger matches
    pub drift: i32,
}

const LOT_COLUMNS: &str =
    "id, catalog_entry_id, lot_number, expires_on, entered_on, quantity, unit_cost, sale_price, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct LotRow {
    id: Uuid,
    catalog_entry_id: Uuid,
    lot_number: String,
    expires_on: NaiveDate,
    entered_on: NaiveDate,
    quantity: i32,
    unit_cost: Option<Decimal>,
    sale_price: Option<Decimal>,
    updated_at: DateTime<Utc>,
}

impl LotRow {
    fn into_model(self) -> Lot {
        Lot {
            id: self.id,
            catalog_entry_id: self.catalog_entry_id,
            lot_number: self.lot_number,
            expires_on: self.expires_on,
            entered_on: self.entered_on,
            quantity: self.quantity,
            unit_cost: self.unit_cost,
            sale_price: self.sale_price,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    catalog_entry_id: Uuid,
    name: String,
    aggregate_quantity: i32,
    lot_quantity: i32,
}

impl AuditRow {
    fn into_audit(self) -> StockAudit {
        StockAudit {
            catalog_entry_id: self.catalog_entry_id,
            name: self.name,
            aggregate_quantity: self.aggregate_quantity,
            lot_quantity: self.lot_quantity,
            drift: self.aggregate_quantity - self.lot_quantity,
        }
    }
}

impl LotService {
    pub fn new(db: PgPool, inventory: InventoryConfig) -> Self {
        Self { db, inventory }
    }

    /// Record a received batch under a catalog entry
    ///
    /// Creating a lot does not touch the entry's aggregate quantity;
    /// receiving does that as part of its own transaction.
    pub async fn create_lot(&self, pharmacy_id: Uuid, input: CreateLotInput) -> AppResult<Lot> {
        if input.quantity < 0 {
            return Err(AppError::Validation {
                field: "quantity".to_string(),
                message: "Lot quantity cannot be negative".to_string(),
            });
        }

        // Validate tenancy and grab the entry prices to snapshot
        let entry = sqlx::query_as::<_, (Decimal, Option<Decimal>)>(
            "SELECT unit_cost, sale_price FROM catalog_entries WHERE id = $1 AND pharmacy_id = $2",
        )
        .bind(input.catalog_entry_id)
        .bind(pharmacy_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Catalog entry".to_string()))?;

        let lot_number = match input.lot_number {
            Some(number) => {
                let number = number.trim().to_string();
                validate_lot_number(&number).map_err(|msg| AppError::Validation {
                    field: "lot_number".to_string(),
                    message: msg.to_string(),
                })?;
                if self.lot_number_taken(&number).await? {
                    return Err(AppError::DuplicateEntry(format!(
                        "Lot number {} is already in use",
                        number
                    )));
                }
                number
            }
            None => self.generate_unique_lot_number().await?,
        };

        let expires_on = input
            .expires_on
            .unwrap_or_else(|| Utc::now().date_naive() + Duration::days(self.inventory.lot_expiry_days));
        let unit_cost = input.unit_cost.unwrap_or(entry.0);
        let sale_price = input.sale_price.or(entry.1);

        let query = format!(
            r#"
            INSERT INTO lots (catalog_entry_id, lot_number, expires_on, entered_on, quantity, unit_cost, sale_price)
            VALUES ($1, $2, $3, CURRENT_DATE, $4, $5, $6)
            RETURNING {LOT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, LotRow>(&query)
            .bind(input.catalog_entry_id)
            .bind(&lot_number)
            .bind(expires_on)
            .bind(input.quantity)
            .bind(unit_cost)
            .bind(sale_price)
            .fetch_one(&self.db)
            .await?;

        Ok(row.into_model())
    }

    /// Lots of an entry in FIFO order, oldest entry date first
    pub async fn lots_for_entry(&self, pharmacy_id: Uuid, entry_id: Uuid) -> AppResult<Vec<Lot>> {
        self.ensure_entry(pharmacy_id, entry_id).await?;

        let query = format!(
            "SELECT {LOT_COLUMNS} FROM lots WHERE catalog_entry_id = $1 ORDER BY entered_on, updated_at"
        );
        let rows = sqlx::query_as::<_, LotRow>(&query)
            .bind(entry_id)
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(LotRow::into_model).collect())
    }

    /// Apply a manual correction to a lot's quantity, clamped at zero
    pub async fn adjust_quantity(
        &self,
        pharmacy_id: Uuid,
        lot_id: Uuid,
        delta: i32,
    ) -> AppResult<Lot> {
        // Start transaction
        let mut tx = self.db.begin().await?;

        let quantity = sqlx::query_scalar::<_, i32>(
            r#"
            SELECT l.quantity
            FROM lots l
            JOIN catalog_entries e ON e.id = l.catalog_entry_id
            WHERE l.id = $1 AND e.pharmacy_id = $2
            FOR UPDATE OF l
            "#,
        )
        .bind(lot_id)
        .bind(pharmacy_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Lot".to_string()))?;

        let new_quantity = (quantity + delta).max(0);

        let query = format!(
            "UPDATE lots SET quantity = $1, updated_at = NOW() WHERE id = $2 RETURNING {LOT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, LotRow>(&query)
            .bind(new_quantity)
            .bind(lot_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        if new_quantity != quantity + delta {
            tracing::warn!(lot_id = %lot_id, delta, "Lot adjustment clamped at zero");
        }

        Ok(row.into_model())
    }

    /// Compare one entry's aggregate quantity against its lot ledger
    pub async fn audit_stock(&self, pharmacy_id: Uuid, entry_id: Uuid) -> AppResult<StockAudit> {
        let row = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT e.id AS catalog_entry_id, e.name, e.quantity AS aggregate_quantity,
                   COALESCE(SUM(l.quantity), 0)::int AS lot_quantity
            FROM catalog_entries e
            LEFT JOIN lots l ON l.catalog_entry_id = e.id
            WHERE e.id = $1 AND e.pharmacy_id = $2
            GROUP BY e.id, e.name, e.quantity
            "#,
        )
        .bind(entry_id)
        .bind(pharmacy_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Catalog entry".to_string()))?;

        Ok(row.into_audit())
    }

    /// Audit every entry of a pharmacy
    pub async fn audit_pharmacy(&self, pharmacy_id: Uuid) -> AppResult<Vec<StockAudit>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT e.id AS catalog_entry_id, e.name, e.quantity AS aggregate_quantity,
                   COALESCE(SUM(l.quantity), 0)::int AS lot_quantity
            FROM catalog_entries e
            LEFT JOIN lots l ON l.catalog_entry_id = e.id
            WHERE e.pharmacy_id = $1
            GROUP BY e.id, e.name, e.quantity
            ORDER BY e.name
            "#,
        )
        .bind(pharmacy_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(AuditRow::into_audit).collect())
    }

    /// Still-stocked lots expiring within the given number of days
    pub async fn expiring_lots(&self, pharmacy_id: Uuid, within_days: i32) -> AppResult<Vec<Lot>> {
        let query = format!(
            r#"
            SELECT {LOT_COLUMNS} FROM lots
            WHERE catalog_entry_id IN (SELECT id FROM catalog_entries WHERE pharmacy_id = $1)
              AND quantity > 0
              AND expires_on <= CURRENT_DATE + $2
            ORDER BY expires_on
            "#
        );
        let rows = sqlx::query_as::<_, LotRow>(&query)
            .bind(pharmacy_id)
            .bind(within_days)
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(LotRow::into_model).collect())
    }

    async fn ensure_entry(&self, pharmacy_id: Uuid, entry_id: Uuid) -> AppResult<()> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM catalog_entries WHERE id = $1 AND pharmacy_id = $2)",
        )
        .bind(entry_id)
        .bind(pharmacy_id)
        .fetch_one(&self.db)
        .await?;

        if !exists {
            return Err(AppError::NotFound("Catalog entry".to_string()));
        }

        Ok(())
    }

    async fn lot_number_taken(&self, number: &str) -> AppResult<bool> {
        let taken =
            sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM lots WHERE lot_number = $1)")
                .bind(number)
                .fetch_one(&self.db)
                .await?;

        Ok(taken)
    }

    async fn generate_unique_lot_number(&self) -> AppResult<String> {
        for _ in 0..MAX_GENERATION_ATTEMPTS {
            let candidate = {
                let mut rng = rand::thread_rng();
                generate_lot_number(&mut rng)
            };

            if !self.lot_number_taken(&candidate).await? {
                return Ok(candidate);
            }
        }

        Err(AppError::Internal(
            "Could not generate a unique lot number".to_string(),
        ))
    }
}
