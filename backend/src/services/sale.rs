//! Point of sale
//!
//! A sale is validated in full before anything is written: every line
//! checked against tenancy, pricing and the aggregate quantity under row
//! locks, then executed in the same transaction. Lot depletion follows
//! FIFO on entry date; what happens when the ledger cannot cover a line
//! is governed by the configured shortfall policy.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{InventoryConfig, ShortfallPolicy};
use crate::error::{AppError, AppResult};
use shared::models::{line_total, loyalty_points, plan_depletion, Sale, SaleLine};
use shared::types::Pagination;
use shared::validation::validate_positive_quantity;

#[derive(Clone)]
pub struct SaleService {
    db: PgPool,
    inventory: InventoryConfig,
}

#[derive(Debug, Deserialize)]
pub struct CreateSaleInput {
    /// Cashier recording the sale
    pub user_id: Option<Uuid>,
    /// Registered client earning loyalty points
    pub client_id: Option<Uuid>,
    pub lines: Vec<SaleLineInput>,
}

#[derive(Debug, Deserialize)]
pub struct SaleLineInput {
    pub catalog_entry_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct SaleOutcome {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
    /// Ledger gaps reconciled during depletion
    pub shortfalls: Vec<ShortfallNote>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShortfallNote {
    pub catalog_entry_id: Uuid,
    pub shortfall: i32,
}

#[derive(Debug, Serialize)]
pub struct SaleWithLines {
    pub sale: Sale,
    pub lines: Vec<SaleLine>,
}

const SALE_COLUMNS: &str = "id, pharmacy_id, client_id, user_id, total, sold_at, updated_at";
const SALE_LINE_COLUMNS: &str =
    "id, sale_id, catalog_entry_id, quantity, unit_price, line_total, updated_at";

type SaleRow = (
    Uuid,
    Uuid,
    Option<Uuid>,
    Option<Uuid>,
    Decimal,
    DateTime<Utc>,
    DateTime<Utc>,
);

fn sale_from_row(row: SaleRow) -> Sale {
    Sale {
        id: row.0,
        pharmacy_id: row.1,
        client_id: row.2,
        user_id: row.3,
        total: row.4,
        sold_at: row.5,
        updated_at: row.6,
    }
}

type SaleLineRow = (Uuid, Uuid, Uuid, i32, Decimal, Decimal, DateTime<Utc>);

fn sale_line_from_row(row: SaleLineRow) -> SaleLine {
    SaleLine {
        id: row.0,
        sale_id: row.1,
        catalog_entry_id: row.2,
        quantity: row.3,
        unit_price: row.4,
        line_total: row.5,
        updated_at: row.6,
    }
}

/// A sale line after validation, ready to execute
struct ValidatedLine {
    catalog_entry_id: Uuid,
    quantity: i32,
    unit_price: Decimal,
}

impl SaleService {
    pub fn new(db: PgPool, inventory: InventoryConfig) -> Self {
        Self { db, inventory }
    }

    /// Record a sale
    ///
    /// Either every line lands, with its stock decrements, lot draws and
    /// loyalty credit, or nothing does.
    pub async fn create_sale(
        &self,
        pharmacy_id: Uuid,
        input: CreateSaleInput,
    ) -> AppResult<SaleOutcome> {
        // Validate shape before touching the database
        if input.lines.is_empty() {
            return Err(AppError::Validation {
                field: "lines".to_string(),
                message: "A sale needs at least one line".to_string(),
            });
        }
        let mut seen = HashSet::new();
        for line in &input.lines {
            validate_positive_quantity(line.quantity).map_err(|msg| AppError::Validation {
                field: "quantity".to_string(),
                message: msg.to_string(),
            })?;
            if !seen.insert(line.catalog_entry_id) {
                return Err(AppError::Validation {
                    field: "lines".to_string(),
                    message: "The same catalog entry appears on several lines".to_string(),
                });
            }
        }

        // Start transaction
        let mut tx = self.db.begin().await?;

        if let Some(client_id) = input.client_id {
            let owned = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM clients WHERE id = $1 AND pharmacy_id = $2)",
            )
            .bind(client_id)
            .bind(pharmacy_id)
            .fetch_one(&mut *tx)
            .await?;
            if !owned {
                return Err(AppError::Validation {
                    field: "client_id".to_string(),
                    message: "Client does not belong to this pharmacy".to_string(),
                });
            }
        }

        if let Some(user_id) = input.user_id {
            let owned = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM users WHERE id = $1 AND pharmacy_id = $2)",
            )
            .bind(user_id)
            .bind(pharmacy_id)
            .fetch_one(&mut *tx)
            .await?;
            if !owned {
                return Err(AppError::Validation {
                    field: "user_id".to_string(),
                    message: "User does not belong to this pharmacy".to_string(),
                });
            }
        }

        // Validate every line under row locks before mutating anything
        let mut validated = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let entry = sqlx::query_as::<_, (String, i32, Option<Decimal>)>(
                r#"
                SELECT name, quantity, sale_price FROM catalog_entries
                WHERE id = $1 AND pharmacy_id = $2
                FOR UPDATE
                "#,
            )
            .bind(line.catalog_entry_id)
            .bind(pharmacy_id)
            .fetch_optional(&mut *tx)
            .await?;

            let (name, available, sale_price) = entry.ok_or_else(|| AppError::Validation {
                field: "catalog_entry_id".to_string(),
                message: "Catalog entry does not belong to this pharmacy".to_string(),
            })?;

            let unit_price = sale_price.ok_or_else(|| AppError::Validation {
                field: "sale_price".to_string(),
                message: format!("{} has no sale price yet", name),
            })?;

            if available < line.quantity {
                return Err(AppError::InsufficientStock(format!(
                    "{}: requested {}, available {}",
                    name, line.quantity, available
                )));
            }

            validated.push(ValidatedLine {
                catalog_entry_id: line.catalog_entry_id,
                quantity: line.quantity,
                unit_price,
            });
        }

        // Execute: decrement aggregates, deplete lots FIFO
        let mut total = Decimal::ZERO;
        let mut totals = Vec::with_capacity(validated.len());
        let mut shortfalls = Vec::new();
        for line in &validated {
            sqlx::query(
                "UPDATE catalog_entries SET quantity = quantity - $1, updated_at = NOW() WHERE id = $2",
            )
            .bind(line.quantity)
            .bind(line.catalog_entry_id)
            .execute(&mut *tx)
            .await?;

            let lots = sqlx::query_as::<_, (Uuid, i32)>(
                r#"
                SELECT id, quantity FROM lots
                WHERE catalog_entry_id = $1 AND quantity > 0
                ORDER BY entered_on, updated_at
                FOR UPDATE
                "#,
            )
            .bind(line.catalog_entry_id)
            .fetch_all(&mut *tx)
            .await?;

            let plan = plan_depletion(&lots, line.quantity);
            if !plan.is_covered() {
                match self.inventory.shortfall_policy {
                    ShortfallPolicy::Strict => {
                        return Err(AppError::LotShortfall {
                            entry_id: line.catalog_entry_id,
                            shortfall: plan.shortfall,
                        });
                    }
                    ShortfallPolicy::Reconcile => {
                        tracing::warn!(
                            catalog_entry_id = %line.catalog_entry_id,
                            shortfall = plan.shortfall,
                            "Lot ledger short on sale; proceeding"
                        );
                        shortfalls.push(ShortfallNote {
                            catalog_entry_id: line.catalog_entry_id,
                            shortfall: plan.shortfall,
                        });
                    }
                }
            }

            for draw in &plan.draws {
                sqlx::query(
                    "UPDATE lots SET quantity = quantity - $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(draw.taken)
                .bind(draw.lot_id)
                .execute(&mut *tx)
                .await?;
            }

            let amount = line_total(line.quantity, line.unit_price);
            total += amount;
            totals.push(amount);
        }

        let query = format!(
            r#"
            INSERT INTO sales (pharmacy_id, client_id, user_id, total)
            VALUES ($1, $2, $3, $4)
            RETURNING {SALE_COLUMNS}
            "#
        );
        let sale = sale_from_row(
            sqlx::query_as::<_, SaleRow>(&query)
                .bind(pharmacy_id)
                .bind(input.client_id)
                .bind(input.user_id)
                .bind(total)
                .fetch_one(&mut *tx)
                .await?,
        );

        let mut lines = Vec::with_capacity(validated.len());
        for (line, amount) in validated.iter().zip(&totals) {
            let query = format!(
                r#"
                INSERT INTO sale_lines (sale_id, catalog_entry_id, quantity, unit_price, line_total)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING {SALE_LINE_COLUMNS}
                "#
            );
            let row = sqlx::query_as::<_, SaleLineRow>(&query)
                .bind(sale.id)
                .bind(line.catalog_entry_id)
                .bind(line.quantity)
                .bind(line.unit_price)
                .bind(amount)
                .fetch_one(&mut *tx)
                .await?;
            lines.push(sale_line_from_row(row));
        }

        // Loyalty credit and client statistics
        if let Some(client_id) = input.client_id {
            let mut earned = 0i64;
            for line in &validated {
                let points = loyalty_points(line.unit_price, line.quantity);
                earned += i64::from(points);

                sqlx::query(
                    r#"
                    INSERT INTO client_purchases (client_id, catalog_entry_id, quantity, points)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(client_id)
                .bind(line.catalog_entry_id)
                .bind(line.quantity)
                .bind(points)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query(
                r#"
                UPDATE clients
                SET loyalty_score = loyalty_score + $2,
                    total_spent = (SELECT COALESCE(SUM(total), 0) FROM sales WHERE client_id = $1),
                    last_purchase_at = (SELECT MAX(sold_at) FROM sales WHERE client_id = $1),
                    updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(client_id)
            .bind(i32::try_from(earned).unwrap_or(i32::MAX))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            sale_id = %sale.id,
            total = %sale.total,
            lines = lines.len(),
            "Recorded sale"
        );

        Ok(SaleOutcome {
            sale,
            lines,
            shortfalls,
        })
    }

    pub async fn get_sale(&self, pharmacy_id: Uuid, sale_id: Uuid) -> AppResult<SaleWithLines> {
        let query = format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = $1 AND pharmacy_id = $2");
        let sale = sqlx::query_as::<_, SaleRow>(&query)
            .bind(sale_id)
            .bind(pharmacy_id)
            .fetch_optional(&self.db)
            .await?
            .map(sale_from_row)
            .ok_or_else(|| AppError::NotFound("Sale".to_string()))?;

        let query = format!(
            "SELECT {SALE_LINE_COLUMNS} FROM sale_lines WHERE sale_id = $1 ORDER BY updated_at"
        );
        let lines = sqlx::query_as::<_, SaleLineRow>(&query)
            .bind(sale_id)
            .fetch_all(&self.db)
            .await?
            .into_iter()
            .map(sale_line_from_row)
            .collect();

        Ok(SaleWithLines { sale, lines })
    }

    pub async fn list_sales(&self, pharmacy_id: Uuid, page: &Pagination) -> AppResult<Vec<Sale>> {
        let query = format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE pharmacy_id = $1 ORDER BY sold_at DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, SaleRow>(&query)
            .bind(pharmacy_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.db)
            .await?;

        Ok(rows.into_iter().map(sale_from_row).collect())
    }
}
