//! Repricing sweeps
//!
//! When an exchange rate or a manufacturer price changes, the CDF amounts
//! stored on catalog entries, lots and pending order lines go stale. The
//! sweeps here recompute them row by row; a failure on one row is logged
//! and reported, and the sweep moves on.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use shared::models::{compute_entry_prices, order_line_cost, Currency, EntryPrices};

#[derive(Clone)]
pub struct RepricingService {
    db: PgPool,
}

/// Outcome of a repricing sweep
#[derive(Debug, Clone, Serialize)]
pub struct RepricingReport {
    pub updated: usize,
    pub skipped: Vec<SkippedEntity>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedEntity {
    pub id: Uuid,
    pub reason: String,
}

impl RepricingReport {
    fn new() -> Self {
        Self {
            updated: 0,
            skipped: Vec::new(),
        }
    }

    fn skip(&mut self, id: Uuid, reason: String) {
        self.skipped.push(SkippedEntity { id, reason });
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UsdEntryRow {
    id: Uuid,
    margin_percent: Decimal,
    box_price: Decimal,
    units_per_box: i32,
}

#[derive(Debug, sqlx::FromRow)]
struct PendingLineRow {
    id: Uuid,
    box_price: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct EntryMarginRow {
    id: Uuid,
    margin_percent: Decimal,
}

impl RepricingService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Reprice everything that depends on the USD rate
    ///
    /// Covers catalog entries backed by USD products (lots mirror their
    /// parent entry) and the snapshots on order lines still pending.
    pub async fn apply_rate_change(&self, rate: Decimal) -> AppResult<RepricingReport> {
        let mut report = RepricingReport::new();

        // Catalog entries backed by USD products
        let entries = sqlx::query_as::<_, UsdEntryRow>(
            r#"
            SELECT e.id, e.margin_percent, p.box_price, p.units_per_box
            FROM catalog_entries e
            JOIN manufacturer_products p ON p.id = e.manufacturer_product_id
            WHERE p.currency = 'USD'
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        for entry in entries {
            match self.reprice_usd_entry(&entry, rate).await {
                Ok(()) => report.updated += 1,
                Err(err) => {
                    tracing::warn!(entry_id = %entry.id, error = %err, "Skipping catalog entry in rate sweep");
                    report.skip(entry.id, err.to_string());
                }
            }
        }

        // Order lines still pending, snapshotted from USD products
        let lines = sqlx::query_as::<_, PendingLineRow>(
            r#"
            SELECT l.id, p.box_price
            FROM order_lines l
            JOIN orders o ON o.id = l.order_id
            JOIN manufacturer_products p ON p.id = l.manufacturer_product_id
            WHERE o.status = 'pending' AND p.currency = 'USD'
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        for line in lines {
            let result = self.reprice_order_line(line.id, line.box_price, rate).await;

            match result {
                Ok(()) => report.updated += 1,
                Err(err) => {
                    tracing::warn!(order_line_id = %line.id, error = %err, "Skipping order line in rate sweep");
                    report.skip(line.id, err.to_string());
                }
            }
        }

        tracing::info!(
            updated = report.updated,
            skipped = report.skipped.len(),
            "Rate sweep finished"
        );

        Ok(report)
    }

    /// Reprice the catalog entries backed by one manufacturer product
    ///
    /// Order lines and existing lots keep their snapshots: a price captured
    /// at order or intake time is part of the procurement record.
    pub async fn apply_product_change(&self, product_id: Uuid) -> AppResult<RepricingReport> {
        let mut report = RepricingReport::new();

        let (box_price, currency, units_per_box) =
            sqlx::query_as::<_, (Decimal, String, i32)>(
                "SELECT box_price, currency, units_per_box FROM manufacturer_products WHERE id = $1",
            )
            .bind(product_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Manufacturer product".to_string()))?;

        let currency = Currency::from_str(&currency).ok_or_else(|| {
            AppError::Internal(format!(
                "Unknown currency {} on product {}",
                currency, product_id
            ))
        })?;

        // Latest recorded rate; only consulted for USD products
        let rate = sqlx::query_scalar::<_, Decimal>(
            "SELECT rate FROM exchange_rates ORDER BY rate_date DESC, updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?;

        let entries = sqlx::query_as::<_, EntryMarginRow>(
            "SELECT id, margin_percent FROM catalog_entries WHERE manufacturer_product_id = $1",
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        for entry in entries {
            let result = self
                .reprice_entry(
                    entry.id,
                    box_price,
                    currency,
                    units_per_box,
                    entry.margin_percent,
                    rate,
                )
                .await;

            match result {
                Ok(_) => report.updated += 1,
                Err(err) => {
                    tracing::warn!(entry_id = %entry.id, error = %err, "Skipping catalog entry in product sweep");
                    report.skip(entry.id, err.to_string());
                }
            }
        }

        tracing::info!(
            product_id = %product_id,
            updated = report.updated,
            skipped = report.skipped.len(),
            "Product sweep finished"
        );

        Ok(report)
    }

    /// Recompute one USD-backed entry and push the fresh prices onto its lots
    async fn reprice_usd_entry(&self, entry: &UsdEntryRow, rate: Decimal) -> AppResult<()> {
        let prices = self
            .reprice_entry(
                entry.id,
                entry.box_price,
                Currency::Usd,
                entry.units_per_box,
                entry.margin_percent,
                Some(rate),
            )
            .await?;

        self.mirror_lot_prices(entry.id, &prices).await
    }

    async fn reprice_entry(
        &self,
        entry_id: Uuid,
        box_price: Decimal,
        currency: Currency,
        units_per_box: i32,
        margin_percent: Decimal,
        rate: Option<Decimal>,
    ) -> AppResult<EntryPrices> {
        let prices = compute_entry_prices(box_price, currency, units_per_box, margin_percent, rate)?;

        sqlx::query(
            "UPDATE catalog_entries SET unit_cost = $1, sale_price = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(prices.unit_cost)
        .bind(prices.sale_price)
        .bind(entry_id)
        .execute(&self.db)
        .await?;

        Ok(prices)
    }

    /// Lots carry price snapshots of their parent entry
    async fn mirror_lot_prices(&self, entry_id: Uuid, prices: &EntryPrices) -> AppResult<()> {
        sqlx::query(
            "UPDATE lots SET unit_cost = $1, sale_price = $2, updated_at = NOW() WHERE catalog_entry_id = $3",
        )
        .bind(prices.unit_cost)
        .bind(prices.sale_price)
        .bind(entry_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn reprice_order_line(
        &self,
        line_id: Uuid,
        box_price: Decimal,
        rate: Decimal,
    ) -> AppResult<()> {
        let box_cost = order_line_cost(box_price, Currency::Usd, Some(rate))?;

        sqlx::query("UPDATE order_lines SET box_cost = $1, updated_at = NOW() WHERE id = $2")
            .bind(box_cost)
            .bind(line_id)
            .execute(&self.db)
            .await?;

        Ok(())
    }
}
