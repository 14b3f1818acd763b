//! Exchange rate ledger
//!
//! USD→CDF rates are append-only; the latest rate by date wins. Recording
//! a rate immediately sweeps USD-derived prices so the catalog never lags
//! the ledger.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::services::repricing::{RepricingReport, RepricingService};
use shared::models::ExchangeRate;
use shared::validation::validate_exchange_rate;

#[derive(Clone)]
pub struct ExchangeRateService {
    db: PgPool,
}

#[derive(Debug, Deserialize)]
pub struct RecordRateInput {
    pub rate: Decimal,
    /// Day the rate takes effect; defaults to today
    pub rate_date: Option<NaiveDate>,
}

type RateRow = (Uuid, Decimal, NaiveDate, DateTime<Utc>);

fn rate_from_row(row: RateRow) -> ExchangeRate {
    ExchangeRate {
        id: row.0,
        rate: row.1,
        rate_date: row.2,
        updated_at: row.3,
    }
}

impl ExchangeRateService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record a new rate and reprice everything derived from USD
    pub async fn record_rate(
        &self,
        input: RecordRateInput,
    ) -> AppResult<(ExchangeRate, RepricingReport)> {
        validate_exchange_rate(input.rate).map_err(|msg| AppError::Validation {
            field: "rate".to_string(),
            message: msg.to_string(),
        })?;

        let rate_date = input.rate_date.unwrap_or_else(|| Utc::now().date_naive());

        let row = sqlx::query_as::<_, RateRow>(
            r#"
            INSERT INTO exchange_rates (rate, rate_date)
            VALUES ($1, $2)
            RETURNING id, rate, rate_date, updated_at
            "#,
        )
        .bind(input.rate)
        .bind(rate_date)
        .fetch_one(&self.db)
        .await?;

        let rate = rate_from_row(row);

        tracing::info!(rate = %rate.rate, rate_date = %rate.rate_date, "Recorded exchange rate");

        // Sweep USD-derived prices under the new rate
        let repricing = RepricingService::new(self.db.clone());
        let report = repricing.apply_rate_change(rate.rate).await?;

        Ok((rate, report))
    }

    /// Latest recorded rate, if any
    pub async fn latest_rate(&self) -> AppResult<Option<Decimal>> {
        let rate = sqlx::query_scalar::<_, Decimal>(
            "SELECT rate FROM exchange_rates ORDER BY rate_date DESC, updated_at DESC LIMIT 1",
        )
        .fetch_optional(&self.db)
        .await?;

        Ok(rate)
    }

    /// Rate effective on a given day: the latest rate dated at or before it
    pub async fn effective_rate(&self, as_of: NaiveDate) -> AppResult<Option<Decimal>> {
        let rate = sqlx::query_scalar::<_, Decimal>(
            r#"
            SELECT rate FROM exchange_rates
            WHERE rate_date <= $1
            ORDER BY rate_date DESC, updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(as_of)
        .fetch_optional(&self.db)
        .await?;

        Ok(rate)
    }

    /// Rate history, newest first
    pub async fn list_rates(&self, limit: i64) -> AppResult<Vec<ExchangeRate>> {
        let rows = sqlx::query_as::<_, RateRow>(
            r#"
            SELECT id, rate, rate_date, updated_at
            FROM exchange_rates
            ORDER BY rate_date DESC, updated_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(rate_from_row).collect())
    }
}
