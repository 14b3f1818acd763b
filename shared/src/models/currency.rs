//! Currency and exchange rate models
//!
//! All pricing ultimately lands in Congolese francs (CDF). Manufacturers may
//! quote in USD, in which case the latest recorded exchange rate converts
//! the price. A missing rate is an error, never a silent default.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Currencies a manufacturer can price in
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Cdf,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Usd => "USD",
            Currency::Cdf => "CDF",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Some(Currency::Usd),
            "CDF" => Some(Currency::Cdf),
            _ => None,
        }
    }
}

impl std::fmt::Display for Currency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded USD→CDF exchange rate; the latest by date is the effective one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeRate {
    pub id: Uuid,
    pub rate: Decimal,
    pub rate_date: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

/// Failures of the pure pricing arithmetic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("no exchange rate available for USD conversion")]
    MissingExchangeRate,

    #[error("units per box must be positive")]
    InvalidUnitCount,
}

/// Round a currency amount half-up to 2 decimal places
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Convert a manufacturer box price to CDF
///
/// CDF prices pass through unchanged. USD prices require `rate`.
pub fn box_cost_in_cdf(
    box_price: Decimal,
    currency: Currency,
    rate: Option<Decimal>,
) -> Result<Decimal, PricingError> {
    match currency {
        Currency::Cdf => Ok(box_price),
        Currency::Usd => rate
            .map(|r| box_price * r)
            .ok_or(PricingError::MissingExchangeRate),
    }
}

/// Order-line cost snapshot: the box price in CDF at currency precision
pub fn order_line_cost(
    box_price: Decimal,
    currency: Currency,
    rate: Option<Decimal>,
) -> Result<Decimal, PricingError> {
    box_cost_in_cdf(box_price, currency, rate).map(round2)
}
