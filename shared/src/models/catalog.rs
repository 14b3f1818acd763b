//! Pharmacy catalog models and price derivation
//!
//! A catalog entry is a pharmacy's stocked, priced instance of a
//! manufacturer product. Its per-unit cost and sale price are a persisted
//! cache derived from the manufacturer's box price, the exchange rate and
//! the entry's margin; `compute_entry_prices` is the single derivation
//! used everywhere (creation, update, repricing).

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{box_cost_in_cdf, round2, Currency, PricingError};

/// Character set for generated barcodes
pub const BARCODE_CHARSET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789!@#$%^&*";

/// Length of a generated barcode
pub const BARCODE_LENGTH: usize = 6;

/// Packaging of a catalog entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Packaging {
    Piece,
    Box,
    Carton,
}

impl Packaging {
    pub fn as_str(&self) -> &'static str {
        match self {
            Packaging::Piece => "piece",
            Packaging::Box => "box",
            Packaging::Carton => "carton",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "piece" => Some(Packaging::Piece),
            "box" => Some(Packaging::Box),
            "carton" => Some(Packaging::Carton),
            _ => None,
        }
    }
}

impl std::fmt::Display for Packaging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a stock alert
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Danger,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Warning => "warning",
            AlertLevel::Danger => "danger",
        }
    }
}

/// A pharmacy's stocked, priced instance of a manufacturer product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub manufacturer_product_id: Uuid,
    pub barcode: String,
    pub name: String,
    pub indication: Option<String>,
    pub shelf_location: String,
    pub packaging: Packaging,
    pub expires_on: NaiveDate,
    pub category: String,
    pub alert_threshold: i32,
    /// Aggregate on-hand quantity in dispensable units
    pub quantity: i32,
    /// Cached per-unit cost in CDF
    pub unit_cost: Decimal,
    pub margin_percent: Decimal,
    /// Cached sale price in CDF; unset until first successful derivation
    pub sale_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// Derived per-unit prices for a catalog entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryPrices {
    pub unit_cost: Decimal,
    pub sale_price: Decimal,
}

/// Derive the per-unit cost and sale price of a catalog entry
///
/// `box_price` is the manufacturer box price in its own currency; `rate`
/// the effective USD→CDF rate, if any is recorded.
pub fn compute_entry_prices(
    box_price: Decimal,
    currency: Currency,
    units_per_box: i32,
    margin_percent: Decimal,
    rate: Option<Decimal>,
) -> Result<EntryPrices, PricingError> {
    if units_per_box <= 0 {
        return Err(PricingError::InvalidUnitCount);
    }
    let box_cdf = box_cost_in_cdf(box_price, currency, rate)?;
    let unit_cost = round2(box_cdf / Decimal::from(units_per_box));
    let sale_price = round2(unit_cost + unit_cost * margin_percent / Decimal::from(100));
    Ok(EntryPrices {
        unit_cost,
        sale_price,
    })
}

/// Alert level for a stock position, when at or under the threshold
pub fn alert_level(quantity: i32, threshold: i32) -> Option<AlertLevel> {
    if quantity > threshold {
        return None;
    }
    if 2 * quantity <= threshold {
        Some(AlertLevel::Danger)
    } else {
        Some(AlertLevel::Warning)
    }
}

/// Generate a random barcode for an auto-created catalog entry
///
/// Uniqueness is checked against storage by the caller; regenerate on
/// collision.
pub fn generate_barcode<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..BARCODE_LENGTH)
        .map(|_| {
            let idx = rng.gen_range(0..BARCODE_CHARSET.len());
            BARCODE_CHARSET[idx] as char
        })
        .collect()
}
