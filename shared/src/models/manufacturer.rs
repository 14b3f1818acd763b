//! Manufacturer and manufacturer product models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Currency;

/// An upstream supplier of a product line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manufacturer {
    pub id: Uuid,
    pub name: String,
    pub country: String,
    pub updated_at: DateTime<Utc>,
}

/// A product as priced by its manufacturer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManufacturerProduct {
    pub id: Uuid,
    pub manufacturer_id: Uuid,
    pub name: String,
    /// Box-level purchase price in `currency`
    pub box_price: Decimal,
    pub currency: Currency,
    /// Dispensable units per box
    pub units_per_box: i32,
    pub updated_at: DateTime<Utc>,
}
