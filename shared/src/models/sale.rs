//! Point-of-sale models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::round2;

/// A multi-line sale recorded at the counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub client_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    /// Sum of the line totals
    pub total: Decimal,
    pub sold_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One sold product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleLine {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub catalog_entry_id: Uuid,
    pub quantity: i32,
    /// Catalog sale price captured at sale time
    pub unit_price: Decimal,
    pub line_total: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Line total: quantity × unit price at currency precision
pub fn line_total(quantity: i32, unit_price: Decimal) -> Decimal {
    round2(Decimal::from(quantity) * unit_price)
}
