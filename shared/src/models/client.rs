//! Client and loyalty models

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pharmacy's registered client
///
/// `total_spent` and `last_purchase_at` are recomputed from the client's
/// sales after each purchase rather than maintained incrementally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    pub full_name: String,
    /// 8 to 15 digits; unique per pharmacy
    pub phone: String,
    pub loyalty_score: i32,
    pub total_spent: Decimal,
    pub last_purchase_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A loyalty accrual recorded for one sale line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientPurchase {
    pub id: Uuid,
    pub client_id: Uuid,
    pub catalog_entry_id: Uuid,
    pub quantity: i32,
    pub points: i32,
    pub purchased_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Loyalty points for a sale line: whole CDF of sale value
pub fn loyalty_points(sale_price: Decimal, quantity: i32) -> i32 {
    (sale_price * Decimal::from(quantity))
        .floor()
        .to_i32()
        .unwrap_or(i32::MAX)
        .max(0)
}
