//! Goods receipt models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivery received against a supplier order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub id: Uuid,
    pub order_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

/// Quantity actually received for one order line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiptLine {
    pub id: Uuid,
    pub receipt_id: Uuid,
    pub order_line_id: Uuid,
    /// Boxes received; stock increments by boxes × units per box
    pub quantity_received: i32,
    pub updated_at: DateTime<Utc>,
}
