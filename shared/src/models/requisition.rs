//! Requisition models
//!
//! A requisition records demand for a product the pharmacy could not
//! serve. Repeated requests for the same product increment the count
//! instead of creating new rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Accumulated demand for an unavailable product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requisition {
    pub id: Uuid,
    pub pharmacy_id: Uuid,
    /// Known manufacturer product, when the request maps to one
    pub manufacturer_product_id: Option<Uuid>,
    /// Free-text name for products outside the manufacturer catalog
    pub custom_name: String,
    pub request_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
