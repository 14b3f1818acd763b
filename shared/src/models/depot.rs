//! Pharmaceutical wholesale depot models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::GpsCoordinates;

/// A wholesale depot carrying a manufacturer's products
///
/// Depots are platform-wide reference data, not owned by any pharmacy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Depot {
    pub id: Uuid,
    pub manufacturer_id: Uuid,
    pub name: String,
    pub city: String,
    pub commune: String,
    pub quarter: String,
    pub address: String,
    pub location: Option<GpsCoordinates>,
    pub phone: Option<String>,
    pub updated_at: DateTime<Utc>,
}
