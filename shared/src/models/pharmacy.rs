//! Pharmacy tenant models

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::GpsCoordinates;

/// A registered pharmacy; the unit of data ownership and isolation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pharmacy {
    pub id: Uuid,
    pub name: String,
    pub city: String,
    pub commune: String,
    pub address: String,
    /// National identification number
    pub national_id: String,
    pub phone: String,
    pub logo_url: Option<String>,
    pub location: Option<GpsCoordinates>,
    pub monthly_fee: Decimal,
    pub is_active: bool,
    /// End of the current subscription period, if one is set
    pub expires_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Pharmacy {
    /// Whether the subscription has lapsed as of `today`
    ///
    /// A pharmacy is still valid on its expiration date itself.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        match self.expires_on {
            Some(expires_on) => expires_on < today,
            None => false,
        }
    }

    /// Days left before expiration, clamped at zero
    ///
    /// None when no expiration date is set.
    pub fn days_remaining(&self, today: NaiveDate) -> Option<i64> {
        self.expires_on
            .map(|expires_on| (expires_on - today).num_days().max(0))
    }
}
