//! Platform advertisement models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A platform-wide promotional campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advertisement {
    pub id: Uuid,
    /// Stored by the file service; the record only carries the URL
    pub image_url: String,
    pub description: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub updated_at: DateTime<Utc>,
}

impl Advertisement {
    /// Whether the campaign runs on `today` (bounds inclusive)
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.starts_on <= today && today <= self.ends_on
    }
}
