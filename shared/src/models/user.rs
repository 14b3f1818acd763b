//! User account models
//!
//! Credential handling lives outside this system; the record exists so
//! sales, receipts and expenses can reference the acting user and so the
//! sync engine can replicate accounts between sites.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Roles recognized by the platform
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Superuser,
    Admin,
    Director,
    Accountant,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Superuser => "superuser",
            UserRole::Admin => "admin",
            UserRole::Director => "director",
            UserRole::Accountant => "accountant",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "superuser" => Some(UserRole::Superuser),
            "admin" => Some(UserRole::Admin),
            "director" => Some(UserRole::Director),
            "accountant" => Some(UserRole::Accountant),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: UserRole,
    /// Superusers are not tied to any pharmacy
    pub pharmacy_id: Option<Uuid>,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}
