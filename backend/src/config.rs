//! Configuration management for the Pharmacy Management Platform
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (config/default.toml, config/{environment}.toml)
//! 3. Environment variable overrides with APP_ prefix

use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Local database configuration
    pub database: DatabaseConfig,

    /// Sync engine configuration
    pub sync: SyncConfig,

    /// Inventory policy configuration
    pub inventory: InventoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL of the local instance
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    /// PostgreSQL connection URL of the remote server
    pub remote_url: String,

    /// Seconds between sync passes
    pub interval_secs: u64,

    /// Restrict pharmacy-scoped entities to this pharmacy; unset syncs all
    pub pharmacy_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InventoryConfig {
    /// What to do when the lot ledger cannot cover a sale line
    pub shortfall_policy: ShortfallPolicy,

    /// Margin applied to auto-created catalog entries
    pub default_margin_percent: Decimal,

    /// Stock alert threshold for auto-created catalog entries
    pub default_alert_threshold: i32,

    /// Expiry offset in days for auto-created catalog entries
    pub entry_expiry_days: i64,

    /// Expiry offset in days for auto-created lots
    pub lot_expiry_days: i64,
}

/// Behavior when lots cannot cover a requested depletion
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShortfallPolicy {
    /// Reject the sale outright
    Strict,
    /// Log the discrepancy, deplete what the lots hold and proceed
    Reconcile,
}

impl Default for ShortfallPolicy {
    fn default() -> Self {
        ShortfallPolicy::Reconcile
    }
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("sync.interval_secs", 300)?
            .set_default("inventory.shortfall_policy", "reconcile")?
            .set_default("inventory.default_margin_percent", "35.00")?
            .set_default("inventory.default_alert_threshold", 8)?
            .set_default("inventory.entry_expiry_days", 545)?
            .set_default("inventory.lot_expiry_days", 365)?
            // Load layered config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (APP_ prefix)
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}
