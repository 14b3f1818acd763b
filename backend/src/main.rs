//! `pharmsyncd`: the pharmacy instance daemon
//!
//! Boots the local database, runs subscription housekeeping and keeps the
//! instance reconciled with the remote server on a fixed interval.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pharmacy_management_backend::services::{PharmacyService, SyncService};
use pharmacy_management_backend::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "pharmsyncd=debug,pharmacy_management_backend=debug,sqlx=warn".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::load()?;
    tracing::info!("Starting pharmacy sync daemon");
    tracing::info!("Environment: {}", config.environment);

    // Local instance pool
    let local = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;
    tracing::info!("Connected to local database");

    sqlx::migrate!("./migrations").run(&local).await?;
    tracing::info!("Migrations applied");

    // Remote server pool
    let remote = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.sync.remote_url)
        .await?;
    tracing::info!("Connected to remote server");

    // Subscription housekeeping before the first pass
    let pharmacies = PharmacyService::new(local.clone());
    let deactivated = pharmacies.deactivate_expired().await?;
    if deactivated > 0 {
        tracing::info!(count = deactivated, "Deactivated expired pharmacies");
    }

    let sync = SyncService::new(local, remote, config.sync.pharmacy_id);

    let mut ticker = tokio::time::interval(Duration::from_secs(config.sync.interval_secs));
    tracing::info!(
        interval_secs = config.sync.interval_secs,
        "Entering sync loop"
    );

    loop {
        ticker.tick().await;

        let (push, pull) = sync.run_cycle().await;
        tracing::info!(
            pushed = push.inserted() + push.overwritten(),
            pulled = pull.inserted() + pull.overwritten(),
            failed_rows = push.failed_rows() + pull.failed_rows(),
            "Sync cycle complete"
        );
    }
}
