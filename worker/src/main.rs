//! LabBook Worker
//!
//! Background loop that expires unpaid bookings and syncs vendor status.

mod config;
mod jobs;

use sqlx::postgres::PgPool;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labbook_core::adapter::HealthiansClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,labbook_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::WorkerConfig::from_env()?;

    info!("Starting LabBook Worker");

    let db_pool = PgPool::connect(&config.database_url).await?;
    let vendor = HealthiansClient::new(config.healthians.clone())?;

    // Main worker loop
    loop {
        match jobs::process_pending_jobs(&db_pool, &vendor, &config).await {
            Ok(processed) => {
                if processed > 0 {
                    info!("Processed {} bookings", processed);
                }
            }
            Err(e) => {
                error!("Error processing jobs: {}", e);
            }
        }

        tokio::time::sleep(Duration::from_secs(config.poll_interval_secs)).await;
    }
}
