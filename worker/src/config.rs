//! Worker configuration

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;

use labbook_core::adapter::HealthiansConfig;

/// Worker configuration
#[derive(Clone)]
pub struct WorkerConfig {
    /// Bookings database URL
    pub database_url: String,
    /// Vendor credentials, shared with the API server
    pub healthians: HealthiansConfig,
    /// Poll interval in seconds
    pub poll_interval_secs: u64,
    /// Minutes a booking may stay unpaid before it is cancelled
    pub payment_window_minutes: i64,
    /// Bookings refreshed from the vendor per pass
    pub sync_batch_size: i64,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("healthians", &self.healthians)
            .field("poll_interval_secs", &self.poll_interval_secs)
            .field("payment_window_minutes", &self.payment_window_minutes)
            .field("sync_batch_size", &self.sync_batch_size)
            .finish_non_exhaustive()
    }
}

fn parse_or<T: std::str::FromStr>(name: &str, default: &str) -> Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid {}", name))
}

impl WorkerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let http_timeout = Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", "20")?);

        let payment_window_minutes: i64 = parse_or("PAYMENT_WINDOW_MINUTES", "30")?;
        if payment_window_minutes <= 0 {
            bail!("PAYMENT_WINDOW_MINUTES must be positive");
        }
        let sync_batch_size: i64 = parse_or("SYNC_BATCH_SIZE", "25")?;
        if sync_batch_size <= 0 {
            bail!("SYNC_BATCH_SIZE must be positive");
        }

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is required")?,
            healthians: HealthiansConfig::from_env(http_timeout)?,
            poll_interval_secs: parse_or("POLL_INTERVAL_SECS", "60")?,
            payment_window_minutes,
            sync_batch_size,
        })
    }

    /// Unpaid bookings created before this instant are expired
    pub fn payment_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - chrono::Duration::minutes(self.payment_window_minutes)
    }
}
