//! Application configuration

use anyhow::{bail, Context, Result};
use std::time::Duration;

use labbook_core::adapter::{HealthiansConfig, RazorpayConfig};
use labbook_core::domain::GeoPoint;

/// Application configuration
#[derive(Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Bookings database URL
    pub database_url: String,
    /// Shared secret for the admin dashboard
    pub admin_token: String,
    /// Currency for payment orders
    pub currency: String,
    /// Minutes a booking may stay unpaid
    pub payment_window_minutes: i64,
    /// Nominatim-compatible geocoder
    pub geocoder_base_url: String,
    pub geocoder_country: String,
    /// Last-resort point when a zipcode cannot be geocoded
    pub default_point: Option<GeoPoint>,
    pub healthians: HealthiansConfig,
    pub razorpay: RazorpayConfig,
    pub http_timeout: Duration,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("admin_token", &"<redacted>")
            .field("currency", &self.currency)
            .field("payment_window_minutes", &self.payment_window_minutes)
            .field("geocoder_base_url", &self.geocoder_base_url)
            .field("default_point", &self.default_point)
            .field("healthians", &self.healthians)
            .field("razorpay", &self.razorpay)
            .finish_non_exhaustive()
    }
}

fn required(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} is required", name))
}

fn parse_or<T: std::str::FromStr>(name: &str, default: &str) -> Result<T> {
    std::env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid {}", name))
}

/// Read `DEFAULT_LATITUDE` / `DEFAULT_LONGITUDE`; both or neither
fn default_point_from_env() -> Result<Option<GeoPoint>> {
    let latitude = std::env::var("DEFAULT_LATITUDE").ok();
    let longitude = std::env::var("DEFAULT_LONGITUDE").ok();

    match (latitude, longitude) {
        (None, None) => Ok(None),
        (Some(lat), Some(long)) => {
            let point = GeoPoint::new(
                lat.parse().context("Invalid DEFAULT_LATITUDE")?,
                long.parse().context("Invalid DEFAULT_LONGITUDE")?,
            );
            if !point.is_valid() {
                bail!("DEFAULT_LATITUDE/DEFAULT_LONGITUDE out of range");
            }
            Ok(Some(point))
        }
        _ => bail!("DEFAULT_LATITUDE and DEFAULT_LONGITUDE must be set together"),
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let http_timeout = Duration::from_secs(parse_or("HTTP_TIMEOUT_SECS", "20")?);

        let payment_window_minutes: i64 = parse_or("PAYMENT_WINDOW_MINUTES", "30")?;
        if payment_window_minutes <= 0 {
            bail!("PAYMENT_WINDOW_MINUTES must be positive");
        }

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", "8080")?,
            database_url: required("DATABASE_URL")?,
            admin_token: required("ADMIN_TOKEN")?,
            currency: std::env::var("CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            payment_window_minutes,
            geocoder_base_url: std::env::var("GEOCODER_BASE_URL")
                .unwrap_or_else(|_| "https://nominatim.openstreetmap.org".to_string()),
            geocoder_country: std::env::var("GEOCODER_COUNTRY")
                .unwrap_or_else(|_| "India".to_string()),
            default_point: default_point_from_env()?,
            healthians: HealthiansConfig::from_env(http_timeout)?,
            razorpay: RazorpayConfig {
                base_url: std::env::var("RAZORPAY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.razorpay.com/v1".to_string()),
                key_id: required("RAZORPAY_KEY_ID")?,
                key_secret: required("RAZORPAY_KEY_SECRET")?,
                webhook_secret: required("RAZORPAY_WEBHOOK_SECRET")?,
                timeout: http_timeout,
            },
            http_timeout,
        })
    }
}
