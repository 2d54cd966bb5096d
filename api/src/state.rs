//! Application state

use anyhow::Result;
use sqlx::postgres::PgPool;
use std::sync::Arc;

use crate::config::AppConfig;
use labbook_core::adapter::{
    DiagnosticsVendor, HealthiansClient, NominatimGeocoder, PaymentGateway, RazorpayClient,
};
use labbook_core::booking::BookingFlow;
use labbook_core::geo::GeoResolver;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Bookings database pool
    pub db_pool: PgPool,
    /// Configuration
    pub config: Arc<AppConfig>,
    /// Serviceability, slot and booking orchestration
    pub flow: Arc<BookingFlow>,
    /// Payment gateway
    pub payments: Arc<dyn PaymentGateway>,
}

impl AppState {
    /// Create new application state
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let db_pool = PgPool::connect(&config.database_url).await?;
        sqlx::migrate!("../migrations").run(&db_pool).await?;

        let vendor: Arc<dyn DiagnosticsVendor> =
            Arc::new(HealthiansClient::new(config.healthians.clone())?);
        let payments: Arc<dyn PaymentGateway> =
            Arc::new(RazorpayClient::new(config.razorpay.clone())?);

        Self::from_parts(db_pool, config, vendor, payments)
    }

    /// Assemble state from already-built parts
    pub fn from_parts(
        db_pool: PgPool,
        config: &AppConfig,
        vendor: Arc<dyn DiagnosticsVendor>,
        payments: Arc<dyn PaymentGateway>,
    ) -> Result<Self> {
        let geocoder = NominatimGeocoder::new(
            config.geocoder_base_url.clone(),
            config.geocoder_country.clone(),
            config.http_timeout,
        )?;
        let resolver = GeoResolver::new(Arc::new(geocoder), config.default_point);

        Ok(Self {
            db_pool,
            config: Arc::new(config.clone()),
            flow: Arc::new(BookingFlow::new(vendor, resolver)),
            payments,
        })
    }
}
