//! Adapters for the external services the platform depends on
//!
//! The diagnostics vendor, the payment gateway and the geocoder are each
//! reached through a trait so orchestration code can be exercised against
//! mocks. Production implementations talk HTTP through `reqwest`.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Address, GeoPoint, PaymentDetails, PaymentOrder, Patient, Product, Serviceability, Slot,
    VendorBookingStatus,
};
use crate::error::Result;

pub mod healthians;
pub mod nominatim;
pub mod razorpay;

pub use healthians::{HealthiansClient, HealthiansConfig};
pub use nominatim::NominatimGeocoder;
pub use razorpay::{RazorpayClient, RazorpayConfig};

/// Slot lookup parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotQuery {
    pub point: GeoPoint,
    pub zipcode: String,
    pub zone_id: String,
    pub slot_date: NaiveDate,
}

/// Everything the vendor needs to create a home-collection booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorBookingRequest {
    /// Our own booking id, echoed back by the vendor
    pub vendor_booking_id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: Option<String>,
    pub patients: Vec<Patient>,
    pub deal_ids: Vec<String>,
    pub slot_id: String,
    pub zone_id: String,
    pub point: GeoPoint,
    pub zipcode: String,
    pub address: Address,
    pub amount_paise: i64,
}

/// Third-party diagnostics vendor
#[async_trait]
pub trait DiagnosticsVendor: Send + Sync {
    /// Check whether home collection is offered at a point
    async fn check_serviceability(&self, point: &GeoPoint, zipcode: &str)
        -> Result<Serviceability>;

    /// List the tests and packages sold for a zipcode
    async fn list_products(&self, zipcode: &str) -> Result<Vec<Product>>;

    /// List open collection slots for a day
    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>>;

    /// Hold a slot ahead of booking creation
    async fn freeze_slot(&self, slot_id: &str) -> Result<()>;

    /// Create a booking and return the vendor's booking id
    async fn create_booking(&self, request: &VendorBookingRequest) -> Result<String>;

    /// Fetch the vendor's view of a booking
    async fn booking_status(&self, vendor_booking_id: &str) -> Result<VendorBookingStatus>;

    /// Cancel a booking at the vendor
    async fn cancel_booking(&self, vendor_booking_id: &str, remarks: &str) -> Result<()>;
}

/// Online payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an order the storefront checkout is opened against
    async fn create_order(&self, amount_paise: i64, currency: &str, receipt: &str)
        -> Result<PaymentOrder>;

    /// Fetch a payment by id
    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentDetails>;

    /// Check the signature returned to the storefront after checkout
    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool;

    /// Check the signature on a webhook delivery
    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool;
}

/// Forward geocoding of postal codes
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Returns `None` when the geocoder has no match
    async fn geocode_zipcode(&self, zipcode: &str) -> Result<Option<GeoPoint>>;
}


#[cfg(test)]
mod tests {
    use super::mocks::{MockGeo, MockVendor};
    use super::*;

    #[tokio::test]
    async fn test_mock_vendor() {
        let mut mock = MockVendor::new();
        mock.expect_freeze_slot()
            .with(mockall::predicate::eq("slot-1"))
            .returning(|_| Ok(()));

        assert!(mock.freeze_slot("slot-1").await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_geocoder() {
        let mut mock = MockGeo::new();
        mock.expect_geocode_zipcode()
            .returning(|_| Ok(Some(GeoPoint::new(12.97, 77.59))));

        let point = mock.geocode_zipcode("560001").await.unwrap();
        assert_eq!(point, Some(GeoPoint::new(12.97, 77.59)));
    }
}
