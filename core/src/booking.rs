//! Booking orchestration
//!
//! Chains location resolution, the vendor's serviceability and slot APIs,
//! package pricing and booking creation. Persistence is left to the caller.

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::adapter::{DiagnosticsVendor, SlotQuery, VendorBookingRequest};
use crate::domain::{
    is_valid_zipcode, normalize_phone, Address, LocationInput, Patient, Product, Slot,
    VendorBookingStatus,
};
use crate::error::{CoreError, Result};
use crate::geo::{GeoResolver, ResolvedLocation};

/// Most patients the vendor accepts on one booking
pub const MAX_PATIENTS: usize = 6;

/// How far ahead slots can be booked
pub const MAX_DAYS_AHEAD: i64 = 30;

/// Collection dates follow the Indian calendar (UTC+05:30)
fn today() -> NaiveDate {
    (Utc::now() + Duration::minutes(330)).date_naive()
}

/// Result of a serviceability check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceabilityReport {
    #[serde(flatten)]
    pub location: ResolvedLocation,
    pub zone_id: String,
}

/// Slot lookup input
#[derive(Debug, Clone, Deserialize)]
pub struct SlotRequest {
    #[serde(flatten)]
    pub location: LocationInput,
    pub slot_date: NaiveDate,
}

/// Who the booking is for and how to reach them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// A fully specified booking, ready to be sent to the vendor
#[derive(Debug, Clone)]
pub struct PlaceBookingRequest {
    pub booking_id: Uuid,
    pub customer: CustomerContact,
    pub location: LocationInput,
    pub address: Address,
    pub patients: Vec<Patient>,
    pub package_ids: Vec<String>,
    pub slot_id: String,
    pub slot_date: NaiveDate,
}

/// Outcome of a booking accepted by the vendor
#[derive(Debug, Clone, Serialize)]
pub struct PlacedBooking {
    pub booking_id: Uuid,
    pub vendor_booking_id: String,
    pub location: ResolvedLocation,
    pub zone_id: String,
    pub slot: Slot,
    pub packages: Vec<Product>,
    pub amount_paise: i64,
}

pub struct BookingFlow {
    vendor: Arc<dyn DiagnosticsVendor>,
    resolver: GeoResolver,
}

impl BookingFlow {
    pub fn new(vendor: Arc<dyn DiagnosticsVendor>, resolver: GeoResolver) -> Self {
        Self { vendor, resolver }
    }

    pub async fn check_serviceability(&self, input: &LocationInput) -> Result<ServiceabilityReport> {
        let location = self.resolver.resolve(input).await?;
        let serviceability = self
            .vendor
            .check_serviceability(&location.point, &location.zipcode)
            .await?;

        debug!(
            "Zipcode {} serviceable in zone {} ({:?})",
            location.zipcode, serviceability.zone_id, location.source
        );
        Ok(ServiceabilityReport {
            location,
            zone_id: serviceability.zone_id,
        })
    }

    pub async fn products(&self, zipcode: &str) -> Result<Vec<Product>> {
        let zipcode = zipcode.trim();
        if !is_valid_zipcode(zipcode) {
            return Err(CoreError::Validation(format!("Invalid zipcode '{}'", zipcode)));
        }
        self.vendor.list_products(zipcode).await
    }

    pub async fn available_slots(&self, request: &SlotRequest) -> Result<Vec<Slot>> {
        validate_slot_date(request.slot_date, today())?;
        let report = self.check_serviceability(&request.location).await?;
        self.slots_for(&report, request.slot_date).await
    }

    async fn slots_for(&self, report: &ServiceabilityReport, date: NaiveDate) -> Result<Vec<Slot>> {
        self.vendor
            .list_slots(&SlotQuery {
                point: report.location.point,
                zipcode: report.location.zipcode.clone(),
                zone_id: report.zone_id.clone(),
                slot_date: date,
            })
            .await
    }

    /// Run the full booking flow against the vendor
    pub async fn place(&self, request: &PlaceBookingRequest) -> Result<PlacedBooking> {
        let phone = validate_booking(request, today())?;

        let report = self.check_serviceability(&request.location).await?;

        let catalog = self.vendor.list_products(&report.location.zipcode).await?;
        let packages = select_packages(&catalog, &request.package_ids)?;
        let amount_paise = quote(&packages, request.patients.len());

        let slots = self.slots_for(&report, request.slot_date).await?;
        let slot = slots
            .into_iter()
            .find(|s| s.slot_id == request.slot_id)
            .ok_or_else(|| {
                CoreError::SlotUnavailable(format!(
                    "Slot {} is not open on {}",
                    request.slot_id, request.slot_date
                ))
            })?;

        self.vendor.freeze_slot(&slot.slot_id).await?;

        let vendor_request = VendorBookingRequest {
            vendor_booking_id: request.booking_id.to_string(),
            customer_name: request.customer.name.trim().to_string(),
            customer_phone: phone,
            customer_email: request.customer.email.clone(),
            patients: request.patients.clone(),
            deal_ids: packages.iter().map(|p| p.deal_id.clone()).collect(),
            slot_id: slot.slot_id.clone(),
            zone_id: report.zone_id.clone(),
            point: report.location.point,
            zipcode: report.location.zipcode.clone(),
            address: request.address.clone(),
            amount_paise,
        };

        let vendor_booking_id = self.vendor.create_booking(&vendor_request).await?;
        info!(
            "Placed booking {} (vendor {}) for {} patient(s), amount {} paise",
            request.booking_id,
            vendor_booking_id,
            request.patients.len(),
            amount_paise
        );

        Ok(PlacedBooking {
            booking_id: request.booking_id,
            vendor_booking_id,
            location: report.location,
            zone_id: report.zone_id,
            slot,
            packages,
            amount_paise,
        })
    }

    /// Place a booking and hand it to `persist`.
    ///
    /// If `persist` fails the vendor booking is cancelled again, so the
    /// vendor never holds a booking without a local record.
    pub async fn place_and_persist<F, Fut, E>(
        &self,
        request: &PlaceBookingRequest,
        persist: F,
    ) -> std::result::Result<PlacedBooking, E>
    where
        F: FnOnce(PlacedBooking) -> Fut,
        Fut: Future<Output = std::result::Result<(), E>>,
        E: From<CoreError> + Display,
    {
        let placed = self.place(request).await?;

        if let Err(e) = persist(placed.clone()).await {
            error!(
                "Failed to record booking {} (vendor {}): {}",
                placed.booking_id, placed.vendor_booking_id, e
            );
            if let Err(cancel_err) = self
                .cancel(&placed.vendor_booking_id, "Booking could not be recorded")
                .await
            {
                error!(
                    "Vendor booking {} is orphaned: {}",
                    placed.vendor_booking_id, cancel_err
                );
            }
            return Err(e);
        }
        Ok(placed)
    }

    pub async fn status(&self, vendor_booking_id: &str) -> Result<VendorBookingStatus> {
        self.vendor.booking_status(vendor_booking_id).await
    }

    pub async fn cancel(&self, vendor_booking_id: &str, remarks: &str) -> Result<()> {
        if let Err(e) = self.vendor.cancel_booking(vendor_booking_id, remarks).await {
            warn!("Vendor cancel failed for {}: {}", vendor_booking_id, e);
            return Err(e);
        }
        Ok(())
    }
}

fn validate_slot_date(date: NaiveDate, today: NaiveDate) -> Result<()> {
    if date < today {
        return Err(CoreError::Validation(format!(
            "Slot date {} is in the past",
            date
        )));
    }
    if date > today + Duration::days(MAX_DAYS_AHEAD) {
        return Err(CoreError::Validation(format!(
            "Slot date {} is more than {} days ahead",
            date, MAX_DAYS_AHEAD
        )));
    }
    Ok(())
}

/// Validate a booking request, returning the normalized contact phone
fn validate_booking(request: &PlaceBookingRequest, today: NaiveDate) -> Result<String> {
    if request.customer.name.trim().is_empty() {
        return Err(CoreError::Validation("Customer name is required".to_string()));
    }
    let phone = normalize_phone(&request.customer.phone).ok_or_else(|| {
        CoreError::Validation(format!("Invalid phone number '{}'", request.customer.phone))
    })?;

    if request.patients.is_empty() || request.patients.len() > MAX_PATIENTS {
        return Err(CoreError::Validation(format!(
            "A booking needs between 1 and {} patients",
            MAX_PATIENTS
        )));
    }
    for patient in &request.patients {
        if patient.name.trim().is_empty() {
            return Err(CoreError::Validation("Patient name is required".to_string()));
        }
        if !(1..=120).contains(&patient.age) {
            return Err(CoreError::Validation(format!(
                "Patient age {} is out of range",
                patient.age
            )));
        }
    }

    if request.package_ids.is_empty() {
        return Err(CoreError::Validation(
            "At least one package is required".to_string(),
        ));
    }
    if request.address.line.trim().is_empty() {
        return Err(CoreError::Validation("Address is required".to_string()));
    }
    if request.slot_id.trim().is_empty() {
        return Err(CoreError::Validation("Slot is required".to_string()));
    }
    validate_slot_date(request.slot_date, today)?;

    Ok(phone)
}

/// Resolve requested package ids against the vendor catalog, dropping duplicates
fn select_packages(catalog: &[Product], package_ids: &[String]) -> Result<Vec<Product>> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();

    for id in package_ids {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let product = catalog
            .iter()
            .find(|p| &p.deal_id == id)
            .ok_or_else(|| CoreError::Validation(format!("Unknown package '{}'", id)))?;
        selected.push(product.clone());
    }
    Ok(selected)
}

/// Total price: every patient takes every package
fn quote(packages: &[Product], patients: usize) -> i64 {
    packages.iter().map(|p| p.price_paise).sum::<i64>() * patients as i64
}
