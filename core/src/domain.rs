//! Domain models for the LabBook service

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a lab-test booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Accepted by the vendor, awaiting sample collection
    Booked,
    /// Phlebotomist collected the sample
    SampleCollected,
    /// Report is available
    ReportReady,
    /// Cancelled by the customer, an admin, or payment expiry
    Cancelled,
    /// Vendor rejected the booking or it could not be tracked
    Failed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Booked => "BOOKED",
            BookingStatus::SampleCollected => "SAMPLE_COLLECTED",
            BookingStatus::ReportReady => "REPORT_READY",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Failed => "FAILED",
        }
    }

    /// Parse the stored representation. Unknown text is treated as `Failed`.
    pub fn from_db(value: &str) -> Self {
        match value {
            "BOOKED" => BookingStatus::Booked,
            "SAMPLE_COLLECTED" => BookingStatus::SampleCollected,
            "REPORT_READY" => BookingStatus::ReportReady,
            "CANCELLED" => BookingStatus::Cancelled,
            _ => BookingStatus::Failed,
        }
    }

    /// Strict parse used for admin input
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BOOKED" => Some(BookingStatus::Booked),
            "SAMPLE_COLLECTED" => Some(BookingStatus::SampleCollected),
            "REPORT_READY" => Some(BookingStatus::ReportReady),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            "FAILED" => Some(BookingStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::ReportReady | BookingStatus::Cancelled | BookingStatus::Failed
        )
    }

    /// Map the vendor's free-text booking status onto the local lifecycle.
    ///
    /// Only known phrasings move a booking forward; anything else, including
    /// negated or partial states, stays `Booked`.
    pub fn from_vendor(text: &str) -> Self {
        let normalized = text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();

        match normalized.as_str() {
            "sample collected" | "sample received" => BookingStatus::SampleCollected,
            "report generated" | "report ready" | "reports generated" | "done" => {
                BookingStatus::ReportReady
            }
            "cancelled" | "canceled" | "booking cancelled" | "cancelled by customer"
            | "cancelled by partner" => BookingStatus::Cancelled,
            _ => BookingStatus::Booked,
        }
    }

    /// The status to store when the vendor reports `reported`, if any.
    ///
    /// Terminal states are never left, and a plain booked report does not
    /// roll back a collected sample.
    pub fn transition(self, reported: BookingStatus) -> Option<BookingStatus> {
        if self.is_terminal() || self == reported {
            return None;
        }
        if self == BookingStatus::SampleCollected && reported == BookingStatus::Booked {
            return None;
        }
        Some(reported)
    }

    pub const ALL: [BookingStatus; 5] = [
        BookingStatus::Booked,
        BookingStatus::SampleCollected,
        BookingStatus::ReportReady,
        BookingStatus::Cancelled,
        BookingStatus::Failed,
    ];

    /// Stored names of every terminal status
    pub fn terminal_names() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .filter(|s| s.is_terminal())
            .map(|s| s.as_str())
            .collect()
    }
}

/// Payment state of a booking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "PAID" => PaymentStatus::Paid,
            "FAILED" => PaymentStatus::Failed,
            "REFUNDED" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

/// A registered customer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Ten digit mobile number without country prefix
    pub phone: String,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A latitude/longitude pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Location as supplied by a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationInput {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zipcode: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    /// Single letter code used by the vendor API
    pub fn vendor_code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::Other => "O",
        }
    }
}

/// A person whose sample will be collected
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    /// Relation to the account holder, e.g. "self", "spouse"
    #[serde(default = "default_relation")]
    pub relation: String,
}

fn default_relation() -> String {
    "self".to_string()
}

/// Sample collection address
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub line: String,
    pub landmark: Option<String>,
    pub sub_locality: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// A test or package sold by the vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub deal_id: String,
    pub name: String,
    pub price_paise: i64,
    pub test_count: Option<u32>,
}

/// A sample collection time slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub slot_id: String,
    pub slot_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
}

/// Vendor serviceability answer for a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Serviceability {
    pub zone_id: String,
}

/// A payment gateway order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub order_id: String,
    pub amount_paise: i64,
    pub currency: String,
    pub receipt: Option<String>,
    pub status: String,
}

/// A captured or attempted payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub payment_id: String,
    pub order_id: Option<String>,
    pub status: String,
    pub amount_paise: i64,
    pub method: Option<String>,
}

/// Vendor-side status of a booking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VendorBookingStatus {
    pub vendor_booking_id: String,
    pub status_text: String,
    pub status: BookingStatus,
}

/// A lab-test booking as persisted locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub vendor_booking_id: Option<String>,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub vendor_status_text: Option<String>,
    pub zone_id: String,
    pub slot_id: String,
    pub slot_date: NaiveDate,
    pub slot_time: String,
    pub packages: Vec<Product>,
    pub patients: Vec<Patient>,
    pub amount_paise: i64,
    pub currency: String,
    pub address: Address,
    pub zipcode: String,
    pub latitude: f64,
    pub longitude: f64,
    pub razorpay_order_id: Option<String>,
    pub razorpay_payment_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Indian PIN codes are six digits and never start with zero
pub fn is_valid_zipcode(zipcode: &str) -> bool {
    zipcode.len() == 6
        && zipcode.bytes().all(|b| b.is_ascii_digit())
        && !zipcode.starts_with('0')
}

/// Normalize a mobile number to its ten digit form.
///
/// Strips spaces, dashes, a `+91`/`91` country prefix and a leading trunk `0`.
pub fn normalize_phone(input: &str) -> Option<String> {
    let digits: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    let digits = digits.strip_prefix('+').unwrap_or(digits.as_str());

    let national = match digits.len() {
        12 if digits.starts_with("91") => &digits[2..],
        11 if digits.starts_with('0') => &digits[1..],
        _ => digits,
    };

    let valid = national.len() == 10
        && national.bytes().all(|b| b.is_ascii_digit())
        && matches!(national.as_bytes()[0], b'6'..=b'9');

    valid.then(|| national.to_string())
}

pub fn rupees_to_paise(rupees: f64) -> i64 {
    (rupees * 100.0).round() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booking_status_round_trip_strings() {
        assert_eq!(BookingStatus::Booked.as_str(), "BOOKED");
        assert_eq!(
            BookingStatus::from_db("SAMPLE_COLLECTED"),
            BookingStatus::SampleCollected
        );
        assert_eq!(BookingStatus::from_db("garbage"), BookingStatus::Failed);
    }

    #[test]
    fn test_booking_status_parse_is_strict() {
        assert_eq!(
            BookingStatus::parse("report_ready"),
            Some(BookingStatus::ReportReady)
        );
        assert_eq!(BookingStatus::parse("PAID"), None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!BookingStatus::Booked.is_terminal());
        assert!(!BookingStatus::SampleCollected.is_terminal());
        assert!(BookingStatus::ReportReady.is_terminal());
        assert!(BookingStatus::Cancelled.is_terminal());
        assert!(BookingStatus::Failed.is_terminal());
    }

    #[test]
    fn test_vendor_status_mapping() {
        assert_eq!(
            BookingStatus::from_vendor("Sample Collected"),
            BookingStatus::SampleCollected
        );
        assert_eq!(
            BookingStatus::from_vendor("Report Generated"),
            BookingStatus::ReportReady
        );
        assert_eq!(
            BookingStatus::from_vendor("  report   READY "),
            BookingStatus::ReportReady
        );
        assert_eq!(BookingStatus::from_vendor("Done"), BookingStatus::ReportReady);
        assert_eq!(
            BookingStatus::from_vendor("Cancelled by customer"),
            BookingStatus::Cancelled
        );
        assert_eq!(BookingStatus::from_vendor("Canceled"), BookingStatus::Cancelled);
        assert_eq!(
            BookingStatus::from_vendor("Phlebo Assigned"),
            BookingStatus::Booked
        );
    }

    #[test]
    fn test_vendor_status_negations_stay_booked() {
        for text in [
            "Sample Not Collected",
            "Partial Report Generated",
            "Report Pending",
            "Cancellation Requested",
            "Not Done",
            "",
        ] {
            assert_eq!(
                BookingStatus::from_vendor(text),
                BookingStatus::Booked,
                "{text}"
            );
        }
    }

    #[test]
    fn test_transition_moves_forward() {
        assert_eq!(
            BookingStatus::Booked.transition(BookingStatus::SampleCollected),
            Some(BookingStatus::SampleCollected)
        );
        assert_eq!(
            BookingStatus::SampleCollected.transition(BookingStatus::ReportReady),
            Some(BookingStatus::ReportReady)
        );
        assert_eq!(
            BookingStatus::Booked.transition(BookingStatus::Cancelled),
            Some(BookingStatus::Cancelled)
        );
    }

    #[test]
    fn test_transition_ignores_same_and_backwards() {
        assert_eq!(BookingStatus::Booked.transition(BookingStatus::Booked), None);
        assert_eq!(
            BookingStatus::SampleCollected.transition(BookingStatus::Booked),
            None
        );
    }

    #[test]
    fn test_transition_never_leaves_terminal() {
        for terminal in [
            BookingStatus::Cancelled,
            BookingStatus::ReportReady,
            BookingStatus::Failed,
        ] {
            for reported in BookingStatus::ALL {
                assert_eq!(terminal.transition(reported), None);
            }
        }
    }

    #[test]
    fn test_terminal_names() {
        assert_eq!(
            BookingStatus::terminal_names(),
            vec!["REPORT_READY", "CANCELLED", "FAILED"]
        );
    }

    #[test]
    fn test_payment_status_from_db() {
        assert_eq!(PaymentStatus::from_db("PAID"), PaymentStatus::Paid);
        assert_eq!(PaymentStatus::from_db("whatever"), PaymentStatus::Pending);
    }

    #[test]
    fn test_geo_point_validity() {
        assert!(GeoPoint::new(28.6139, 77.2090).is_valid());
        assert!(!GeoPoint::new(91.0, 77.0).is_valid());
        assert!(!GeoPoint::new(28.0, -181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 77.0).is_valid());
    }

    #[test]
    fn test_zipcode_validation() {
        assert!(is_valid_zipcode("110001"));
        assert!(!is_valid_zipcode("011001"));
        assert!(!is_valid_zipcode("11001"));
        assert!(!is_valid_zipcode("11000a"));
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("9876543210").as_deref(), Some("9876543210"));
        assert_eq!(
            normalize_phone("+91 98765-43210").as_deref(),
            Some("9876543210")
        );
        assert_eq!(normalize_phone("09876543210").as_deref(), Some("9876543210"));
        assert_eq!(normalize_phone("5876543210"), None);
        assert_eq!(normalize_phone("98765"), None);
    }

    #[test]
    fn test_rupees_to_paise() {
        assert_eq!(rupees_to_paise(499.0), 49900);
        assert_eq!(rupees_to_paise(12.5), 1250);
    }

    #[test]
    fn test_patient_relation_defaults_to_self() {
        let patient: Patient =
            serde_json::from_str(r#"{"name":"Asha","age":34,"gender":"female"}"#).unwrap();
        assert_eq!(patient.relation, "self");
        assert_eq!(patient.gender.vendor_code(), "F");
    }
}
