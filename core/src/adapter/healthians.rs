//! Healthians diagnostics vendor client

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::adapter::{DiagnosticsVendor, SlotQuery, VendorBookingRequest};
use crate::checksum;
use crate::domain::{
    rupees_to_paise, BookingStatus, GeoPoint, Product, Serviceability, Slot, VendorBookingStatus,
};
use crate::error::{CoreError, Result};

/// Access tokens are issued for an hour; refresh a little early
const TOKEN_TTL: Duration = Duration::from_secs(55 * 60);

const CHECKSUM_HEADER: &str = "X-Checksum";

/// Connection settings for the vendor API
#[derive(Clone)]
pub struct HealthiansConfig {
    pub base_url: String,
    /// Partner slug that prefixes every endpoint path
    pub partner: String,
    pub username: String,
    pub password: String,
    /// Key for the HMAC checksum on booking creation
    pub checksum_key: String,
    /// Billing account the partner books against
    pub billing_user_id: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for HealthiansConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthiansConfig")
            .field("base_url", &self.base_url)
            .field("partner", &self.partner)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("checksum_key", &"<redacted>")
            .field("billing_user_id", &self.billing_user_id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn env_required(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| CoreError::Validation(format!("{} is required", name)))
}

impl HealthiansConfig {
    /// Load vendor settings from `HEALTHIANS_*` environment variables
    pub fn from_env(timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: std::env::var("HEALTHIANS_BASE_URL")
                .unwrap_or_else(|_| "https://t25crm.healthians.co.in".to_string()),
            partner: env_required("HEALTHIANS_PARTNER")?,
            username: env_required("HEALTHIANS_USERNAME")?,
            password: env_required("HEALTHIANS_PASSWORD")?,
            checksum_key: env_required("HEALTHIANS_CHECKSUM_KEY")?,
            billing_user_id: env_required("HEALTHIANS_BILLING_USER_ID")?,
            timeout,
        })
    }
}

struct CachedToken {
    value: String,
    fetched_at: Instant,
}

/// Every vendor response shares this envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
    #[serde(default)]
    booking_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    status: bool,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZoneRecord {
    zone_id: Value,
}

#[derive(Debug, Deserialize)]
struct ProductRecord {
    deal_id: Value,
    #[serde(alias = "test_name", alias = "product_name")]
    name: String,
    price: Value,
    #[serde(default)]
    test_count: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct SlotRecord {
    stm_id: Value,
    slot_time: String,
    end_time: String,
    #[serde(default)]
    slot_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BookingStatusRecord {
    booking_status: String,
}

/// HTTP client for the Healthians partner API
pub struct HealthiansClient {
    http: Client,
    config: HealthiansConfig,
    token: RwLock<Option<CachedToken>>,
}

impl HealthiansClient {
    pub fn new(config: HealthiansConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            config,
            token: RwLock::new(None),
        })
    }

    fn endpoint(&self, name: &str) -> String {
        format!(
            "{}/api/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.partner,
            name
        )
    }

    /// Return a cached access token, fetching a fresh one when stale
    async fn access_token(&self) -> Result<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if token.fetched_at.elapsed() < TOKEN_TTL {
                    return Ok(token.value.clone());
                }
            }
        }

        let mut guard = self.token.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(token) = guard.as_ref() {
            if token.fetched_at.elapsed() < TOKEN_TTL {
                return Ok(token.value.clone());
            }
        }

        let value = self.fetch_token().await?;
        *guard = Some(CachedToken {
            value: value.clone(),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    async fn fetch_token(&self) -> Result<String> {
        debug!("Requesting vendor access token");
        let response = self
            .http
            .get(self.endpoint("getAccessToken"))
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await?
            .error_for_status()?;

        let body: TokenResponse = response.json().await?;
        match (body.status, body.access_token) {
            (true, Some(token)) if !token.is_empty() => {
                info!("Obtained vendor access token");
                Ok(token)
            }
            _ => Err(CoreError::vendor(
                "getAccessToken",
                body.message
                    .unwrap_or_else(|| "no access token in response".to_string()),
            )),
        }
    }

    async fn invalidate_token(&self) {
        *self.token.write().await = None;
    }

    /// POST a JSON body to an endpoint, retrying once with a fresh token on 401
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        body: &Value,
        signed: bool,
    ) -> Result<Envelope<T>> {
        let payload = serde_json::to_vec(body)?;
        let url = self.endpoint(operation);

        for attempt in 0..2 {
            let token = self.access_token().await?;
            let mut request = self
                .http
                .post(&url)
                .bearer_auth(&token)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(payload.clone());

            if signed {
                let signature = checksum::sign(self.config.checksum_key.as_bytes(), &payload);
                request = request.header(CHECKSUM_HEADER, signature);
            }

            let response = request.send().await?;
            if response.status() == StatusCode::UNAUTHORIZED && attempt == 0 {
                warn!("Vendor rejected access token during {}, refreshing", operation);
                self.invalidate_token().await;
                continue;
            }

            let envelope: Envelope<T> = response.error_for_status()?.json().await?;
            if !envelope.status {
                return Err(CoreError::vendor(
                    operation,
                    envelope
                        .message
                        .unwrap_or_else(|| "request rejected".to_string()),
                ));
            }
            return Ok(envelope);
        }

        Err(CoreError::vendor(operation, "unauthorized after token refresh"))
    }
}

/// Request body for createBooking_v3
pub(crate) fn booking_payload(request: &VendorBookingRequest, billing_user_id: &str) -> Value {
    let customers: Vec<Value> = request
        .patients
        .iter()
        .enumerate()
        .map(|(index, patient)| {
            json!({
                "customer_id": format!("{}-{}", request.vendor_booking_id, index + 1),
                "customer_name": patient.name,
                "relation": patient.relation,
                "age": patient.age,
                "gender": patient.gender.vendor_code(),
                "contact_number": request.customer_phone,
                "email": request.customer_email.clone().unwrap_or_default(),
            })
        })
        .collect();

    let primary_gender = request
        .patients
        .first()
        .map(|p| p.gender.vendor_code())
        .unwrap_or("O");

    json!({
        "customer": customers,
        "slot": { "slot_id": request.slot_id },
        "package": [{ "deal_id": request.deal_ids }],
        "customer_calling_number": request.customer_phone,
        "billing_cust_name": request.customer_name,
        "gender": primary_gender,
        "mobile": request.customer_phone,
        "email": request.customer_email.clone().unwrap_or_default(),
        "state": request.address.state.clone().unwrap_or_default(),
        "cityId": request.address.city.clone().unwrap_or_default(),
        "sub_locality": request.address.sub_locality.clone().unwrap_or_default(),
        "latitude": request.point.latitude.to_string(),
        "longitude": request.point.longitude.to_string(),
        "address": request.address.line,
        "zipcode": request.zipcode,
        "landmark": request.address.landmark.clone().unwrap_or_default(),
        "hard_copy": 0,
        "vendor_booking_id": request.vendor_booking_id,
        "vendor_billing_user_id": billing_user_id,
        "payment_option": "prepaid",
        "discounted_price": request.amount_paise as f64 / 100.0,
        "zone_id": request.zone_id,
    })
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_rupees(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl DiagnosticsVendor for HealthiansClient {
    async fn check_serviceability(
        &self,
        point: &GeoPoint,
        zipcode: &str,
    ) -> Result<Serviceability> {
        let body = json!({
            "lat": point.latitude.to_string(),
            "long": point.longitude.to_string(),
            "zipcode": zipcode,
        });

        let envelope = match self
            .call::<ZoneRecord>("checkServiceabilityByLocation_v2", &body, false)
            .await
        {
            Ok(envelope) => envelope,
            Err(CoreError::Vendor { message, .. }) => {
                return Err(CoreError::NotServiceable(format!("{}: {}", zipcode, message)))
            }
            Err(e) => return Err(e),
        };

        let zone = envelope
            .data
            .ok_or_else(|| CoreError::NotServiceable(zipcode.to_string()))?;
        Ok(Serviceability {
            zone_id: value_to_string(&zone.zone_id),
        })
    }

    async fn list_products(&self, zipcode: &str) -> Result<Vec<Product>> {
        let body = json!({ "zipcode": zipcode });
        let envelope = self
            .call::<Vec<ProductRecord>>("getPartnerProducts", &body, false)
            .await?;

        let records = envelope.data.unwrap_or_default();
        let mut products = Vec::with_capacity(records.len());
        for record in records {
            let Some(price) = value_to_rupees(&record.price) else {
                warn!("Skipping product {} with unparseable price", record.name);
                continue;
            };
            products.push(Product {
                deal_id: value_to_string(&record.deal_id),
                name: record.name,
                price_paise: rupees_to_paise(price),
                test_count: record
                    .test_count
                    .as_ref()
                    .and_then(value_to_rupees)
                    .map(|n| n as u32),
            });
        }
        Ok(products)
    }

    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>> {
        let date = query.slot_date.format("%Y-%m-%d").to_string();
        let body = json!({
            "lat": query.point.latitude.to_string(),
            "long": query.point.longitude.to_string(),
            "zipcode": query.zipcode,
            "zone_id": query.zone_id,
            "slot_date": date,
        });

        let envelope = self
            .call::<Vec<SlotRecord>>("getSlotsByLocation", &body, false)
            .await?;

        let slots = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|record| {
                let slot_date = record
                    .slot_date
                    .as_deref()
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                    .unwrap_or(query.slot_date);
                Slot {
                    slot_id: value_to_string(&record.stm_id),
                    slot_date,
                    start_time: record.slot_time,
                    end_time: record.end_time,
                }
            })
            .collect();
        Ok(slots)
    }

    async fn freeze_slot(&self, slot_id: &str) -> Result<()> {
        let body = json!({
            "slot_id": slot_id,
            "vendor_billing_user_id": self.config.billing_user_id,
        });
        self.call::<Value>("freezeSlot_v1", &body, false).await?;
        debug!("Froze slot {}", slot_id);
        Ok(())
    }

    async fn create_booking(&self, request: &VendorBookingRequest) -> Result<String> {
        let body = booking_payload(request, &self.config.billing_user_id);
        let envelope = self.call::<Value>("createBooking_v3", &body, true).await?;

        let booking_id = envelope
            .booking_id
            .as_ref()
            .map(value_to_string)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| CoreError::vendor("createBooking_v3", "response had no booking_id"))?;

        info!(
            "Vendor accepted booking {} as {}",
            request.vendor_booking_id, booking_id
        );
        Ok(booking_id)
    }

    async fn booking_status(&self, vendor_booking_id: &str) -> Result<VendorBookingStatus> {
        let body = json!({ "booking_id": vendor_booking_id });
        let envelope = self
            .call::<BookingStatusRecord>("getBookingStatus", &body, false)
            .await?;

        let record = envelope
            .data
            .ok_or_else(|| CoreError::vendor("getBookingStatus", "response had no data"))?;
        Ok(VendorBookingStatus {
            vendor_booking_id: vendor_booking_id.to_string(),
            status: BookingStatus::from_vendor(&record.booking_status),
            status_text: record.booking_status,
        })
    }

    async fn cancel_booking(&self, vendor_booking_id: &str, remarks: &str) -> Result<()> {
        let body = json!({
            "booking_id": vendor_booking_id,
            "vendor_billing_user_id": self.config.billing_user_id,
            "remarks": remarks,
        });
        self.call::<Value>("cancelBooking", &body, false).await?;
        info!("Cancelled vendor booking {}", vendor_booking_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, Gender, Patient};
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(base_url: &str) -> HealthiansConfig {
        HealthiansConfig {
            base_url: base_url.to_string(),
            partner: "acme".to_string(),
            username: "user".to_string(),
            password: "pass".to_string(),
            checksum_key: "checksum-key".to_string(),
            billing_user_id: "billing-1".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    async fn mount_token(server: &MockServer, expected_calls: u64) {
        Mock::given(method("GET"))
            .and(path("/api/acme/getAccessToken"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "status": true, "access_token": "tok-1" })),
            )
            .expect(expected_calls)
            .mount(server)
            .await;
    }

    fn sample_request() -> VendorBookingRequest {
        VendorBookingRequest {
            vendor_booking_id: "b-123".to_string(),
            customer_name: "Asha Rao".to_string(),
            customer_phone: "9876543210".to_string(),
            customer_email: Some("asha@example.com".to_string()),
            patients: vec![Patient {
                name: "Asha Rao".to_string(),
                age: 34,
                gender: Gender::Female,
                relation: "self".to_string(),
            }],
            deal_ids: vec!["profile_1".to_string()],
            slot_id: "9001".to_string(),
            zone_id: "42".to_string(),
            point: GeoPoint::new(28.61, 77.21),
            zipcode: "110001".to_string(),
            address: Address {
                line: "12 Main Road".to_string(),
                ..Default::default()
            },
            amount_paise: 49900,
        }
    }

    #[tokio::test]
    async fn test_serviceability_and_token_reuse() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/acme/checkServiceabilityByLocation_v2"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Serviceable",
                "data": { "zone_id": 42 }
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = HealthiansClient::new(config(&server.uri())).unwrap();
        let point = GeoPoint::new(28.61, 77.21);

        let first = client.check_serviceability(&point, "110001").await.unwrap();
        let second = client.check_serviceability(&point, "110001").await.unwrap();
        assert_eq!(first.zone_id, "42");
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_token_refetched_after_ttl() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;

        Mock::given(method("POST"))
            .and(path("/api/acme/freezeSlot_v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": true, "message": "ok" })),
            )
            .expect(3)
            .mount(&server)
            .await;

        let client = HealthiansClient::new(config(&server.uri())).unwrap();
        client.freeze_slot("9001").await.unwrap();

        // Jump the runtime clock without waiting on real time
        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(54 * 60)).await;
        tokio::time::resume();
        client.freeze_slot("9002").await.unwrap();

        tokio::time::pause();
        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        tokio::time::resume();
        client.freeze_slot("9003").await.unwrap();
    }

    #[tokio::test]
    async fn test_not_serviceable_maps_to_error() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/acme/checkServiceabilityByLocation_v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": false,
                "message": "Location not serviceable"
            })))
            .mount(&server)
            .await;

        let client = HealthiansClient::new(config(&server.uri())).unwrap();
        let err = client
            .check_serviceability(&GeoPoint::new(10.0, 10.0), "999999")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotServiceable(_)));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_token_once() {
        let server = MockServer::start().await;
        mount_token(&server, 2).await;

        Mock::given(method("POST"))
            .and(path("/api/acme/freezeSlot_v1"))
            .respond_with(ResponseTemplate::new(401))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/acme/freezeSlot_v1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "status": true, "message": "ok" })),
            )
            .mount(&server)
            .await;

        let client = HealthiansClient::new(config(&server.uri())).unwrap();
        client.freeze_slot("9001").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_booking_sends_checksum() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        let request = sample_request();
        let payload = serde_json::to_vec(&booking_payload(&request, "billing-1")).unwrap();
        let expected = checksum::sign(b"checksum-key", &payload);

        Mock::given(method("POST"))
            .and(path("/api/acme/createBooking_v3"))
            .and(header_exists(CHECKSUM_HEADER))
            .and(header(CHECKSUM_HEADER, expected.as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "message": "Booking created",
                "booking_id": 7788
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HealthiansClient::new(config(&server.uri())).unwrap();
        let booking_id = client.create_booking(&request).await.unwrap();
        assert_eq!(booking_id, "7788");
    }

    #[tokio::test]
    async fn test_list_products_skips_bad_prices() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/acme/getPartnerProducts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "data": [
                    { "deal_id": "profile_1", "test_name": "Full Body", "price": "999", "test_count": 60 },
                    { "deal_id": 17, "product_name": "Thyroid", "price": 349.5 },
                    { "deal_id": "x", "test_name": "Broken", "price": null }
                ]
            })))
            .mount(&server)
            .await;

        let client = HealthiansClient::new(config(&server.uri())).unwrap();
        let products = client.list_products("110001").await.unwrap();
        assert_eq!(products.len(), 2);
        assert_eq!(products[0].price_paise, 99900);
        assert_eq!(products[0].test_count, Some(60));
        assert_eq!(products[1].deal_id, "17");
        assert_eq!(products[1].price_paise, 34950);
    }

    #[tokio::test]
    async fn test_booking_status_mapping() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;

        Mock::given(method("POST"))
            .and(path("/api/acme/getBookingStatus"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": true,
                "data": { "booking_status": "Sample Collected" }
            })))
            .mount(&server)
            .await;

        let client = HealthiansClient::new(config(&server.uri())).unwrap();
        let status = client.booking_status("7788").await.unwrap();
        assert_eq!(status.status, BookingStatus::SampleCollected);
        assert_eq!(status.status_text, "Sample Collected");
    }

    #[test]
    fn test_booking_payload_shape() {
        let payload = booking_payload(&sample_request(), "billing-1");
        assert_eq!(payload["vendor_booking_id"], "b-123");
        assert_eq!(payload["customer"][0]["gender"], "F");
        assert_eq!(payload["customer"][0]["customer_id"], "b-123-1");
        assert_eq!(payload["package"][0]["deal_id"][0], "profile_1");
        assert_eq!(payload["discounted_price"], 499.0);
    }

    #[test]
    fn test_config_debug_redacts_secrets() {
        let rendered = format!("{:?}", config("http://localhost"));
        assert!(!rendered.contains("pass\""));
        assert!(!rendered.contains("checksum-key"));
        assert!(rendered.contains("<redacted>"));
    }
}
