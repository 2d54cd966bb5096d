//! Razorpay payment gateway client

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::adapter::PaymentGateway;
use crate::checksum;
use crate::domain::{PaymentDetails, PaymentOrder};
use crate::error::{CoreError, Result};

#[derive(Clone)]
pub struct RazorpayConfig {
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for RazorpayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RazorpayConfig")
            .field("base_url", &self.base_url)
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("webhook_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct CreateOrderRequest<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    receipt: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentResponse {
    id: String,
    #[serde(default)]
    order_id: Option<String>,
    status: String,
    amount: i64,
    #[serde(default)]
    method: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// HTTP client for the Razorpay REST API
pub struct RazorpayClient {
    http: Client,
    config: RazorpayConfig,
}

impl RazorpayClient {
    pub fn new(config: RazorpayConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Turn a non-2xx response into a payment error carrying the gateway's description
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let message = match response.json::<ErrorBody>().await {
            Ok(body) => format!(
                "{} ({})",
                body.error
                    .description
                    .unwrap_or_else(|| "request failed".to_string()),
                body.error.code.unwrap_or_else(|| status.to_string())
            ),
            Err(_) => format!("gateway returned {}", status),
        };
        warn!("Payment gateway error: {}", message);
        Err(CoreError::Payment(message))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayClient {
    async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<PaymentOrder> {
        if amount_paise <= 0 {
            return Err(CoreError::Validation(
                "Order amount must be positive".to_string(),
            ));
        }

        let response = self
            .http
            .post(self.url("orders"))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&CreateOrderRequest {
                amount: amount_paise,
                currency,
                receipt,
            })
            .send()
            .await?;

        let order: OrderResponse = Self::check(response).await?.json().await?;
        info!("Created payment order {} for receipt {}", order.id, receipt);

        Ok(PaymentOrder {
            order_id: order.id,
            amount_paise: order.amount,
            currency: order.currency,
            receipt: order.receipt,
            status: order.status,
        })
    }

    async fn fetch_payment(&self, payment_id: &str) -> Result<PaymentDetails> {
        let response = self
            .http
            .get(self.url(&format!("payments/{}", payment_id)))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await?;

        let payment: PaymentResponse = Self::check(response).await?.json().await?;
        Ok(PaymentDetails {
            payment_id: payment.id,
            order_id: payment.order_id,
            status: payment.status,
            amount_paise: payment.amount,
            method: payment.method,
        })
    }

    fn verify_payment_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        let payload = checksum::payment_payload(order_id, payment_id);
        checksum::verify(
            self.config.key_secret.as_bytes(),
            payload.as_bytes(),
            signature,
        )
    }

    fn verify_webhook_signature(&self, body: &[u8], signature: &str) -> bool {
        checksum::verify(self.config.webhook_secret.as_bytes(), body, signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> RazorpayClient {
        RazorpayClient::new(RazorpayConfig {
            base_url: base_url.to_string(),
            key_id: "rzp_test_key".to_string(),
            key_secret: "key-secret".to_string(),
            webhook_secret: "hook-secret".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/orders"))
            .and(header_exists("authorization"))
            .and(body_json(json!({
                "amount": 49900,
                "currency": "INR",
                "receipt": "b-123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_abc",
                "entity": "order",
                "amount": 49900,
                "currency": "INR",
                "receipt": "b-123",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server.uri())
            .create_order(49900, "INR", "b-123")
            .await
            .unwrap();
        assert_eq!(order.order_id, "order_abc");
        assert_eq!(order.status, "created");
    }

    #[tokio::test]
    async fn test_create_order_rejects_non_positive_amount() {
        let err = client("http://127.0.0.1:9")
            .create_order(0, "INR", "b-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_gateway_error_is_described() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_missing"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "code": "BAD_REQUEST_ERROR",
                    "description": "The id provided does not exist"
                }
            })))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .fetch_payment("pay_missing")
            .await
            .unwrap_err();
        match err {
            CoreError::Payment(message) => {
                assert!(message.contains("does not exist"));
                assert!(message.contains("BAD_REQUEST_ERROR"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_payment_signature_verification() {
        let client = client("http://localhost");
        let signature = checksum::sign(b"key-secret", b"order_abc|pay_xyz");
        assert!(client.verify_payment_signature("order_abc", "pay_xyz", &signature));
        assert!(!client.verify_payment_signature("order_abc", "pay_other", &signature));
    }

    #[test]
    fn test_webhook_signature_uses_webhook_secret() {
        let client = client("http://localhost");
        let body = br#"{"event":"payment.captured"}"#;
        let good = checksum::sign(b"hook-secret", body);
        let wrong_key = checksum::sign(b"key-secret", body);
        assert!(client.verify_webhook_signature(body, &good));
        assert!(!client.verify_webhook_signature(body, &wrong_key));
    }
}
