//! Payment handlers

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::bookings::fetch_booking_by_id;
use crate::state::AppState;
use labbook_core::domain::{Booking, BookingStatus, PaymentStatus};
use labbook_core::CoreError;

pub const WEBHOOK_SIGNATURE_HEADER: &str = "x-razorpay-signature";

/// Create payment order request
#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub booking_id: Uuid,
}

/// What the storefront needs to open checkout
#[derive(Debug, Serialize)]
pub struct CreateOrderResponse {
    pub booking_id: Uuid,
    pub order_id: String,
    pub amount_paise: i64,
    pub currency: String,
    pub key_id: String,
}

/// Checkout callback fields, as posted by the storefront
#[derive(Debug, Deserialize)]
pub struct VerifyPaymentRequest {
    pub razorpay_order_id: String,
    pub razorpay_payment_id: String,
    pub razorpay_signature: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event: String,
    payload: WebhookPayload,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    payment: Option<WebhookPayment>,
}

#[derive(Debug, Deserialize)]
struct WebhookPayment {
    entity: WebhookPaymentEntity,
}

#[derive(Debug, Deserialize)]
struct WebhookPaymentEntity {
    id: String,
    order_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub status: &'static str,
}

/// Create a gateway order for an unpaid booking
pub async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> ApiResult<Json<CreateOrderResponse>> {
    let booking = fetch_booking_by_id(&state, req.booking_id).await?;
    ensure_payable(&booking)?;

    // Re-opening checkout reuses the existing order
    if let Some(order_id) = booking.razorpay_order_id.clone() {
        return Ok(Json(order_response(&state, &booking, order_id)));
    }

    let order = state
        .payments
        .create_order(
            booking.amount_paise,
            &booking.currency,
            &booking.id.to_string(),
        )
        .await?;

    sqlx::query(
        r#"
        UPDATE bookings
        SET razorpay_order_id = $1, updated_at = $2
        WHERE id = $3
        "#,
    )
    .bind(&order.order_id)
    .bind(Utc::now())
    .bind(booking.id)
    .execute(&state.db_pool)
    .await?;

    Ok(Json(order_response(&state, &booking, order.order_id)))
}

/// Verify the checkout signature and mark the booking paid
pub async fn verify_payment(
    State(state): State<AppState>,
    Json(req): Json<VerifyPaymentRequest>,
) -> ApiResult<Json<Booking>> {
    if !state.payments.verify_payment_signature(
        &req.razorpay_order_id,
        &req.razorpay_payment_id,
        &req.razorpay_signature,
    ) {
        warn!(
            "Rejected payment signature for order {}",
            req.razorpay_order_id
        );
        return Err(CoreError::InvalidSignature.into());
    }

    match apply_capture(&state, &req.razorpay_order_id, &req.razorpay_payment_id).await? {
        CaptureOutcome::Paid(booking_id) => {
            info!(
                "Booking {} paid with {}",
                booking_id, req.razorpay_payment_id
            );
            fetch_booking_by_id(&state, booking_id).await.map(Json)
        }
        CaptureOutcome::AlreadyPaid(booking_id) => {
            fetch_booking_by_id(&state, booking_id).await.map(Json)
        }
        CaptureOutcome::BookingClosed(booking_id, status) => Err(ApiError::Conflict(format!(
            "Booking {} is {}; payment {} will be refunded",
            booking_id,
            status.as_str(),
            req.razorpay_payment_id
        ))),
        CaptureOutcome::UnknownOrder => Err(ApiError::NotFound(format!(
            "No booking for order {}",
            req.razorpay_order_id
        ))),
    }
}

/// Gateway webhook: payment captured / failed
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(WEBHOOK_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(CoreError::InvalidSignature)?;

    if !state.payments.verify_webhook_signature(&body, signature) {
        warn!("Rejected webhook with bad signature");
        return Err(CoreError::InvalidSignature.into());
    }

    let event: WebhookEvent = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Malformed webhook: {}", e)))?;

    let Some(payment) = event.payload.payment.map(|p| p.entity) else {
        info!("Ignoring webhook {} without payment entity", event.event);
        return Ok(Json(WebhookAck { status: "ignored" }));
    };
    let Some(order_id) = payment.order_id else {
        info!("Ignoring webhook {} for payment {} without order", event.event, payment.id);
        return Ok(Json(WebhookAck { status: "ignored" }));
    };

    match event.event.as_str() {
        "payment.captured" => {
            let status = match apply_capture(&state, &order_id, &payment.id).await? {
                CaptureOutcome::Paid(booking_id) => {
                    info!("Webhook captured payment for booking {}", booking_id);
                    "ok"
                }
                CaptureOutcome::AlreadyPaid(_) => {
                    info!("Webhook capture for order {} already applied", order_id);
                    "ok"
                }
                CaptureOutcome::BookingClosed(_, _) => "refund_required",
                CaptureOutcome::UnknownOrder => {
                    warn!("Webhook capture for unknown order {}", order_id);
                    "ignored"
                }
            };
            Ok(Json(WebhookAck { status }))
        }
        "payment.failed" => {
            mark_failed(&state, &order_id, &payment.id).await?;
            Ok(Json(WebhookAck { status: "ok" }))
        }
        other => {
            info!("Ignoring webhook event {}", other);
            Ok(Json(WebhookAck { status: "ignored" }))
        }
    }
}

// Helper functions

fn ensure_payable(booking: &Booking) -> ApiResult<()> {
    if booking.payment_status == PaymentStatus::Paid {
        return Err(ApiError::Conflict("Booking is already paid".to_string()));
    }
    if booking.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Booking is {}",
            booking.status.as_str()
        )));
    }
    Ok(())
}

fn order_response(state: &AppState, booking: &Booking, order_id: String) -> CreateOrderResponse {
    CreateOrderResponse {
        booking_id: booking.id,
        order_id,
        amount_paise: booking.amount_paise,
        currency: booking.currency.clone(),
        key_id: state.config.razorpay.key_id.clone(),
    }
}

/// What a captured payment did to its booking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CaptureOutcome {
    Paid(Uuid),
    AlreadyPaid(Uuid),
    /// The booking was cancelled or finished before the money arrived
    BookingClosed(Uuid, BookingStatus),
    UnknownOrder,
}

/// Why a capture did not mark a booking paid
fn unapplied_capture(id: Uuid, status: BookingStatus, payment: PaymentStatus) -> CaptureOutcome {
    if payment == PaymentStatus::Paid {
        CaptureOutcome::AlreadyPaid(id)
    } else {
        CaptureOutcome::BookingClosed(id, status)
    }
}

/// Mark the booking for an order paid, unless it is already paid or closed
async fn apply_capture(
    state: &AppState,
    order_id: &str,
    payment_id: &str,
) -> ApiResult<CaptureOutcome> {
    let row = sqlx::query(
        r#"
        UPDATE bookings
        SET payment_status = $1, razorpay_payment_id = $2, updated_at = $3
        WHERE razorpay_order_id = $4
          AND payment_status IN ('PENDING', 'FAILED')
          AND status <> ALL($5)
        RETURNING id
        "#,
    )
    .bind(PaymentStatus::Paid.as_str())
    .bind(payment_id)
    .bind(Utc::now())
    .bind(order_id)
    .bind(BookingStatus::terminal_names())
    .fetch_optional(&state.db_pool)
    .await?;

    if let Some(row) = row {
        return Ok(CaptureOutcome::Paid(row.get("id")));
    }

    let Some(row) = sqlx::query(
        "SELECT id, status, payment_status FROM bookings WHERE razorpay_order_id = $1",
    )
    .bind(order_id)
    .fetch_optional(&state.db_pool)
    .await?
    else {
        return Ok(CaptureOutcome::UnknownOrder);
    };

    let id: Uuid = row.get("id");
    let status: String = row.get("status");
    let payment_status: String = row.get("payment_status");
    let outcome = unapplied_capture(
        id,
        BookingStatus::from_db(&status),
        PaymentStatus::from_db(&payment_status),
    );

    if let CaptureOutcome::BookingClosed(_, status) = outcome {
        // Keep the payment id so the refund can be traced
        sqlx::query(
            r#"
            UPDATE bookings
            SET razorpay_payment_id = $1, updated_at = $2
            WHERE id = $3 AND payment_status <> 'PAID'
            "#,
        )
        .bind(payment_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&state.db_pool)
        .await?;
        error!(
            "Payment {} captured for {} booking {}; refund required",
            payment_id,
            status.as_str(),
            id
        );
    }
    Ok(outcome)
}

async fn mark_failed(state: &AppState, order_id: &str, payment_id: &str) -> ApiResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET payment_status = $1, razorpay_payment_id = $2, updated_at = $3
        WHERE razorpay_order_id = $4 AND payment_status = 'PENDING'
        "#,
    )
    .bind(PaymentStatus::Failed.as_str())
    .bind(payment_id)
    .bind(Utc::now())
    .bind(order_id)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() > 0 {
        info!("Payment {} failed for order {}", payment_id, order_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labbook_core::domain::Address;

    fn booking(status: BookingStatus, payment_status: PaymentStatus) -> Booking {
        Booking {
            id: Uuid::nil(),
            user_id: Uuid::nil(),
            vendor_booking_id: Some("HB-1".to_string()),
            status,
            payment_status,
            vendor_status_text: None,
            zone_id: "z".to_string(),
            slot_id: "s".to_string(),
            slot_date: chrono::NaiveDate::from_ymd_opt(2026, 11, 2).unwrap(),
            slot_time: "07:00-08:00".to_string(),
            packages: vec![],
            patients: vec![],
            amount_paise: 49900,
            currency: "INR".to_string(),
            address: Address::default(),
            zipcode: "110001".to_string(),
            latitude: 28.6,
            longitude: 77.2,
            razorpay_order_id: None,
            razorpay_payment_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_ensure_payable() {
        assert!(ensure_payable(&booking(BookingStatus::Booked, PaymentStatus::Pending)).is_ok());
        assert!(ensure_payable(&booking(BookingStatus::Booked, PaymentStatus::Failed)).is_ok());
        assert!(ensure_payable(&booking(BookingStatus::Booked, PaymentStatus::Paid)).is_err());
        assert!(
            ensure_payable(&booking(BookingStatus::Cancelled, PaymentStatus::Pending)).is_err()
        );
    }

    #[test]
    fn test_capture_on_expired_booking_needs_refund() {
        let id = Uuid::new_v4();
        assert_eq!(
            unapplied_capture(id, BookingStatus::Cancelled, PaymentStatus::Failed),
            CaptureOutcome::BookingClosed(id, BookingStatus::Cancelled)
        );
        assert_eq!(
            unapplied_capture(id, BookingStatus::ReportReady, PaymentStatus::Pending),
            CaptureOutcome::BookingClosed(id, BookingStatus::ReportReady)
        );
    }

    #[test]
    fn test_repeated_capture_is_already_paid() {
        let id = Uuid::new_v4();
        assert_eq!(
            unapplied_capture(id, BookingStatus::Booked, PaymentStatus::Paid),
            CaptureOutcome::AlreadyPaid(id)
        );
        assert_eq!(
            unapplied_capture(id, BookingStatus::Cancelled, PaymentStatus::Paid),
            CaptureOutcome::AlreadyPaid(id)
        );
    }

    #[test]
    fn test_capture_guard_covers_terminal_statuses() {
        let guarded = BookingStatus::terminal_names();
        for status in ["CANCELLED", "FAILED", "REPORT_READY"] {
            assert!(guarded.contains(&status), "{status}");
        }
        assert!(!guarded.contains(&BookingStatus::Booked.as_str()));
    }

    #[test]
    fn test_webhook_event_parsing() {
        let body = r#"{
            "entity": "event",
            "event": "payment.captured",
            "payload": {
                "payment": {
                    "entity": { "id": "pay_1", "order_id": "order_1", "status": "captured" }
                }
            }
        }"#;
        let event: WebhookEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.event, "payment.captured");
        let entity = event.payload.payment.unwrap().entity;
        assert_eq!(entity.id, "pay_1");
        assert_eq!(entity.order_id.as_deref(), Some("order_1"));
    }

    #[test]
    fn test_webhook_event_without_payment() {
        let body = r#"{"event": "order.paid", "payload": {}}"#;
        let event: WebhookEvent = serde_json::from_str(body).unwrap();
        assert!(event.payload.payment.is_none());
    }
}
