//! Booking handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use sqlx::types::Json as SqlxJson;
use sqlx::Row;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::users::fetch_user_by_id;
use crate::state::AppState;
use labbook_core::booking::{CustomerContact, PlaceBookingRequest, PlacedBooking};
use labbook_core::domain::{
    Address, Booking, BookingStatus, LocationInput, Patient, PaymentStatus, Product,
};

/// Columns selected for every booking read
pub(crate) const BOOKING_COLUMNS: &str = r#"
    id, user_id, vendor_booking_id, status, payment_status, vendor_status_text,
    zone_id, slot_id, slot_date, slot_time, packages, patients, amount_paise,
    currency, address, zipcode, latitude, longitude, razorpay_order_id,
    razorpay_payment_id, created_at, updated_at
"#;

/// Create booking request
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: Uuid,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub zipcode: String,
    pub address: Address,
    pub patients: Vec<Patient>,
    pub package_ids: Vec<String>,
    pub slot_id: String,
    pub slot_date: NaiveDate,
}

/// Cancel booking request
#[derive(Debug, Default, Deserialize)]
pub struct CancelBookingRequest {
    pub remarks: Option<String>,
}

/// Place a booking with the vendor and record it locally
pub async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> ApiResult<(StatusCode, Json<Booking>)> {
    let user = fetch_user_by_id(&state, req.user_id).await?;

    let place = PlaceBookingRequest {
        booking_id: Uuid::new_v4(),
        customer: CustomerContact {
            name: user.name.clone(),
            phone: user.phone.clone(),
            email: user.email.clone(),
        },
        location: LocationInput {
            latitude: req.latitude,
            longitude: req.longitude,
            zipcode: req.zipcode,
        },
        address: req.address,
        patients: req.patients,
        package_ids: req.package_ids,
        slot_id: req.slot_id,
        slot_date: req.slot_date,
    };

    let user_id = user.id;
    let placed = state
        .flow
        .place_and_persist(&place, |placed| {
            insert_booking(&state, user_id, &place, placed)
        })
        .await?;

    info!(
        "Booking {} created for user {}",
        placed.booking_id, user.id
    );
    let booking = fetch_booking_by_id(&state, placed.booking_id).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn insert_booking(
    state: &AppState,
    user_id: Uuid,
    place: &PlaceBookingRequest,
    placed: PlacedBooking,
) -> ApiResult<()> {
    let now = Utc::now();
    let slot_time = format!("{}-{}", placed.slot.start_time, placed.slot.end_time);

    sqlx::query(
        r#"
        INSERT INTO bookings (
            id, user_id, vendor_booking_id, status, payment_status,
            zone_id, slot_id, slot_date, slot_time, packages, patients,
            amount_paise, currency, address, zipcode, latitude, longitude,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $18)
        "#,
    )
    .bind(placed.booking_id)
    .bind(user_id)
    .bind(&placed.vendor_booking_id)
    .bind(BookingStatus::Booked.as_str())
    .bind(PaymentStatus::Pending.as_str())
    .bind(&placed.zone_id)
    .bind(&placed.slot.slot_id)
    .bind(placed.slot.slot_date)
    .bind(&slot_time)
    .bind(SqlxJson(&placed.packages))
    .bind(SqlxJson(&place.patients))
    .bind(placed.amount_paise)
    .bind(&state.config.currency)
    .bind(SqlxJson(&place.address))
    .bind(&placed.location.zipcode)
    .bind(placed.location.point.latitude)
    .bind(placed.location.point.longitude)
    .bind(now)
    .execute(&state.db_pool)
    .await?;

    Ok(())
}

/// Get booking by ID
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    fetch_booking_by_id(&state, id).await.map(Json)
}

/// Cancel a booking at the vendor and locally
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Option<Json<CancelBookingRequest>>,
) -> ApiResult<Json<Booking>> {
    let booking = fetch_booking_by_id(&state, id).await?;
    if booking.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Booking is already {}",
            booking.status.as_str()
        )));
    }

    let remarks = body
        .and_then(|Json(b)| b.remarks)
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Cancelled by customer".to_string());

    if let Some(vendor_id) = booking.vendor_booking_id.as_deref() {
        state.flow.cancel(vendor_id, &remarks).await?;
    }

    update_status(&state, id, BookingStatus::Cancelled, None).await?;
    info!("Booking {} cancelled: {}", id, remarks);

    fetch_booking_by_id(&state, id).await.map(Json)
}

/// Pull the latest status from the vendor
pub async fn refresh_booking(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Booking>> {
    let booking = fetch_booking_by_id(&state, id).await?;
    let Some(vendor_id) = booking.vendor_booking_id.as_deref() else {
        return Err(ApiError::Conflict(
            "Booking has no vendor reference".to_string(),
        ));
    };

    let vendor_status = state.flow.status(vendor_id).await?;
    let status = match booking.status.transition(vendor_status.status) {
        Some(next) => {
            info!(
                "Booking {} moved {} -> {} ({})",
                id,
                booking.status.as_str(),
                next.as_str(),
                vendor_status.status_text
            );
            next
        }
        None => booking.status,
    };
    record_vendor_status(&state, id, booking.status, status, &vendor_status.status_text).await?;

    fetch_booking_by_id(&state, id).await.map(Json)
}

// Helper functions

pub(crate) async fn update_status(
    state: &AppState,
    id: Uuid,
    status: BookingStatus,
    vendor_status_text: Option<&str>,
) -> ApiResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET status = $1,
            vendor_status_text = COALESCE($2, vendor_status_text),
            updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(status.as_str())
    .bind(vendor_status_text)
    .bind(Utc::now())
    .bind(id)
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!("Status update for missing booking {}", id);
        return Err(ApiError::NotFound(format!("Booking {} not found", id)));
    }
    Ok(())
}

/// Store a vendor-driven status, only if nobody changed the booking meanwhile
async fn record_vendor_status(
    state: &AppState,
    id: Uuid,
    from: BookingStatus,
    to: BookingStatus,
    vendor_status_text: &str,
) -> ApiResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE bookings
        SET status = $1, vendor_status_text = $2, updated_at = $3
        WHERE id = $4 AND status = $5
        "#,
    )
    .bind(to.as_str())
    .bind(vendor_status_text)
    .bind(Utc::now())
    .bind(id)
    .bind(from.as_str())
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        warn!("Booking {} changed during refresh; vendor status not applied", id);
    }
    Ok(())
}

pub(crate) async fn fetch_booking_by_id(state: &AppState, id: Uuid) -> ApiResult<Booking> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM bookings WHERE id = $1",
        BOOKING_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_booking(&row)),
        None => Err(ApiError::NotFound(format!("Booking {} not found", id))),
    }
}

pub(crate) fn row_to_booking(row: &sqlx::postgres::PgRow) -> Booking {
    let status: String = row.get("status");
    let payment_status: String = row.get("payment_status");
    let SqlxJson(packages): SqlxJson<Vec<Product>> = row.get("packages");
    let SqlxJson(patients): SqlxJson<Vec<Patient>> = row.get("patients");
    let SqlxJson(address): SqlxJson<Address> = row.get("address");

    Booking {
        id: row.get("id"),
        user_id: row.get("user_id"),
        vendor_booking_id: row.get("vendor_booking_id"),
        status: BookingStatus::from_db(&status),
        payment_status: PaymentStatus::from_db(&payment_status),
        vendor_status_text: row.get("vendor_status_text"),
        zone_id: row.get("zone_id"),
        slot_id: row.get("slot_id"),
        slot_date: row.get("slot_date"),
        slot_time: row.get("slot_time"),
        packages,
        patients,
        amount_paise: row.get("amount_paise"),
        currency: row.get("currency"),
        address,
        zipcode: row.get("zipcode"),
        latitude: row.get("latitude"),
        longitude: row.get("longitude"),
        razorpay_order_id: row.get("razorpay_order_id"),
        razorpay_payment_id: row.get("razorpay_payment_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_booking_request_deserialization() {
        let json = r#"{
            "user_id": "550e8400-e29b-41d4-a716-446655440000",
            "zipcode": "110001",
            "address": { "line": "4 Park Street", "city": "Delhi" },
            "patients": [{ "name": "Ravi", "age": 40, "gender": "male" }],
            "package_ids": ["profile_1"],
            "slot_id": "9001",
            "slot_date": "2026-11-02"
        }"#;
        let req: CreateBookingRequest = serde_json::from_str(json).unwrap();
        assert!(req.latitude.is_none());
        assert_eq!(req.address.city.as_deref(), Some("Delhi"));
        assert_eq!(req.patients[0].relation, "self");
    }

    #[test]
    fn test_cancel_request_remarks_optional() {
        let req: CancelBookingRequest = serde_json::from_str("{}").unwrap();
        assert!(req.remarks.is_none());
    }

    #[test]
    fn test_booking_columns_cover_row_mapping() {
        for column in [
            "vendor_booking_id",
            "payment_status",
            "packages",
            "razorpay_order_id",
            "updated_at",
        ] {
            assert!(BOOKING_COLUMNS.contains(column), "missing {}", column);
        }
    }
}
