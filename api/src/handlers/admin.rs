//! Admin dashboard handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use std::collections::BTreeMap;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::bookings::{
    fetch_booking_by_id, row_to_booking, update_status, BOOKING_COLUMNS,
};
use crate::handlers::users::row_to_user;
use crate::handlers::Page;
use crate::state::AppState;
use labbook_core::domain::{Booking, BookingStatus, User};

/// Booking list filters
#[derive(Debug, Deserialize)]
pub struct BookingFilter {
    pub status: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl BookingFilter {
    fn page(&self) -> Page {
        Page {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

/// Status override request
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// Dashboard summary
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_bookings: i64,
    pub bookings_by_status: BTreeMap<String, i64>,
    pub paid_bookings: i64,
    pub revenue_paise: i64,
    pub total_users: i64,
}

/// List bookings, newest first
pub async fn list_bookings(
    State(state): State<AppState>,
    Query(filter): Query<BookingFilter>,
) -> ApiResult<Json<Vec<Booking>>> {
    let (limit, offset) = filter.page().bounds();
    let status = match filter.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            BookingStatus::parse(raw)
                .ok_or_else(|| ApiError::Validation(format!("Unknown status '{}'", raw)))?,
        ),
    };

    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM bookings
        WHERE ($1::TEXT IS NULL OR status = $1)
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
        BOOKING_COLUMNS
    ))
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(rows.iter().map(row_to_booking).collect()))
}

/// List users, newest first
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<User>>> {
    let (limit, offset) = page.bounds();
    let rows = sqlx::query(
        r#"
        SELECT id, name, phone, email, created_at, updated_at
        FROM users
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(rows.iter().map(row_to_user).collect()))
}

/// Manually override a booking's status
pub async fn update_booking_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Booking>> {
    let status = BookingStatus::parse(&req.status)
        .ok_or_else(|| ApiError::Validation(format!("Unknown status '{}'", req.status)))?;

    update_status(&state, id, status, None).await?;
    info!("Admin set booking {} to {}", id, status.as_str());

    fetch_booking_by_id(&state, id).await.map(Json)
}

/// Booking counts and paid revenue
pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM bookings GROUP BY status")
        .fetch_all(&state.db_pool)
        .await?;

    let bookings_by_status: BTreeMap<String, i64> = rows
        .iter()
        .map(|row| (row.get::<String, _>("status"), row.get::<i64, _>("count")))
        .collect();
    let total_bookings: i64 = bookings_by_status.values().sum();

    let revenue = sqlx::query(
        r#"
        SELECT COUNT(*) AS paid, COALESCE(SUM(amount_paise), 0)::BIGINT AS revenue
        FROM bookings
        WHERE payment_status = 'PAID'
        "#,
    )
    .fetch_one(&state.db_pool)
    .await?;

    let total_users: i64 = sqlx::query("SELECT COUNT(*) AS count FROM users")
        .fetch_one(&state.db_pool)
        .await?
        .get("count");

    Ok(Json(StatsResponse {
        total_bookings,
        bookings_by_status,
        paid_bookings: revenue.get("paid"),
        revenue_paise: revenue.get("revenue"),
        total_users,
    }))
}
