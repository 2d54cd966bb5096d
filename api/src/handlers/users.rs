//! Customer account handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use sqlx::Row;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::handlers::bookings::{row_to_booking, BOOKING_COLUMNS};
use crate::handlers::Page;
use crate::state::AppState;
use labbook_core::domain::{normalize_phone, Booking, User};

/// Create or update user request
#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

/// Validated user fields
#[derive(Debug, PartialEq)]
struct UserFields {
    name: String,
    phone: String,
    email: Option<String>,
}

fn validate_user(req: &UpsertUserRequest) -> ApiResult<UserFields> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation("Name is required".to_string()));
    }

    let phone = normalize_phone(&req.phone)
        .ok_or_else(|| ApiError::Validation(format!("Invalid phone number '{}'", req.phone)))?;

    let email = match req.email.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(email) => {
            let valid = email
                .split_once('@')
                .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
                .unwrap_or(false);
            if !valid {
                return Err(ApiError::Validation(format!("Invalid email '{}'", email)));
            }
            Some(email.to_ascii_lowercase())
        }
    };

    Ok(UserFields {
        name: name.to_string(),
        phone,
        email,
    })
}

/// Register a customer, or update the existing account with the same phone
pub async fn upsert_user(
    State(state): State<AppState>,
    Json(req): Json<UpsertUserRequest>,
) -> ApiResult<Json<User>> {
    let fields = validate_user(&req)?;
    let now = Utc::now();

    let row = sqlx::query(
        r#"
        INSERT INTO users (id, name, phone, email, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $5)
        ON CONFLICT (phone) DO UPDATE
        SET name = EXCLUDED.name,
            email = COALESCE(EXCLUDED.email, users.email),
            updated_at = EXCLUDED.updated_at
        RETURNING id, name, phone, email, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&fields.name)
    .bind(&fields.phone)
    .bind(&fields.email)
    .bind(now)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(row_to_user(&row)))
}

/// Get user by ID
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<User>> {
    fetch_user_by_id(&state, id).await.map(Json)
}

/// List a user's bookings, newest first
pub async fn list_user_bookings(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> ApiResult<Json<Vec<Booking>>> {
    fetch_user_by_id(&state, id).await?;
    let (limit, offset) = page.bounds();

    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM bookings
        WHERE user_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
        BOOKING_COLUMNS
    ))
    .bind(id)
    .bind(limit)
    .bind(offset)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(rows.iter().map(row_to_booking).collect()))
}

// Helper functions

pub(crate) async fn fetch_user_by_id(state: &AppState, id: Uuid) -> ApiResult<User> {
    let row = sqlx::query(
        r#"
        SELECT id, name, phone, email, created_at, updated_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?;

    match row {
        Some(row) => Ok(row_to_user(&row)),
        None => Err(ApiError::NotFound(format!("User {} not found", id))),
    }
}

pub(crate) fn row_to_user(row: &sqlx::postgres::PgRow) -> User {
    User {
        id: row.get("id"),
        name: row.get("name"),
        phone: row.get("phone"),
        email: row.get("email"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, phone: &str, email: Option<&str>) -> UpsertUserRequest {
        UpsertUserRequest {
            name: name.to_string(),
            phone: phone.to_string(),
            email: email.map(str::to_string),
        }
    }

    #[test]
    fn test_validate_user_normalizes() {
        let fields = validate_user(&request(" Asha ", "+91 9876543210", Some(" Asha@Example.com "))).unwrap();
        assert_eq!(
            fields,
            UserFields {
                name: "Asha".to_string(),
                phone: "9876543210".to_string(),
                email: Some("asha@example.com".to_string()),
            }
        );
    }

    #[test]
    fn test_validate_user_blank_email_is_none() {
        let fields = validate_user(&request("Asha", "9876543210", Some("  "))).unwrap();
        assert_eq!(fields.email, None);
    }

    #[test]
    fn test_validate_user_rejects_bad_input() {
        assert!(validate_user(&request("", "9876543210", None)).is_err());
        assert!(validate_user(&request("Asha", "123", None)).is_err());
        assert!(validate_user(&request("Asha", "9876543210", Some("no-at-sign"))).is_err());
        assert!(validate_user(&request("Asha", "9876543210", Some("a@localhost"))).is_err());
    }
}
