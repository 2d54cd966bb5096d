//! API handlers

pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod payments;
pub mod users;

use axum::Json;
use serde::Serialize;

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Pagination parameters shared by list endpoints
#[derive(Debug, Default, serde::Deserialize)]
pub struct Page {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 50;
    pub const MAX_LIMIT: i64 = 200;

    /// Clamp to `(limit, offset)` suitable for SQL
    pub fn bounds(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await;
        assert_eq!(response.status, "ok");
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(Page::default().bounds(), (50, 0));
        let page = Page {
            limit: Some(10_000),
            offset: Some(-5),
        };
        assert_eq!(page.bounds(), (200, 0));
        let page = Page {
            limit: Some(0),
            offset: Some(40),
        };
        assert_eq!(page.bounds(), (1, 40));
    }
}
