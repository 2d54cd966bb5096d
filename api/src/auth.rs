//! Admin dashboard authentication

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Reject requests whose `x-admin-token` does not match the configured token
pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if !tokens_match(presented, &state.config.admin_token) {
        warn!("Rejected admin request to {}", request.uri().path());
        return Err(ApiError::Unauthorized);
    }

    Ok(next.run(request).await)
}

/// Length-then-content comparison that does not short-circuit on content
fn tokens_match(presented: &str, expected: &str) -> bool {
    if expected.is_empty() || presented.len() != expected.len() {
        return false;
    }
    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
