//! API route definitions

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth;
use crate::handlers;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin = Router::new()
        .route("/bookings", get(handlers::admin::list_bookings))
        .route(
            "/bookings/:id/status",
            put(handlers::admin::update_booking_status),
        )
        .route("/users", get(handlers::admin::list_users))
        .route("/stats", get(handlers::admin::stats))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_admin,
        ));

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Users
        .route("/api/users", post(handlers::users::upsert_user))
        .route("/api/users/:id", get(handlers::users::get_user))
        .route(
            "/api/users/:id/bookings",
            get(handlers::users::list_user_bookings),
        )
        // Serviceability & catalog
        .route(
            "/api/serviceability",
            post(handlers::catalog::check_serviceability),
        )
        .route("/api/products", get(handlers::catalog::list_products))
        .route("/api/slots", post(handlers::catalog::list_slots))
        // Bookings
        .route("/api/bookings", post(handlers::bookings::create_booking))
        .route("/api/bookings/:id", get(handlers::bookings::get_booking))
        .route(
            "/api/bookings/:id/cancel",
            post(handlers::bookings::cancel_booking),
        )
        .route(
            "/api/bookings/:id/refresh",
            post(handlers::bookings::refresh_booking),
        )
        // Payments
        .route("/api/payments/orders", post(handlers::payments::create_order))
        .route(
            "/api/payments/verify",
            post(handlers::payments::verify_payment),
        )
        .route("/api/payments/webhook", post(handlers::payments::webhook))
        // Admin dashboard
        .nest("/api/admin", admin)
        // Layers
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
