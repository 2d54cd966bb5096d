//! Serviceability, product and slot lookups

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;
use labbook_core::booking::{ServiceabilityReport, SlotRequest};
use labbook_core::domain::{LocationInput, Product, Slot};

/// Check whether home collection is available at a location
pub async fn check_serviceability(
    State(state): State<AppState>,
    Json(location): Json<LocationInput>,
) -> ApiResult<Json<ServiceabilityReport>> {
    let report = state.flow.check_serviceability(&location).await?;
    Ok(Json(report))
}

/// Product query parameters
#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub zipcode: String,
}

/// List tests and packages sold in a zipcode
pub async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ProductsQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let products = state.flow.products(&query.zipcode).await?;
    Ok(Json(products))
}

/// List collection slots for a location and date
pub async fn list_slots(
    State(state): State<AppState>,
    Json(request): Json<SlotRequest>,
) -> ApiResult<Json<Vec<Slot>>> {
    let slots = state.flow.available_slots(&request).await?;
    Ok(Json(slots))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_request_accepts_flat_body() {
        let json = r#"{"zipcode": "560001", "latitude": 12.97, "longitude": 77.59, "slot_date": "2026-11-02"}"#;
        let req: SlotRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.location.zipcode, "560001");
        assert_eq!(req.location.latitude, Some(12.97));
        assert_eq!(req.slot_date.to_string(), "2026-11-02");
    }

    #[test]
    fn test_location_without_coordinates() {
        let location: LocationInput = serde_json::from_str(r#"{"zipcode": "110001"}"#).unwrap();
        assert!(location.latitude.is_none());
        assert!(location.longitude.is_none());
    }
}
