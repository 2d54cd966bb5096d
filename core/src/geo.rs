//! Geolocation fallback chain
//!
//! Clients may send coordinates, a zipcode, or both. The vendor needs a
//! point, so we try, in order: the request's own coordinates, geocoding the
//! zipcode, and finally a configured default point.

use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::adapter::Geocoder;
use crate::domain::{is_valid_zipcode, GeoPoint, LocationInput};
use crate::error::{CoreError, Result};

/// Where a resolved point came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationSource {
    Request,
    Geocoder,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedLocation {
    pub point: GeoPoint,
    pub zipcode: String,
    pub source: LocationSource,
}

pub struct GeoResolver {
    geocoder: Arc<dyn Geocoder>,
    default_point: Option<GeoPoint>,
}

impl GeoResolver {
    pub fn new(geocoder: Arc<dyn Geocoder>, default_point: Option<GeoPoint>) -> Self {
        Self {
            geocoder,
            default_point,
        }
    }

    pub async fn resolve(&self, input: &LocationInput) -> Result<ResolvedLocation> {
        let zipcode = input.zipcode.trim().to_string();
        if !is_valid_zipcode(&zipcode) {
            return Err(CoreError::Validation(format!(
                "Invalid zipcode '{}'",
                input.zipcode
            )));
        }

        match (input.latitude, input.longitude) {
            (Some(latitude), Some(longitude)) => {
                let point = GeoPoint::new(latitude, longitude);
                if !point.is_valid() {
                    return Err(CoreError::Validation(format!(
                        "Coordinates out of range: {}, {}",
                        latitude, longitude
                    )));
                }
                return Ok(ResolvedLocation {
                    point,
                    zipcode,
                    source: LocationSource::Request,
                });
            }
            (None, None) => {}
            _ => {
                return Err(CoreError::Validation(
                    "Latitude and longitude must be given together".to_string(),
                ))
            }
        }

        match self.geocoder.geocode_zipcode(&zipcode).await {
            Ok(Some(point)) => {
                return Ok(ResolvedLocation {
                    point,
                    zipcode,
                    source: LocationSource::Geocoder,
                })
            }
            Ok(None) => warn!("Geocoder found no match for {}", zipcode),
            Err(e) => warn!("Geocoder failed for {}: {}", zipcode, e),
        }

        match self.default_point {
            Some(point) => Ok(ResolvedLocation {
                point,
                zipcode,
                source: LocationSource::Default,
            }),
            None => Err(CoreError::Geolocation(format!(
                "No coordinates available for zipcode {}",
                zipcode
            ))),
        }
    }
}
