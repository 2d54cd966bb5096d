//! Postal-code geocoding against a Nominatim-compatible search API

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::adapter::Geocoder;
use crate::domain::GeoPoint;
use crate::error::Result;

/// Nominatim's usage policy requires an identifying user agent
const USER_AGENT: &str = concat!("labbook/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
}

pub struct NominatimGeocoder {
    http: Client,
    base_url: String,
    country: String,
}

impl NominatimGeocoder {
    pub fn new(base_url: String, country: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            country,
        })
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode_zipcode(&self, zipcode: &str) -> Result<Option<GeoPoint>> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let hits: Vec<SearchHit> = self
            .http
            .get(url)
            .query(&[
                ("postalcode", zipcode),
                ("country", self.country.as_str()),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let point = hits.into_iter().find_map(|hit| {
            let latitude = hit.lat.parse().ok()?;
            let longitude = hit.lon.parse().ok()?;
            Some(GeoPoint::new(latitude, longitude)).filter(GeoPoint::is_valid)
        });

        debug!("Geocoded {} to {:?}", zipcode, point);
        Ok(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn geocoder(base_url: &str) -> NominatimGeocoder {
        NominatimGeocoder::new(
            base_url.to_string(),
            "India".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_geocode_first_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("postalcode", "560001"))
            .and(query_param("country", "India"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "lat": "12.9767", "lon": "77.5713", "display_name": "Bengaluru" }
            ])))
            .mount(&server)
            .await;

        let point = geocoder(&server.uri())
            .geocode_zipcode("560001")
            .await
            .unwrap();
        assert_eq!(point, Some(GeoPoint::new(12.9767, 77.5713)));
    }

    #[tokio::test]
    async fn test_geocode_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let point = geocoder(&server.uri())
            .geocode_zipcode("999999")
            .await
            .unwrap();
        assert!(point.is_none());
    }
}
