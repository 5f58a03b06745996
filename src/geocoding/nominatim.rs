//! OpenStreetMap Nominatim reverse-geocoding provider.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::GeocodeError;
use crate::geocoding::{Address, LocationProvider};
use crate::library::Coordinates;

const USER_AGENT: &str = concat!("photo-library/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    address: Option<ReverseAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct ReverseAddress {
    #[serde(default)]
    country: String,
    #[serde(default)]
    country_code: String,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    #[serde(default)]
    state: String,
    #[serde(default)]
    postcode: String,
}

pub struct NominatimProvider {
    client: reqwest::Client,
    base_url: String,
}

impl NominatimProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl LocationProvider for NominatimProvider {
    async fn reverse(&self, coordinates: Coordinates) -> Result<Address, GeocodeError> {
        let resp = self
            .client
            .get(format!("{}/reverse", self.base_url))
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", coordinates.lat.to_string()),
                ("lon", coordinates.lon.to_string()),
            ])
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| GeocodeError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GeocodeError::Request(format!("HTTP {status}: {body}")));
        }

        let body: ReverseResponse = resp
            .json()
            .await
            .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;
        if let Some(error) = body.error {
            return Err(GeocodeError::InvalidResponse(error));
        }

        let address = body.address.unwrap_or_default();
        Ok(Address {
            display_name: body.display_name,
            country: address.country,
            country_code: address.country_code,
            city: address
                .city
                .or(address.town)
                .or(address.village)
                .unwrap_or_default(),
            state: address.state,
            postcode: address.postcode,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::extract::Query;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::{Value, json};

    use super::*;

    async fn reverse(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
        if params.get("lat").map(String::as_str) == Some("0") {
            return Json(json!({"error": "Unable to geocode"}));
        }
        Json(json!({
            "display_name": "Lausanne, Vaud, Switzerland",
            "address": {
                "town": "Lausanne",
                "state": "Vaud",
                "country": "Switzerland",
                "country_code": "ch",
                "postcode": "1003"
            }
        }))
    }

    async fn serve() -> String {
        let app = Router::new().route("/reverse", get(reverse));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn parses_reverse_response() {
        let provider = NominatimProvider::new(serve().await);
        let address = provider
            .reverse(Coordinates::new(46.52, 6.63))
            .await
            .unwrap();
        assert_eq!(address.city, "Lausanne");
        assert_eq!(address.country_code, "ch");
        assert_eq!(address.display_name, "Lausanne, Vaud, Switzerland");
    }

    #[tokio::test]
    async fn service_error_is_invalid_response() {
        let provider = NominatimProvider::new(serve().await);
        let err = provider
            .reverse(Coordinates::new(0.0, 0.0))
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn unreachable_service_is_request_error() {
        let provider = NominatimProvider::new("http://127.0.0.1:1");
        let err = provider
            .reverse(Coordinates::new(1.0, 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::Request(_)));
    }
}
