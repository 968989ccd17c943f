use std::time::{Duration, Instant};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::GeocoderConfig;

/// Minimum start-to-start spacing between outbound lookup requests.
pub const MIN_REQUEST_SPACING: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("geocoding lookup failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// One result row of the address-search endpoint. Latitude and longitude
/// arrive as strings in the wire format.
#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    lat: Option<String>,
    #[serde(default)]
    lon: Option<String>,
}

/// Client for the external address-search endpoint, throttled process-wide:
/// at most one lookup in flight, starts spaced `MIN_REQUEST_SPACING` apart.
/// Construct once and share via `Arc`.
pub struct Geocoder {
    http: Client,
    base_url: String,
    /// Start time of the most recent request. The mutex doubles as the
    /// single-flight gate: the guard is held until the response body has
    /// been consumed, and drops on every exit path.
    throttle: Mutex<Option<Instant>>,
}

impl Geocoder {
    pub fn new(cfg: &GeocoderConfig) -> anyhow::Result<Self> {
        let http = Client::builder().user_agent(&cfg.user_agent).build()?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            throttle: Mutex::new(None),
        })
    }

    /// Resolves a postal address to coordinates.
    ///
    /// `Ok(Some(_))` - resolved; `Ok(None)` - the address does not exist as
    /// far as the lookup service is concerned; `Err(_)` - the lookup itself
    /// failed (network, non-2xx status, malformed body) and may be worth
    /// retrying later.
    pub async fn resolve(
        &self,
        street: &str,
        city: &str,
        state: &str,
        zip: &str,
    ) -> Result<Option<Coordinates>, GeocodeError> {
        // no network call and no throttle interaction for unusable input
        if [street, city, state, zip]
            .iter()
            .any(|f| f.trim().is_empty())
        {
            return Ok(None);
        }

        let query = format!("{street}, {city}, {state} {zip}");

        let mut last_start = self.throttle.lock().await;
        if let Some(prev) = *last_start {
            let since = prev.elapsed();
            if since < MIN_REQUEST_SPACING {
                tokio::time::sleep(MIN_REQUEST_SPACING - since).await;
            }
        }
        *last_start = Some(Instant::now());

        let candidates: Vec<Candidate> = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        drop(last_start);

        let Some(first) = candidates.into_iter().next() else {
            debug!(%query, "no geocoding candidate");
            return Ok(None);
        };

        let lat = first.lat.as_deref().and_then(|v| v.parse::<f64>().ok());
        let lon = first.lon.as_deref().and_then(|v| v.parse::<f64>().ok());
        match (lat, lon) {
            (Some(latitude), Some(longitude)) => Ok(Some(Coordinates {
                latitude,
                longitude,
            })),
            _ => {
                debug!(%query, "candidate without usable coordinates");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{any, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_geocoder(base_url: &str) -> Geocoder {
        Geocoder::new(&GeocoderConfig {
            base_url: base_url.to_string(),
            user_agent: "eventmap-tests/0.1".to_string(),
        })
        .expect("geocoder should construct")
    }

    #[tokio::test]
    async fn blank_field_short_circuits_without_network_call() {
        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let geocoder = test_geocoder(&server.uri());
        for (street, city, state, zip) in [
            ("", "Springfield", "IL", "62701"),
            ("1 Main St", "   ", "IL", "62701"),
            ("1 Main St", "Springfield", "", "62701"),
            ("1 Main St", "Springfield", "IL", " "),
        ] {
            let result = geocoder.resolve(street, city, state, zip).await;
            assert!(matches!(result, Ok(None)));
        }
    }

    #[tokio::test]
    async fn resolves_first_candidate_with_expected_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "1 Main St, Springfield, IL 62701"))
            .and(query_param("format", "json"))
            .and(query_param("limit", "1"))
            .and(header("user-agent", "eventmap-tests/0.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "lat": "39.7990", "lon": "-89.6440" },
                { "lat": "0.0", "lon": "0.0" }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let geocoder = test_geocoder(&server.uri());
        let coords = geocoder
            .resolve("1 Main St", "Springfield", "IL", "62701")
            .await
            .expect("lookup should succeed")
            .expect("address should resolve");
        assert_eq!(coords.latitude, 39.7990);
        assert_eq!(coords.longitude, -89.6440);
    }

    #[tokio::test]
    async fn empty_result_set_is_unresolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let geocoder = test_geocoder(&server.uri());
        let result = geocoder
            .resolve("1 Nowhere Ln", "Atlantis", "XX", "00000")
            .await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn non_numeric_coordinates_are_unresolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "lat": "not-a-number", "lon": "-89.6440" }
            ])))
            .mount(&server)
            .await;

        let geocoder = test_geocoder(&server.uri());
        let result = geocoder
            .resolve("1 Main St", "Springfield", "IL", "62701")
            .await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn missing_coordinate_fields_are_unresolved() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{}])))
            .mount(&server)
            .await;

        let geocoder = test_geocoder(&server.uri());
        let result = geocoder
            .resolve("1 Main St", "Springfield", "IL", "62701")
            .await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn server_error_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let geocoder = test_geocoder(&server.uri());
        let result = geocoder
            .resolve("1 Main St", "Springfield", "IL", "62701")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn malformed_body_is_a_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let geocoder = test_geocoder(&server.uri());
        let result = geocoder
            .resolve("1 Main St", "Springfield", "IL", "62701")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn concurrent_lookups_are_spaced_at_least_one_second_apart() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "lat": "39.7990", "lon": "-89.6440" }
            ])))
            .expect(2)
            .mount(&server)
            .await;

        let geocoder = Arc::new(test_geocoder(&server.uri()));
        let started = Instant::now();
        let (a, b) = tokio::join!(
            geocoder.resolve("1 Main St", "Springfield", "IL", "62701"),
            geocoder.resolve("2 Main St", "Springfield", "IL", "62701"),
        );
        assert!(a.expect("first lookup").is_some());
        assert!(b.expect("second lookup").is_some());
        assert!(
            started.elapsed() >= MIN_REQUEST_SPACING,
            "second request started {:?} after the first",
            started.elapsed()
        );
    }
}
