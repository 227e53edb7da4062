//! Thin asynchronous client for the Mapbox Directions API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::Coordinates;

const DEFAULT_BASE_URL: &str = "https://api.mapbox.com/directions/v5/mapbox/driving/";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "grain-provisioner/1.0.0";

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("api error: {0}")]
    Api(String),
}

/// On-demand driving-distance lookups between two coordinate pairs.
///
/// No latency bound is guaranteed by implementations; callers that cannot
/// stall must rely on the client-side request timeout.
#[async_trait]
pub trait RoutingService: Send + Sync {
    /// Driving distance in kilometers from `from` to `to`.
    async fn driving_distance(
        &self,
        from: Coordinates,
        to: Coordinates,
    ) -> Result<f64, RoutingError>;
}

#[derive(Clone)]
pub struct MapboxClient {
    http: Client,
    base_url: Url,
    access_token: String,
}

impl MapboxClient {
    pub fn new(access_token: impl Into<String>) -> Result<Self, RoutingError> {
        Self::with_base_url(DEFAULT_BASE_URL, access_token)
    }

    /// Point the client at a different endpoint (used by tests and proxies).
    pub fn with_base_url(
        base: &str,
        access_token: impl Into<String>,
    ) -> Result<Self, RoutingError> {
        let base_url = Url::parse(base)?;
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(DEFAULT_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url,
            access_token: access_token.into(),
        })
    }

    /// Replace the request timeout (default 30s).
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, RoutingError> {
        self.http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(self)
    }

    fn directions_url(&self, from: Coordinates, to: Coordinates) -> Result<Url, url::ParseError> {
        let mut url = self.base_url.join(&format!(
            "{},{};{},{}",
            from.lon, from.lat, to.lon, to.lat
        ))?;
        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token)
            .append_pair("overview", "false");
        Ok(url)
    }
}

#[async_trait]
impl RoutingService for MapboxClient {
    async fn driving_distance(
        &self,
        from: Coordinates,
        to: Coordinates,
    ) -> Result<f64, RoutingError> {
        let url = self.directions_url(from, to)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        let directions: DirectionsDto = response.json().await?;

        if !directions.code.eq_ignore_ascii_case("ok") {
            return Err(RoutingError::Api(
                directions.message.unwrap_or(directions.code),
            ));
        }

        // The API reports meters; the rest of the pipeline works in km.
        let meters = directions
            .routes
            .first()
            .map(|route| route.distance)
            .ok_or_else(|| RoutingError::Api("response contains no routes".to_string()))?;
        Ok(meters / 1000.0)
    }
}

#[derive(Debug, Deserialize)]
struct DirectionsDto {
    code: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    routes: Vec<RouteDto>,
}

#[derive(Debug, Deserialize)]
struct RouteDto {
    distance: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directions_url_is_lon_lat_ordered() {
        let client = MapboxClient::with_base_url(DEFAULT_BASE_URL, "tok").unwrap();
        let url = client
            .directions_url(
                Coordinates {
                    lon: -47.9,
                    lat: -15.8,
                },
                Coordinates {
                    lon: -48.3,
                    lat: -16.0,
                },
            )
            .unwrap();
        let rendered = url.to_string();
        assert!(rendered.contains("-47.9,-15.8;-48.3,-16"));
        assert!(rendered.contains("access_token=tok"));
        assert!(rendered.contains("overview=false"));
    }

    #[test]
    fn empty_route_list_is_an_api_error() {
        let dto: DirectionsDto =
            serde_json::from_str(r#"{"code":"Ok","routes":[]}"#).expect("parses");
        assert!(dto.routes.is_empty());
    }

    #[test]
    fn distance_payload_parses() {
        let dto: DirectionsDto =
            serde_json::from_str(r#"{"code":"Ok","routes":[{"distance":12345.6}]}"#)
                .expect("parses");
        assert_eq!(dto.routes[0].distance, 12345.6);
    }
}
