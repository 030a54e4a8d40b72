use crate::state::Position;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Path returned by a routing service
#[derive(Clone, Debug, PartialEq)]
pub struct RouteGeometry {
    pub coordinates: Vec<Position>,
    pub distance_m: Option<f64>,
    pub duration_s: Option<f64>,
}

/// A real routing service.
///
/// `Ok(None)` means the service answered but found no route.
#[async_trait]
pub trait RouteProvider: Send + Sync {
    async fn fetch_route(
        &self,
        origin: Position,
        destination: Position,
    ) -> Result<Option<RouteGeometry>>;
}

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    geometry: LineString,
    #[serde(default)]
    distance: Option<f64>,
    #[serde(default)]
    duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LineString {
    /// `[lng, lat]` pairs
    coordinates: Vec<[f64; 2]>,
}

/// HTTP client for a Mapbox/OSRM-style directions API.
///
/// Requests `{base_url}/{profile}/{lng},{lat};{lng},{lat}` with GeoJSON
/// geometry.
pub struct DirectionsClient {
    http_client: Client,
    base_url: String,
    profile: String,
    access_token: Option<String>,
}

impl DirectionsClient {
    pub fn new(
        base_url: &str,
        profile: &str,
        access_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            profile: profile.trim_matches('/').to_string(),
            access_token,
        })
    }

    fn url(&self, origin: Position, destination: Position) -> String {
        let [olng, olat] = origin.to_lng_lat();
        let [dlng, dlat] = destination.to_lng_lat();
        let mut url = format!(
            "{}/{}/{},{};{},{}?geometries=geojson&overview=full",
            self.base_url, self.profile, olng, olat, dlng, dlat
        );
        if let Some(token) = &self.access_token {
            url.push_str("&access_token=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }
}

#[async_trait]
impl RouteProvider for DirectionsClient {
    async fn fetch_route(
        &self,
        origin: Position,
        destination: Position,
    ) -> Result<Option<RouteGeometry>> {
        let url = self.url(origin, destination);

        let response: DirectionsResponse = self
            .http_client
            .get(&url)
            .send()
            .await
            .context("Directions request failed")?
            .error_for_status()
            .context("Directions service returned an error status")?
            .json()
            .await
            .context("Failed to decode directions response")?;

        if let Some(code) = response.code.as_deref() {
            if code != "Ok" && code != "NoRoute" {
                return Err(anyhow!("Directions service error code '{}'", code));
            }
        }

        let Some(route) = response.routes.into_iter().next() else {
            return Ok(None);
        };
        if route.geometry.coordinates.len() < 2 {
            return Ok(None);
        }

        Ok(Some(RouteGeometry {
            coordinates: route
                .geometry
                .coordinates
                .into_iter()
                .map(|[lng, lat]| Position::new(lat, lng))
                .collect(),
            distance_m: route.distance,
            duration_s: route.duration,
        }))
    }
}
