// Route overlay renderer: at most one path between two points on the map

mod fallback;
mod provider;

pub use fallback::approximate_curve;
pub use provider::{DirectionsClient, RouteGeometry, RouteProvider};

use crate::state::Position;
use crate::surface::{DeferredSurface, SurfaceOp};
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};


/// Route overlay configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Query the routing service at all
    pub enabled: bool,
    pub base_url: String,
    pub profile: String,
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    /// Draw an approximate curve when no real route is available
    pub fallback: bool,
    pub curve_segments: usize,
    pub curvature: f64,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.mapbox.com/directions/v5".to_string(),
            profile: "mapbox/driving".to_string(),
            access_token: None,
            timeout_secs: 10,
            fallback: true,
            curve_segments: 32,
            curvature: 0.2,
        }
    }
}

/// A drawn path; approximate paths are never passed off as navigation data
#[derive(Clone, Debug, PartialEq)]
pub enum RoutePath {
    /// Geometry from the routing service
    Routed {
        coordinates: Vec<Position>,
        distance_m: Option<f64>,
        duration_s: Option<f64>,
    },
    /// Synthesized curve, visual only
    Approximate { coordinates: Vec<Position> },
}

impl RoutePath {
    pub fn coordinates(&self) -> &[Position] {
        match self {
            RoutePath::Routed { coordinates, .. } => coordinates,
            RoutePath::Approximate { coordinates } => coordinates,
        }
    }

    pub fn is_approximate(&self) -> bool {
        matches!(self, RoutePath::Approximate { .. })
    }
}

/// Overlay lifecycle: Empty -> Drawing -> Drawn -> (Drawing | Empty)
#[derive(Clone, Debug, PartialEq)]
pub enum RouteState {
    Empty,
    Drawing { request_id: u64 },
    Drawn { request_id: u64, path: RoutePath },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RouteRequest {
    pub id: u64,
    pub origin: Position,
    pub destination: Position,
}

/// Routing service answer for one request
pub struct RouteResult {
    pub request: RouteRequest,
    pub result: Result<Option<RouteGeometry>>,
}

pub struct RouteRenderer {
    config: RouteConfig,
    provider: Option<Arc<dyn RouteProvider>>,
    state: RouteState,
    next_request: u64,
    /// An overlay is currently on the surface
    overlay_on_surface: bool,
}

impl RouteRenderer {
    pub fn new(config: RouteConfig, provider: Option<Arc<dyn RouteProvider>>) -> Self {
        let provider = if config.enabled { provider } else { None };
        Self {
            config,
            provider,
            state: RouteState::Empty,
            next_request: 0,
            overlay_on_surface: false,
        }
    }

    /// Renderer backed by the configured directions service
    pub fn from_config(config: RouteConfig) -> Result<Self> {
        let provider: Option<Arc<dyn RouteProvider>> = if config.enabled {
            Some(Arc::new(DirectionsClient::new(
                &config.base_url,
                &config.profile,
                config.access_token.clone(),
                Duration::from_secs(config.timeout_secs),
            )?))
        } else {
            None
        };
        Ok(Self::new(config, provider))
    }

    pub fn state(&self) -> &RouteState {
        &self.state
    }

    /// Start a new request, superseding any earlier one
    pub fn begin(&mut self, origin: Position, destination: Position) -> RouteRequest {
        self.next_request += 1;
        let request = RouteRequest {
            id: self.next_request,
            origin,
            destination,
        };
        self.state = RouteState::Drawing {
            request_id: request.id,
        };
        request
    }

    /// Future that asks the routing service for `request`.
    ///
    /// Owns everything it needs so it can run as a detached task.
    pub fn fetch(&self, request: RouteRequest) -> impl Future<Output = RouteResult> + Send + 'static {
        let provider = self.provider.clone();
        async move {
            let result = match provider {
                Some(provider) => provider.fetch_route(request.origin, request.destination).await,
                None => Err(anyhow!("Routing service disabled")),
            };
            RouteResult { request, result }
        }
    }

    /// Apply a routing answer. Returns false if the request was superseded.
    pub fn complete(&mut self, outcome: RouteResult, surface: &mut DeferredSurface) -> bool {
        let request = outcome.request;
        if self.state != (RouteState::Drawing { request_id: request.id }) {
            debug!(request_id = request.id, "Discarding superseded route result");
            return false;
        }

        let path = match outcome.result {
            Ok(Some(geometry)) => Some(RoutePath::Routed {
                coordinates: geometry.coordinates,
                distance_m: geometry.distance_m,
                duration_s: geometry.duration_s,
            }),
            Ok(None) => {
                info!(request_id = request.id, "No route found");
                self.fallback_path(&request)
            }
            Err(e) => {
                warn!(request_id = request.id, error = %e, "Route fetch failed");
                self.fallback_path(&request)
            }
        };

        self.remove_overlay(surface);

        match path {
            Some(path) => {
                surface.submit(SurfaceOp::DrawRoute { path: path.clone() });
                self.overlay_on_surface = true;
                self.state = RouteState::Drawn {
                    request_id: request.id,
                    path,
                };
            }
            None => self.state = RouteState::Empty,
        }
        true
    }

    fn fallback_path(&self, request: &RouteRequest) -> Option<RoutePath> {
        if !self.config.fallback {
            return None;
        }
        debug!(request_id = request.id, "Using approximate route");
        Some(RoutePath::Approximate {
            coordinates: approximate_curve(
                request.origin,
                request.destination,
                self.config.curve_segments,
                self.config.curvature,
            ),
        })
    }

    /// Request, fetch and draw in one go
    pub async fn draw(
        &mut self,
        origin: Position,
        destination: Position,
        surface: &mut DeferredSurface,
    ) -> bool {
        let request = self.begin(origin, destination);
        let outcome = self.fetch(request).await;
        self.complete(outcome, surface)
    }

    /// Remove the overlay and forget any pending request
    pub fn clear(&mut self, surface: &mut DeferredSurface) {
        self.remove_overlay(surface);
        self.state = RouteState::Empty;
    }

    fn remove_overlay(&mut self, surface: &mut DeferredSurface) {
        if self.overlay_on_surface {
            surface.submit(SurfaceOp::ClearRoute);
            self.overlay_on_surface = false;
        }
    }
}
