use super::{MapSurface, SurfaceOp};
use crate::route::RoutePath;
use std::collections::HashSet;
use tracing::{debug, info};

/// Headless surface that logs marker and route activity
#[derive(Default)]
pub struct LoggingSurface {
    markers: HashSet<String>,
}

impl LoggingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }
}

impl MapSurface for LoggingSurface {
    fn apply(&mut self, op: &SurfaceOp) {
        match op {
            SurfaceOp::AddMarker {
                id,
                position,
                style,
            } => {
                self.markers.insert(id.clone());
                info!(
                    entity_id = %id,
                    lat = position.lat,
                    lng = position.lng,
                    color = %style.color,
                    markers = self.markers.len(),
                    "Marker added"
                );
            }
            SurfaceOp::MoveMarker {
                id,
                position,
                bearing,
            } => {
                debug!(entity_id = %id, lat = position.lat, lng = position.lng, bearing = ?bearing, "Marker moved");
            }
            SurfaceOp::RestyleMarker { id, style } => {
                info!(entity_id = %id, color = %style.color, "Marker restyled");
            }
            SurfaceOp::RemoveMarker { id } => {
                self.markers.remove(id);
                info!(entity_id = %id, markers = self.markers.len(), "Marker removed");
            }
            SurfaceOp::DrawRoute { path } => match path {
                RoutePath::Routed {
                    coordinates,
                    distance_m,
                    duration_s,
                } => info!(
                    points = coordinates.len(),
                    distance_m = ?distance_m,
                    duration_s = ?duration_s,
                    "Route drawn"
                ),
                RoutePath::Approximate { coordinates } => {
                    info!(points = coordinates.len(), "Approximate route drawn")
                }
            },
            SurfaceOp::ClearRoute => debug!("Route cleared"),
        }
    }
}
