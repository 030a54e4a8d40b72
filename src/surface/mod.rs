// Map surface abstraction: everything drawn on the map goes through SurfaceOp

mod deferred;
mod logging;

pub use deferred::DeferredSurface;
pub use logging::LoggingSurface;

use crate::route::RoutePath;
use crate::state::Position;
use std::fmt;

/// Marker fill colour, derived from entity status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MarkerColor {
    Green,
    Red,
    Orange,
    Gray,
}

impl MarkerColor {
    pub fn hex(&self) -> &'static str {
        match self {
            MarkerColor::Green => "#22c55e",
            MarkerColor::Red => "#ef4444",
            MarkerColor::Orange => "#f97316",
            MarkerColor::Gray => "#9ca3af",
        }
    }
}

impl fmt::Display for MarkerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.hex())
    }
}

/// Visual style of one marker
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerStyle {
    pub color: MarkerColor,
    pub label: Option<String>,
}

/// One instruction for the map surface
#[derive(Clone, Debug, PartialEq)]
pub enum SurfaceOp {
    /// Create a marker; the surface reports clicks on it back by entity id
    AddMarker {
        id: String,
        position: Position,
        style: MarkerStyle,
    },
    MoveMarker {
        id: String,
        position: Position,
        /// Direction of travel in degrees clockwise from north
        bearing: Option<f64>,
    },
    RestyleMarker {
        id: String,
        style: MarkerStyle,
    },
    RemoveMarker {
        id: String,
    },
    DrawRoute {
        path: RoutePath,
    },
    ClearRoute,
}

/// Rendering backend (a map widget, a browser bridge, a log).
pub trait MapSurface: Send {
    fn apply(&mut self, op: &SurfaceOp);
}
