// Marker lifecycle manager: sole writer of map markers

mod diff;

pub use diff::{plan, status_color, style_for, MarkerMove, MarkerPlan, MarkerSpec};

use crate::motion::{Animator, Frame};
use crate::state::{Entity, Position};
use crate::surface::{DeferredSurface, MarkerStyle, SurfaceOp};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;


/// Visual proxy for one entity
#[derive(Clone, Debug, PartialEq)]
pub struct Marker {
    pub entity_id: String,
    /// Latest entity position this marker is heading to
    pub target: Position,
    /// Position last sent to the surface
    pub rendered: Position,
    pub style: MarkerStyle,
}

/// Keeps markers in 1:1 correspondence with entities that have a fix.
#[derive(Default)]
pub struct MarkerManager {
    markers: HashMap<String, Marker>,
}

impl MarkerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff `entities` against the registry and apply the result.
    ///
    /// Position changes are handed to `animator`; colour changes apply
    /// immediately.
    pub fn reconcile(
        &mut self,
        entities: &[Entity],
        animator: &mut Animator,
        surface: &mut DeferredSurface,
        now: Instant,
    ) -> MarkerPlan {
        let plan = plan(entities, &self.markers);
        if plan.is_empty() {
            return plan;
        }

        for id in &plan.remove {
            animator.cancel(id);
            self.markers.remove(id);
            surface.submit(SurfaceOp::RemoveMarker { id: id.clone() });
        }

        for spec in &plan.create {
            self.markers.insert(
                spec.entity_id.clone(),
                Marker {
                    entity_id: spec.entity_id.clone(),
                    target: spec.position,
                    rendered: spec.position,
                    style: spec.style.clone(),
                },
            );
            surface.submit(SurfaceOp::AddMarker {
                id: spec.entity_id.clone(),
                position: spec.position,
                style: spec.style.clone(),
            });
        }

        for spec in &plan.restyle {
            if let Some(marker) = self.markers.get_mut(&spec.entity_id) {
                marker.style = spec.style.clone();
                surface.submit(SurfaceOp::RestyleMarker {
                    id: spec.entity_id.clone(),
                    style: spec.style.clone(),
                });
            }
        }

        for step in &plan.moves {
            let Some(marker) = self.markers.get_mut(&step.entity_id) else {
                continue;
            };
            marker.target = step.to;
            if !animator.start(&step.entity_id, marker.rendered, step.to, now) {
                // Nothing to interpolate; place the marker directly
                marker.rendered = step.to;
                surface.submit(SurfaceOp::MoveMarker {
                    id: step.entity_id.clone(),
                    position: step.to,
                    bearing: None,
                });
            }
        }

        debug!(
            created = plan.create.len(),
            moved = plan.moves.len(),
            restyled = plan.restyle.len(),
            removed = plan.remove.len(),
            markers = self.markers.len(),
            "Markers reconciled"
        );

        plan
    }

    /// Push one animation frame to the surface
    pub fn render(&mut self, frames: &[Frame], surface: &mut DeferredSurface) {
        for frame in frames {
            let Some(marker) = self.markers.get_mut(&frame.entity_id) else {
                continue;
            };
            marker.rendered = frame.position;
            surface.submit(SurfaceOp::MoveMarker {
                id: frame.entity_id.clone(),
                position: frame.position,
                bearing: frame.bearing,
            });
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<&Marker> {
        self.markers.get(entity_id)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}
