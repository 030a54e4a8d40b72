use super::Marker;
use crate::state::{AgentStatus, Entity, Position};
use crate::surface::{MarkerColor, MarkerStyle};
use std::collections::{HashMap, HashSet};

/// Colour for an entity status
pub fn status_color(status: &AgentStatus) -> MarkerColor {
    match status {
        AgentStatus::Available => MarkerColor::Green,
        AgentStatus::OrderAssigned => MarkerColor::Red,
        AgentStatus::PickedUp => MarkerColor::Orange,
        AgentStatus::Other(_) => MarkerColor::Gray,
    }
}

pub fn style_for(entity: &Entity) -> MarkerStyle {
    MarkerStyle {
        color: status_color(&entity.status),
        label: entity.name.clone(),
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerSpec {
    pub entity_id: String,
    pub position: Position,
    pub style: MarkerStyle,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerMove {
    pub entity_id: String,
    pub to: Position,
}

/// Marker changes needed to match the entity collection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerPlan {
    pub create: Vec<MarkerSpec>,
    pub moves: Vec<MarkerMove>,
    pub restyle: Vec<MarkerSpec>,
    pub remove: Vec<String>,
}

impl MarkerPlan {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.moves.is_empty()
            && self.restyle.is_empty()
            && self.remove.is_empty()
    }
}

/// Diff the entity collection against the marker registry.
///
/// Only entities with a fix get markers. Moves compare against the marker's
/// target rather than its rendered position, so an in-flight animation is
/// not restarted for the same destination.
pub fn plan(entities: &[Entity], markers: &HashMap<String, Marker>) -> MarkerPlan {
    let mut plan = MarkerPlan::default();
    let mut visible = HashSet::with_capacity(entities.len());

    for entity in entities.iter().filter(|e| e.has_fix()) {
        visible.insert(entity.id.as_str());
        let style = style_for(entity);

        match markers.get(&entity.id) {
            None => plan.create.push(MarkerSpec {
                entity_id: entity.id.clone(),
                position: entity.position,
                style,
            }),
            Some(marker) => {
                if marker.target != entity.position {
                    plan.moves.push(MarkerMove {
                        entity_id: entity.id.clone(),
                        to: entity.position,
                    });
                }
                if marker.style != style {
                    plan.restyle.push(MarkerSpec {
                        entity_id: entity.id.clone(),
                        position: entity.position,
                        style,
                    });
                }
            }
        }
    }

    let mut remove: Vec<String> = markers
        .keys()
        .filter(|id| !visible.contains(id.as_str()))
        .cloned()
        .collect();
    remove.sort();
    plan.remove = remove;

    plan
}
