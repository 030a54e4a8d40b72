use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Geographic position in decimal degrees
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub const ORIGIN: Position = Position { lat: 0.0, lng: 0.0 };

    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// (0, 0) means the device has not reported a fix yet
    pub fn is_fixed(&self) -> bool {
        !(self.lat == 0.0 && self.lng == 0.0)
    }

    /// `[lng, lat]` pair as used by GeoJSON and routing services
    pub fn to_lng_lat(self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::ORIGIN
    }
}

/// Which snapshot collection an entity belongs to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    #[default]
    Agent,
    Restaurant,
    Order,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Agent => write!(f, "agent"),
            EntityKind::Restaurant => write!(f, "restaurant"),
            EntityKind::Order => write!(f, "order"),
        }
    }
}

/// Delivery status reported by an agent.
///
/// Unrecognised values are kept verbatim so they can still be displayed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentStatus {
    #[default]
    Available,
    OrderAssigned,
    PickedUp,
    Other(String),
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Available => "AVAILABLE",
            AgentStatus::OrderAssigned => "ORDER_ASSIGNED",
            AgentStatus::PickedUp => "PICKED_UP",
            AgentStatus::Other(s) => s,
        }
    }
}

impl From<&str> for AgentStatus {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "AVAILABLE" => AgentStatus::Available,
            "ORDER_ASSIGNED" => AgentStatus::OrderAssigned,
            "PICKED_UP" => AgentStatus::PickedUp,
            _ => AgentStatus::Other(s.to_string()),
        }
    }
}

impl From<String> for AgentStatus {
    fn from(s: String) -> Self {
        AgentStatus::from(s.as_str())
    }
}

impl From<AgentStatus> for String {
    fn from(status: AgentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device metadata reported by the courier app
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// Entity is one trackable object (agent, restaurant or order location)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier, unique across the collection
    pub id: String,

    pub kind: EntityKind,

    /// Latest known position; (0, 0) until a fix arrives
    pub position: Position,

    pub status: AgentStatus,

    pub name: Option<String>,

    pub device: Option<DeviceInfo>,

    /// Positional accuracy in metres
    pub accuracy: Option<f64>,

    /// Last time any field was written
    pub last_updated: DateTime<Utc>,
}

impl Entity {
    /// Build a fresh record from a patch, defaulting every unspecified field
    pub(crate) fn from_patch(patch: &EntityPatch, now: DateTime<Utc>) -> Self {
        Self {
            id: patch.id.clone(),
            kind: patch.kind.unwrap_or_default(),
            position: patch.position.unwrap_or_default(),
            status: patch.status.clone().unwrap_or_default(),
            name: patch.name.clone(),
            device: patch.device.clone(),
            accuracy: patch.accuracy,
            last_updated: now,
        }
    }

    /// Whether this entity should be shown on the map
    pub fn has_fix(&self) -> bool {
        self.position.is_fixed()
    }
}

/// Partial entity: an identifier plus any subset of attributes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EntityPatch {
    pub id: String,
    pub kind: Option<EntityKind>,
    pub position: Option<Position>,
    pub status: Option<AgentStatus>,
    pub name: Option<String>,
    pub device: Option<DeviceInfo>,
    pub accuracy: Option<f64>,
}

impl EntityPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn position(mut self, lat: f64, lng: f64) -> Self {
        self.position = Some(Position::new(lat, lng));
        self
    }

    pub fn status(mut self, status: AgentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn device(mut self, device: DeviceInfo) -> Self {
        self.device = Some(device);
        self
    }

    pub fn accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
}

/// Outcome of applying one patch
#[derive(Clone, Debug, PartialEq)]
pub struct EntityUpdate {
    /// Record after the merge
    pub entity: Entity,
    /// Position before the merge (None if the entity was just created)
    pub previous_position: Option<Position>,
    pub created: bool,
    pub position_changed: bool,
    pub status_changed: bool,
    /// Any field at all changed
    pub changed: bool,
}

/// Collection change broadcast to subscribers
#[derive(Clone, Debug, PartialEq)]
pub enum EntityChange {
    Upserted(EntityUpdate),
    Removed { entity_id: String },
}

impl EntityChange {
    pub fn entity_id(&self) -> &str {
        match self {
            EntityChange::Upserted(update) => &update.entity.id,
            EntityChange::Removed { entity_id } => entity_id,
        }
    }
}
