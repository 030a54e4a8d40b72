use super::LocationUpdate;
use crate::state::{AgentStatus, DeviceInfo, EntityKind, EntityPatch, Position};
use serde_json::{Map, Value};
use std::fmt;

/// Reasons a raw record is rejected
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    NotObject,
    MissingId,
    /// Only one of latitude/longitude was supplied
    IncompletePosition,
    InvalidCoordinate { field: &'static str, value: f64 },
    InvalidField(&'static str),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::NotObject => write!(f, "record must be a JSON object"),
            ValidationError::MissingId => write!(f, "record has no identifier"),
            ValidationError::IncompletePosition => {
                write!(f, "latitude and longitude must be given together")
            }
            ValidationError::InvalidCoordinate { field, value } => {
                write!(f, "{} out of range: {}", field, value)
            }
            ValidationError::InvalidField(field) => write!(f, "field '{}' has the wrong shape", field),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Turn a stream location update into a patch for the reconciler.
pub fn validate_location_update(update: &LocationUpdate) -> Result<EntityPatch, ValidationError> {
    let id = update
        .agent_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(ValidationError::MissingId)?;

    let position = match (update.lat, update.lng) {
        (Some(lat), Some(lng)) => Some(check_coordinates(lat, lng)?),
        (None, None) => None,
        _ => return Err(ValidationError::IncompletePosition),
    };

    Ok(EntityPatch {
        id: id.to_string(),
        kind: Some(EntityKind::Agent),
        position,
        status: update.current_status.as_deref().map(AgentStatus::from),
        name: update.name.clone(),
        device: update.device_info.clone(),
        accuracy: update.accuracy,
    })
}

/// Normalise one REST snapshot record.
///
/// Accepted shapes:
/// - identifier: `id`, `_id` or `agentId` (string or number)
/// - position: top-level `lat`/`lng`, `location: {lat, lng}` or GeoJSON
///   `location: {coordinates: [lng, lat]}`
/// - status: `currentStatus` or `status`
pub fn normalize_record(record: &Value, kind: EntityKind) -> Result<EntityPatch, ValidationError> {
    let obj = record.as_object().ok_or(ValidationError::NotObject)?;

    let id = ["id", "_id", "agentId"]
        .iter()
        .find_map(|key| id_value(obj.get(*key)?))
        .ok_or(ValidationError::MissingId)?;

    let position = extract_position(obj)?;

    let status = match first_of(obj, &["currentStatus", "status"]) {
        Some(Value::String(s)) => Some(AgentStatus::from(s.as_str())),
        Some(Value::Null) | None => None,
        Some(_) => return Err(ValidationError::InvalidField("status")),
    };

    let name = match first_of(obj, &["name", "fullName"]) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    };

    let device = match obj.get("deviceInfo") {
        Some(Value::Null) | None => None,
        Some(v) => Some(
            serde_json::from_value::<DeviceInfo>(v.clone())
                .map_err(|_| ValidationError::InvalidField("deviceInfo"))?,
        ),
    };

    let accuracy = match obj.get("accuracy") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Null) | None => None,
        Some(_) => return Err(ValidationError::InvalidField("accuracy")),
    };

    Ok(EntityPatch {
        id,
        kind: Some(kind),
        position,
        status,
        name,
        device,
        accuracy,
    })
}

fn id_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key))
}

fn extract_position(obj: &Map<String, Value>) -> Result<Option<Position>, ValidationError> {
    if let Some(position) = lat_lng(obj)? {
        return Ok(Some(position));
    }

    match obj.get("location") {
        Some(Value::Object(location)) => {
            if let Some(position) = lat_lng(location)? {
                return Ok(Some(position));
            }
            match location.get("coordinates") {
                Some(Value::Array(pair)) if pair.len() >= 2 => {
                    let lng = pair[0].as_f64().ok_or(ValidationError::InvalidField("location"))?;
                    let lat = pair[1].as_f64().ok_or(ValidationError::InvalidField("location"))?;
                    Ok(Some(check_coordinates(lat, lng)?))
                }
                Some(_) => Err(ValidationError::InvalidField("location")),
                None => Ok(None),
            }
        }
        Some(Value::Null) | None => Ok(None),
        Some(_) => Err(ValidationError::InvalidField("location")),
    }
}

fn lat_lng(obj: &Map<String, Value>) -> Result<Option<Position>, ValidationError> {
    let lat = first_of(obj, &["lat", "latitude"]).and_then(Value::as_f64);
    let lng = first_of(obj, &["lng", "longitude"]).and_then(Value::as_f64);
    match (lat, lng) {
        (Some(lat), Some(lng)) => Ok(Some(check_coordinates(lat, lng)?)),
        (None, None) => Ok(None),
        _ => Err(ValidationError::IncompletePosition),
    }
}

fn check_coordinates(lat: f64, lng: f64) -> Result<Position, ValidationError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(ValidationError::InvalidCoordinate {
            field: "lat",
            value: lat,
        });
    }
    if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
        return Err(ValidationError::InvalidCoordinate {
            field: "lng",
            value: lng,
        });
    }
    Ok(Position::new(lat, lng))
}
