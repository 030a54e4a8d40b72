use crate::state::DeviceInfo;
use serde::{Deserialize, Deserializer, Serialize};

mod validation;

pub use validation::{normalize_record, validate_location_update, ValidationError};

/// Push-based location delta for one agent.
///
/// Every field is optional on the wire; `validate_location_update` decides
/// whether the message is usable.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    #[serde(default, deserialize_with = "string_or_number")]
    pub agent_id: Option<String>,

    #[serde(default)]
    pub lat: Option<f64>,

    #[serde(default)]
    pub lng: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_info: Option<DeviceInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Identifier sent either as a JSON string or a JSON number
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<WireId>::deserialize(deserializer)?.map(|id| match id {
        WireId::Text(text) => text,
        WireId::Number(number) => number.to_string(),
    }))
}

/// Room-join handshake announced after every successful connect
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRoom {
    pub user_id: String,
    pub user_type: String,
}

impl JoinRoom {
    pub const EVENT: &'static str = "joinRoom";

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_type: "admin".to_string(),
        }
    }
}

/// Server acknowledgement of `joinRoom`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
