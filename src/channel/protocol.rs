use crate::event::{JoinAck, LocationUpdate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Wire frame: `{"event": ..., "data": ..., "ackId": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "ackId", default, skip_serializing_if = "Option::is_none")]
    pub ack_id: Option<u64>,
}

impl Frame {
    /// Server acknowledgement of an emitted frame
    pub const ACK: &'static str = "ack";
    /// Server-initiated termination
    pub const DISCONNECT: &'static str = "disconnect";
    /// Join confirmation pushed as a plain event by some servers
    pub const ROOM_JOINED: &'static str = "roomJoined";

    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            ack_id: None,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server terminated the session deliberately
    ServerDisconnect,
    /// `disconnect()` was called locally
    ClientDisconnect,
    /// The socket closed without a close handshake
    TransportClose,
    TransportError,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::ServerDisconnect => "io server disconnect",
            DisconnectReason::ClientDisconnect => "io client disconnect",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
        }
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Passive connection indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    /// Bounded retries used up; only a manual reconnect revives the channel
    Exhausted,
}

/// Closed set of inbound messages
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected { reason: DisconnectReason },
    Error { message: String },
    LocationUpdate(LocationUpdate),
    RoomJoinAck(JoinAck),
    /// Any other named event
    Message { event: String, data: Value },
}

impl ChannelEvent {
    /// Classify a data frame. Fails only when a known event carries a
    /// payload of the wrong shape.
    pub fn from_frame(frame: Frame, location_events: &[String]) -> Result<Self, serde_json::Error> {
        if location_events.iter().any(|name| *name == frame.event) {
            return Ok(ChannelEvent::LocationUpdate(serde_json::from_value(frame.data)?));
        }
        if frame.event == Frame::ROOM_JOINED {
            return Ok(ChannelEvent::RoomJoinAck(serde_json::from_value(frame.data)?));
        }
        Ok(ChannelEvent::Message {
            event: frame.event,
            data: frame.data,
        })
    }
}
