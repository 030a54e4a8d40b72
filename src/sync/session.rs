use crate::channel::ChannelEvent;
use crate::event::JoinRoom;

/// Room membership bookkeeping for one synchronizer.
///
/// The identity is fixed at construction, so every reconnect re-announces
/// exactly the same `joinRoom` payload.
#[derive(Debug, Clone)]
pub struct Session {
    identity: JoinRoom,
    joined: bool,
    connects: u64,
}

impl Session {
    pub fn new(identity: JoinRoom) -> Self {
        Self {
            identity,
            joined: false,
            connects: 0,
        }
    }

    pub fn identity(&self) -> &JoinRoom {
        &self.identity
    }

    /// Update bookkeeping; returns the join to emit, if this event calls for one
    pub fn observe(&mut self, event: &ChannelEvent) -> Option<JoinRoom> {
        match event {
            ChannelEvent::Connected => {
                self.connects += 1;
                self.joined = false;
                Some(self.identity.clone())
            }
            ChannelEvent::Disconnected { .. } => {
                self.joined = false;
                None
            }
            ChannelEvent::RoomJoinAck(ack) => {
                self.joined = ack.success;
                None
            }
            _ => None,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Successful connects so far, the first one included
    pub fn connects(&self) -> u64 {
        self.connects
    }

    pub fn is_reconnect(&self) -> bool {
        self.connects > 1
    }
}
