use super::protocol::DisconnectReason;
use std::time::Duration;

/// What to do after a connection ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectAction {
    /// Reconnect right away (server-initiated termination)
    Immediate,
    /// Retry with the fixed delay, within the attempt budget
    Backoff,
    /// Stay down (local disconnect)
    Stop,
}

/// Bounded retries with a fixed delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn after_disconnect(&self, reason: &DisconnectReason) -> ReconnectAction {
        match reason {
            DisconnectReason::ClientDisconnect => ReconnectAction::Stop,
            DisconnectReason::ServerDisconnect => ReconnectAction::Immediate,
            DisconnectReason::TransportClose | DisconnectReason::TransportError => {
                ReconnectAction::Backoff
            }
        }
    }

    /// Delay before retry number `attempt` (1-based), or None once exhausted
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        (attempt >= 1 && attempt <= self.max_attempts).then_some(self.delay)
    }
}
