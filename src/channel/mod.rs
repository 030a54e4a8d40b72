// Transport channel: one persistent bidirectional connection to the push server

mod handlers;
mod protocol;
mod reconnect;
mod supervisor;

pub use handlers::{Handler, HandlerId, HandlerRegistry};
pub use protocol::{ChannelEvent, ConnectionState, DisconnectReason, Frame};
pub use reconnect::{ReconnectAction, ReconnectPolicy};

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use supervisor::{Command, Supervisor};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Upper bound on one connect attempt, handshake included
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Event names that carry location updates
    #[serde(default = "default_location_events")]
    pub location_events: Vec<String>,
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_delay_ms() -> u64 {
    1000
}

fn default_ack_timeout_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_location_events() -> Vec<String> {
    vec!["locationUpdate".to_string(), "admin:updateLocation".to_string()]
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            ack_timeout_ms: default_ack_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            location_events: default_location_events(),
        }
    }
}

impl ChannelConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.max_reconnect_attempts,
            Duration::from_millis(self.reconnect_delay_ms),
        )
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Outbound failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// No live connection to send on
    NotConnected,
    /// The channel was shut down
    Closed,
    /// No acknowledgement within the configured timeout
    AckTimeout,
    /// Connection dropped before the acknowledgement arrived
    AckDropped,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::NotConnected => write!(f, "Channel is not connected"),
            ChannelError::Closed => write!(f, "Channel is closed"),
            ChannelError::AckTimeout => write!(f, "Timed out waiting for acknowledgement"),
            ChannelError::AckDropped => write!(f, "Connection lost before acknowledgement"),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Client side of the push connection.
///
/// A background supervisor owns the socket; this handle talks to it
/// through a command queue and observes it through a broadcast of
/// `ChannelEvent`s plus a watch of the `ConnectionState`.
pub struct TransportChannel {
    url: String,
    client_id: Uuid,
    config: ChannelConfig,
    handlers: Arc<HandlerRegistry>,
    events_tx: broadcast::Sender<ChannelEvent>,
    state_tx: watch::Sender<ConnectionState>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl TransportChannel {
    pub fn new(socket_url: &str, auth_token: Option<&str>, config: ChannelConfig) -> Self {
        let url = match auth_token {
            Some(token) => {
                let separator = if socket_url.contains('?') { '&' } else { '?' };
                format!("{}{}token={}", socket_url, separator, urlencoding::encode(token))
            }
            None => socket_url.to_string(),
        };
        let (events_tx, _) = broadcast::channel(1000);
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            url,
            client_id: Uuid::now_v7(),
            config,
            handlers: Arc::new(HandlerRegistry::new()),
            events_tx,
            state_tx,
            commands: None,
            task: None,
        }
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Start the connection supervisor. No-op while one is running.
    pub fn connect(&mut self) {
        if self.is_running() {
            debug!(client_id = %self.client_id, "Channel already running");
            return;
        }

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let supervisor = Supervisor {
            url: self.url.clone(),
            client_id: self.client_id,
            policy: self.config.policy(),
            connect_timeout: self.config.connect_timeout(),
            location_events: self.config.location_events.clone(),
            handlers: Arc::clone(&self.handlers),
            events_tx: self.events_tx.clone(),
            state_tx: self.state_tx.clone(),
        };

        info!(client_id = %self.client_id, "Starting transport channel");
        self.commands = Some(command_tx);
        self.task = Some(tokio::spawn(supervisor.run(command_rx)));
    }

    /// Close the connection and stop reconnecting
    pub async fn disconnect(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Close);
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(client_id = %self.client_id, error = %e, "Channel supervisor ended abnormally");
            }
        }
        self.state_tx.send_replace(ConnectionState::Disconnected);
    }

    /// Retry after the bounded attempts ran out, or start fresh if stopped
    pub fn reconnect(&mut self) {
        match &self.commands {
            Some(commands) if self.is_running() => {
                let _ = commands.send(Command::Reconnect);
            }
            _ => self.connect(),
        }
    }

    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    pub fn on(&self, event: &str, handler: Handler) -> HandlerId {
        self.handlers.on(event, handler)
    }

    pub fn off(&self, id: HandlerId) -> bool {
        self.handlers.off(id)
    }

    pub fn off_all(&self) {
        self.handlers.off_all();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events_tx.subscribe()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.state_tx.borrow() == ConnectionState::Connected
    }

    /// Fire-and-forget send. Fails when there is no live connection.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), ChannelError> {
        self.send(Frame::new(event, data), None)
    }

    /// Send and wait for the server's acknowledgement payload.
    ///
    /// The frame is queued immediately; the returned future only waits.
    pub fn emit_with_ack(
        &self,
        event: &str,
        data: Value,
    ) -> impl Future<Output = Result<Value, ChannelError>> + Send + 'static {
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = self.send(Frame::new(event, data), Some(ack_tx));
        let timeout = self.config.ack_timeout();

        async move {
            sent?;
            match tokio::time::timeout(timeout, ack_rx).await {
                Ok(Ok(payload)) => Ok(payload),
                Ok(Err(_)) => Err(ChannelError::AckDropped),
                Err(_) => Err(ChannelError::AckTimeout),
            }
        }
    }

    fn send(&self, frame: Frame, ack: Option<oneshot::Sender<Value>>) -> Result<(), ChannelError> {
        let commands = self.commands.as_ref().ok_or(ChannelError::Closed)?;
        if !self.is_connected() {
            return Err(ChannelError::NotConnected);
        }
        commands
            .send(Command::Emit { frame, ack })
            .map_err(|_| ChannelError::Closed)
    }
}
