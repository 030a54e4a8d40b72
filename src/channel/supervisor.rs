use super::handlers::HandlerRegistry;
use super::protocol::{ChannelEvent, ConnectionState, DisconnectReason, Frame};
use super::reconnect::{ReconnectAction, ReconnectPolicy};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A session that delivered a frame, or stayed up this long, resets the retry budget
const STABLE_SESSION: Duration = Duration::from_secs(10);

pub(super) enum Command {
    Emit {
        frame: Frame,
        ack: Option<oneshot::Sender<Value>>,
    },
    Reconnect,
    Close,
}

enum Dial {
    Connected(Socket),
    Failed(String),
    /// The handle asked to close before the socket opened
    Closed,
}

struct SessionEnd {
    reason: DisconnectReason,
    /// The server delivered at least one frame, or the session outlived `STABLE_SESSION`
    healthy: bool,
}

/// Owns the socket and the reconnect loop
pub(super) struct Supervisor {
    pub url: String,
    pub client_id: Uuid,
    pub policy: ReconnectPolicy,
    pub connect_timeout: Duration,
    pub location_events: Vec<String>,
    pub handlers: Arc<HandlerRegistry>,
    pub events_tx: broadcast::Sender<ChannelEvent>,
    pub state_tx: watch::Sender<ConnectionState>,
}

impl Supervisor {
    pub async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        // Failed attempts since the last healthy session
        let mut attempt: u32 = 0;
        // One free immediate retry after a server disconnect, restored by a healthy session
        let mut immediate_available = true;

        loop {
            self.state_tx.send_replace(ConnectionState::Connecting);

            match self.dial(&mut commands).await {
                Dial::Connected(socket) => {
                    info!(client_id = %self.client_id, attempt, "Channel connected");
                    self.state_tx.send_replace(ConnectionState::Connected);
                    self.handlers.dispatch("connect", &Value::Null);
                    self.publish(ChannelEvent::Connected);

                    let end = self.session(socket, &mut commands).await;
                    let reason = end.reason;

                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    info!(
                        client_id = %self.client_id,
                        reason = %reason,
                        healthy = end.healthy,
                        "Channel disconnected"
                    );
                    self.handlers
                        .dispatch("disconnect", &Value::String(reason.to_string()));
                    let action = self.policy.after_disconnect(&reason);
                    self.publish(ChannelEvent::Disconnected { reason });

                    if end.healthy {
                        attempt = 0;
                        immediate_available = true;
                    }

                    match action {
                        ReconnectAction::Stop => return,
                        ReconnectAction::Immediate if immediate_available => {
                            immediate_available = false;
                            debug!(client_id = %self.client_id, "Server closed the session, reconnecting now");
                            continue;
                        }
                        ReconnectAction::Immediate | ReconnectAction::Backoff => {}
                    }
                }
                Dial::Failed(message) => {
                    warn!(client_id = %self.client_id, attempt, error = %message, "Channel connect failed");
                    self.handlers
                        .dispatch("connect_error", &Value::String(message.clone()));
                    self.publish(ChannelEvent::Error { message });
                }
                Dial::Closed => {
                    debug!(client_id = %self.client_id, "Channel closed while connecting");
                    self.state_tx.send_replace(ConnectionState::Disconnected);
                    return;
                }
            }

            attempt += 1;
            self.state_tx.send_replace(ConnectionState::Disconnected);
            let resumed = match self.policy.delay_for(attempt) {
                Some(delay) => self.wait(delay, &mut commands).await,
                None => {
                    warn!(
                        client_id = %self.client_id,
                        attempts = self.policy.max_attempts,
                        "Reconnect attempts exhausted"
                    );
                    self.state_tx.send_replace(ConnectionState::Exhausted);
                    let resumed = self.wait_for_reconnect(&mut commands).await;
                    attempt = 0;
                    immediate_available = true;
                    resumed
                }
            };
            if !resumed {
                self.state_tx.send_replace(ConnectionState::Disconnected);
                return;
            }
        }
    }

    /// Open the socket, bounded by the connect timeout and abandoned on close
    async fn dial(&self, commands: &mut mpsc::UnboundedReceiver<Command>) -> Dial {
        let connect = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()));
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => {
                    return match result {
                        Ok(Ok((socket, _response))) => Dial::Connected(socket),
                        Ok(Err(e)) => Dial::Failed(e.to_string()),
                        Err(_) => Dial::Failed(format!(
                            "Connect timed out after {}ms",
                            self.connect_timeout.as_millis()
                        )),
                    };
                }
                command = commands.recv() => match command {
                    Some(Command::Close) | None => return Dial::Closed,
                    Some(Command::Reconnect) => {
                        debug!(client_id = %self.client_id, "Connect already in progress");
                    }
                    Some(Command::Emit { frame, .. }) => {
                        debug!(event = %frame.event, "Dropping emit while connecting");
                    }
                },
            }
        }
    }

    /// Pump one live connection until it ends
    async fn session(
        &self,
        socket: Socket,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> SessionEnd {
        let started = Instant::now();
        let mut received = false;
        let reason = self.pump(socket, commands, &mut received).await;
        SessionEnd {
            reason,
            healthy: received || started.elapsed() >= STABLE_SESSION,
        }
    }

    async fn pump(
        &self,
        socket: Socket,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        received: &mut bool,
    ) -> DisconnectReason {
        let (mut sink, mut stream) = socket.split();
        let mut pending_acks: HashMap<u64, oneshot::Sender<Value>> = HashMap::new();
        let mut next_ack: u64 = 0;

        loop {
            tokio::select! {
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reason) = self.handle_text(&text, &mut pending_acks) {
                            let _ = sink.close().await;
                            return reason;
                        }
                        *received = true;
                    }
                    Some(Ok(Message::Close(_))) => return DisconnectReason::ServerDisconnect,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(client_id = %self.client_id, error = %e, "Channel read failed");
                        return DisconnectReason::TransportError;
                    }
                    None => return DisconnectReason::TransportClose,
                },
                command = commands.recv() => match command {
                    Some(Command::Emit { mut frame, ack }) => {
                        if let Some(ack) = ack {
                            next_ack += 1;
                            frame.ack_id = Some(next_ack);
                            pending_acks.insert(next_ack, ack);
                        }
                        let text = match frame.encode() {
                            Ok(text) => text,
                            Err(e) => {
                                warn!(event = %frame.event, error = %e, "Failed to encode frame");
                                continue;
                            }
                        };
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            warn!(client_id = %self.client_id, error = %e, "Channel send failed");
                            return DisconnectReason::TransportError;
                        }
                    }
                    Some(Command::Reconnect) => {
                        debug!(client_id = %self.client_id, "Already connected, ignoring reconnect");
                    }
                    Some(Command::Close) | None => {
                        let _ = sink.close().await;
                        return DisconnectReason::ClientDisconnect;
                    }
                },
            }
        }
    }

    /// Returns a reason when the frame ends the session
    fn handle_text(
        &self,
        text: &str,
        pending_acks: &mut HashMap<u64, oneshot::Sender<Value>>,
    ) -> Option<DisconnectReason> {
        let frame = match Frame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable frame");
                return None;
            }
        };

        match frame.event.as_str() {
            Frame::ACK => {
                match frame.ack_id.and_then(|id| pending_acks.remove(&id)) {
                    Some(waiter) => {
                        let _ = waiter.send(frame.data);
                    }
                    None => debug!(ack_id = ?frame.ack_id, "Acknowledgement for unknown request"),
                }
                None
            }
            Frame::DISCONNECT => Some(DisconnectReason::ServerDisconnect),
            _ => {
                self.handlers.dispatch(&frame.event, &frame.data);
                let event_name = frame.event.clone();
                match ChannelEvent::from_frame(frame, &self.location_events) {
                    Ok(event) => self.publish(event),
                    Err(e) => warn!(event = %event_name, error = %e, "Dropping malformed payload"),
                }
                None
            }
        }
    }

    /// Sleep out the retry delay. Returns false if the channel was closed.
    async fn wait(&self, delay: Duration, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        let deadline = tokio::time::sleep(delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return true,
                command = commands.recv() => match command {
                    Some(Command::Reconnect) => return true,
                    Some(Command::Emit { frame, .. }) => {
                        debug!(event = %frame.event, "Dropping emit while disconnected");
                    }
                    Some(Command::Close) | None => return false,
                },
            }
        }
    }

    async fn wait_for_reconnect(&self, commands: &mut mpsc::UnboundedReceiver<Command>) -> bool {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Reconnect => {
                    info!(client_id = %self.client_id, "Manual reconnect requested");
                    return true;
                }
                Command::Emit { frame, .. } => {
                    debug!(event = %frame.event, "Dropping emit while disconnected");
                }
                Command::Close => return false,
            }
        }
        false
    }

    fn publish(&self, event: ChannelEvent) {
        // No subscribers is fine
        let _ = self.events_tx.send(event);
    }
}
