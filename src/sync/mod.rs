// Composition root: wires channel, snapshot, reconciler, markers, motion and routes

mod session;

pub use session::Session;

use crate::channel::{ChannelError, ChannelEvent, Handler, HandlerId, TransportChannel};
use crate::config::SyncConfig;
use crate::event::{validate_location_update, JoinAck, JoinRoom};
use crate::markers::{MarkerManager, MarkerPlan};
use crate::motion::{Animator, Clock, SystemClock};
use crate::route::{RouteRenderer, RouteResult};
use crate::snapshot::SnapshotLoader;
use crate::state::{Entity, Position, Reconciler, ReplaceSummary};
use crate::surface::{DeferredSurface, MapSurface};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod tests;

/// Requests from the host (UI, binary) into the run loop
#[derive(Debug)]
pub enum SyncInput {
    /// The map finished loading; flush queued surface ops
    SurfaceReady,
    /// A marker was clicked; reply with the entity behind it
    MarkerClicked {
        entity_id: String,
        reply: oneshot::Sender<Option<Entity>>,
    },
    ShowRoute {
        origin: Position,
        destination: Position,
    },
    ClearRoute,
    RefreshSnapshot,
    /// Revive a channel that used up its retries
    Reconnect,
    Shutdown,
}

/// Results of detached work, fed back into the run loop
enum Completion {
    Snapshot(Result<ReplaceSummary>),
    Route(RouteResult),
    JoinAck(Result<Value, ChannelError>),
}

/// Owns every component for one mounted map view
pub struct Synchronizer {
    config: SyncConfig,
    reconciler: Arc<Reconciler>,
    channel: TransportChannel,
    snapshot: Arc<SnapshotLoader>,
    markers: MarkerManager,
    animator: Animator,
    routes: RouteRenderer,
    surface: DeferredSurface,
    session: Session,
    clock: Arc<dyn Clock>,
    handler_ids: Vec<HandlerId>,
    snapshot_in_flight: bool,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: Option<mpsc::UnboundedReceiver<Completion>>,
}

impl Synchronizer {
    /// Build from configuration; `surface` stays gated until `SurfaceReady`
    pub fn new(config: SyncConfig, surface: Box<dyn MapSurface>) -> Result<Self> {
        let routes = RouteRenderer::from_config(config.route.clone())?;
        Self::with_parts(
            config,
            DeferredSurface::new(surface),
            routes,
            Arc::new(SystemClock),
        )
    }

    pub fn with_parts(
        config: SyncConfig,
        surface: DeferredSurface,
        routes: RouteRenderer,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let snapshot = SnapshotLoader::new(
            &config.server.base_url,
            config.server.auth_token.clone(),
            config.snapshot.clone(),
        )?;
        let channel = TransportChannel::new(
            &config.server.socket_url,
            config.server.auth_token.as_deref(),
            config.channel.clone(),
        );
        let session = Session::new(JoinRoom {
            user_id: config.server.user_id.clone(),
            user_type: config.server.user_type.clone(),
        });
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        Ok(Self {
            reconciler: Arc::new(Reconciler::new()),
            channel,
            snapshot: Arc::new(snapshot),
            markers: MarkerManager::new(),
            animator: Animator::new(config.motion.duration()),
            routes,
            surface,
            session,
            clock,
            handler_ids: Vec::new(),
            snapshot_in_flight: false,
            completions_tx,
            completions_rx: Some(completions_rx),
            config,
        })
    }

    pub fn reconciler(&self) -> Arc<Reconciler> {
        Arc::clone(&self.reconciler)
    }

    pub fn channel(&self) -> &TransportChannel {
        &self.channel
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn markers(&self) -> &MarkerManager {
        &self.markers
    }

    /// Register a named-event handler; deregistered on teardown
    pub fn on(&mut self, event: &str, handler: Handler) -> HandlerId {
        let id = self.channel.on(event, handler);
        self.handler_ids.push(id);
        id
    }

    /// Entity detail for a clicked marker
    pub fn marker_clicked(&self, entity_id: &str) -> Option<Entity> {
        self.markers.get(entity_id)?;
        let entity = self.reconciler.get_entity(entity_id);
        if let Some(entity) = &entity {
            info!(
                entity_id = %entity.id,
                kind = %entity.kind,
                status = %entity.status.as_str(),
                "Marker selected"
            );
        }
        entity
    }

    /// Drive everything until `Shutdown` (or the input side hangs up)
    pub async fn run(mut self, mut inputs: mpsc::Receiver<SyncInput>) -> Result<()> {
        let Some(mut completions) = self.completions_rx.take() else {
            return Err(anyhow::anyhow!("Synchronizer already ran"));
        };
        let mut events = self.channel.subscribe();
        let mut changes = self.reconciler.subscribe();

        info!(
            socket_url = %self.config.server.socket_url,
            base_url = %self.config.server.base_url,
            user_id = %self.session.identity().user_id,
            "Synchronizer starting"
        );

        self.channel.connect();
        self.spawn_snapshot();

        let mut frames = interval(self.config.motion.frame_interval());
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut refresh = optional_interval(self.config.snapshot.refresh_interval_secs);
        let mut report = optional_interval(self.config.metrics.report_interval_secs);
        let mut dirty = true;

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.dispatch(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Channel event receiver lagged");
                    }
                    Err(RecvError::Closed) => break,
                },
                change = changes.recv() => match change {
                    Ok(_) => dirty = true,
                    Err(RecvError::Lagged(_)) => dirty = true,
                    Err(RecvError::Closed) => break,
                },
                _ = frames.tick() => {
                    let now = self.clock.now();
                    if std::mem::take(&mut dirty) {
                        self.reconcile_markers(now);
                    }
                    self.animate(now);
                }
                Some(completion) = completions.recv() => self.complete(completion),
                _ = tick(&mut refresh) => self.spawn_snapshot(),
                _ = tick(&mut report) => self.report_metrics(),
                input = inputs.recv() => match input {
                    Some(SyncInput::Shutdown) | None => break,
                    Some(input) => self.handle_input(input),
                },
            }
        }

        self.teardown().await;
        Ok(())
    }

    /// Route one inbound channel message
    pub(crate) fn dispatch(&mut self, event: ChannelEvent) {
        if let Some(join) = self.session.observe(&event) {
            self.announce(join);
        }

        match event {
            ChannelEvent::LocationUpdate(update) => match validate_location_update(&update) {
                Ok(patch) => {
                    self.reconciler.upsert(patch);
                }
                Err(e) => {
                    warn!(agent_id = ?update.agent_id, error = %e, "Dropping invalid location update");
                    self.reconciler.metrics.record_dropped();
                }
            },
            ChannelEvent::Connected => {
                if self.session.is_reconnect() {
                    self.reconciler.metrics.record_reconnect();
                }
                info!(connects = self.session.connects(), "Connected to event channel");
            }
            ChannelEvent::Disconnected { reason } => {
                warn!(reason = %reason, "Event channel disconnected");
            }
            ChannelEvent::Error { message } => {
                debug!(error = %message, "Event channel error");
            }
            ChannelEvent::RoomJoinAck(ack) => {
                if ack.success {
                    info!(user_id = %self.session.identity().user_id, "Joined room");
                } else {
                    warn!(message = ?ack.message, "Room join rejected");
                }
            }
            ChannelEvent::Message { event, .. } => {
                debug!(event = %event, "Unhandled channel event");
            }
        }
    }

    fn announce(&self, join: JoinRoom) {
        let data = match serde_json::to_value(&join) {
            Ok(data) => data,
            Err(e) => {
                error!(error = %e, "Failed to encode joinRoom");
                return;
            }
        };
        let ack = self.channel.emit_with_ack(JoinRoom::EVENT, data);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let _ = completions.send(Completion::JoinAck(ack.await));
        });
    }

    fn complete(&mut self, completion: Completion) {
        match completion {
            Completion::Snapshot(result) => {
                self.snapshot_in_flight = false;
                match result {
                    Ok(summary) => info!(
                        upserted = summary.upserted,
                        removed = summary.removed.len(),
                        dropped = summary.dropped,
                        "Snapshot reconciled"
                    ),
                    Err(e) => warn!(error = %e, "Snapshot refresh failed"),
                }
            }
            Completion::Route(outcome) => {
                self.routes.complete(outcome, &mut self.surface);
            }
            Completion::JoinAck(Ok(payload)) => match serde_json::from_value::<JoinAck>(payload) {
                Ok(ack) => self.dispatch(ChannelEvent::RoomJoinAck(ack)),
                Err(e) => warn!(error = %e, "Malformed joinRoom acknowledgement"),
            },
            Completion::JoinAck(Err(e)) => {
                warn!(error = %e, "joinRoom not acknowledged");
            }
        }
    }

    pub(crate) fn handle_input(&mut self, input: SyncInput) {
        match input {
            SyncInput::SurfaceReady => {
                info!(queued = self.surface.pending_len(), "Map surface ready");
                self.surface.mark_ready();
            }
            SyncInput::MarkerClicked { entity_id, reply } => {
                let _ = reply.send(self.marker_clicked(&entity_id));
            }
            SyncInput::ShowRoute {
                origin,
                destination,
            } => {
                let request = self.routes.begin(origin, destination);
                let fetch = self.routes.fetch(request);
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let _ = completions.send(Completion::Route(fetch.await));
                });
            }
            SyncInput::ClearRoute => self.routes.clear(&mut self.surface),
            SyncInput::RefreshSnapshot => self.spawn_snapshot(),
            SyncInput::Reconnect => self.channel.reconnect(),
            SyncInput::Shutdown => {}
        }
    }

    fn spawn_snapshot(&mut self) {
        if self.snapshot_in_flight {
            debug!("Snapshot already in flight, skipping");
            return;
        }
        self.snapshot_in_flight = true;

        let loader = Arc::clone(&self.snapshot);
        let reconciler = Arc::clone(&self.reconciler);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = loader.load_into(&reconciler).await;
            let _ = completions.send(Completion::Snapshot(result));
        });
    }

    pub(crate) fn reconcile_markers(&mut self, now: Instant) -> MarkerPlan {
        let entities = self.reconciler.get_all_entities();
        self.markers
            .reconcile(&entities, &mut self.animator, &mut self.surface, now)
    }

    pub(crate) fn animate(&mut self, now: Instant) {
        let frames = self.animator.tick(now);
        if !frames.is_empty() {
            self.markers.render(&frames, &mut self.surface);
        }
    }

    fn report_metrics(&self) {
        let metrics = self.reconciler.metrics.get_snapshot();
        info!(
            entities = self.reconciler.len(),
            markers = self.markers.len(),
            total_updates = metrics.total_updates,
            update_rate = metrics.update_rate,
            dropped_records = metrics.dropped_records,
            snapshots = metrics.snapshots,
            reconnects = metrics.reconnects,
            "Sync metrics"
        );
    }

    /// Unmount: drop handlers, stop animations, close the channel
    async fn teardown(&mut self) {
        for id in self.handler_ids.drain(..) {
            self.channel.off(id);
        }
        self.animator.halt();
        self.channel.disconnect().await;
        info!("Synchronizer stopped");
    }
}

fn optional_interval(secs: u64) -> Option<Interval> {
    if secs == 0 {
        return None;
    }
    let period = Duration::from_secs(secs);
    // First tick one period out, not immediately
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    Some(ticker)
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
