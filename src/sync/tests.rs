use super::*;
use crate::channel::DisconnectReason;
use crate::event::LocationUpdate;
use crate::motion::ManualClock;
use crate::route::RouteConfig;
use crate::state::AgentStatus;
use crate::surface::testing::RecordingSurface;
use crate::surface::SurfaceOp;

struct Harness {
    sync: Synchronizer,
    recorder: RecordingSurface,
    clock: Arc<ManualClock>,
}

fn harness(ready: bool) -> Harness {
    let mut config = SyncConfig::default();
    config.server.base_url = "http://127.0.0.1:1/api".to_string();
    config.server.socket_url = "ws://127.0.0.1:1/ws".to_string();

    let recorder = RecordingSurface::default();
    let surface = if ready {
        DeferredSurface::ready(Box::new(recorder.clone()))
    } else {
        DeferredSurface::new(Box::new(recorder.clone()))
    };
    let routes = RouteRenderer::new(
        RouteConfig {
            enabled: false,
            ..RouteConfig::default()
        },
        None,
    );
    let clock = Arc::new(ManualClock::new(Instant::now()));
    let sync = Synchronizer::with_parts(config, surface, routes, clock.clone()).unwrap();

    Harness {
        sync,
        recorder,
        clock,
    }
}

fn location(agent_id: &str, lat: f64, lng: f64) -> ChannelEvent {
    ChannelEvent::LocationUpdate(LocationUpdate {
        agent_id: Some(agent_id.to_string()),
        lat: Some(lat),
        lng: Some(lng),
        ..LocationUpdate::default()
    })
}

impl Harness {
    fn frame(&mut self) {
        let now = self.clock.now();
        self.sync.reconcile_markers(now);
        self.sync.animate(now);
    }

    async fn next_completion(&mut self) -> Completion {
        let completions = self.sync.completions_rx.as_mut().unwrap();
        tokio::time::timeout(Duration::from_secs(5), completions.recv())
            .await
            .unwrap()
            .unwrap()
    }
}

#[tokio::test]
async fn test_location_update_creates_marker() {
    let mut h = harness(true);
    h.sync.dispatch(location("a1", 12.9, 77.6));
    h.frame();

    let entity = h.sync.reconciler().get_entity("a1").unwrap();
    assert_eq!(entity.status, AgentStatus::Available);
    assert!(matches!(
        h.recorder.take().as_slice(),
        [SurfaceOp::AddMarker { id, .. }] if id == "a1"
    ));
}

#[tokio::test]
async fn test_invalid_update_is_dropped() {
    let mut h = harness(true);
    h.sync.dispatch(ChannelEvent::LocationUpdate(LocationUpdate {
        lat: Some(1.0),
        lng: Some(1.0),
        ..LocationUpdate::default()
    }));
    h.frame();

    assert!(h.sync.reconciler().is_empty());
    assert_eq!(h.sync.reconciler().metrics.get_dropped_records(), 1);
    assert!(h.recorder.take().is_empty());
}

#[tokio::test]
async fn test_zero_position_kept_without_marker() {
    let mut h = harness(true);
    h.sync.dispatch(location("a1", 0.0, 0.0));
    h.frame();

    assert!(h.sync.reconciler().get_entity("a1").is_some());
    assert!(h.sync.markers().is_empty());
    assert!(h.recorder.take().is_empty());
}

#[tokio::test]
async fn test_moves_are_animated() {
    let mut h = harness(true);
    h.sync.dispatch(location("a1", 0.0, 10.0));
    h.frame();
    h.recorder.take();

    h.sync.dispatch(location("a1", 10.0, 20.0));
    h.frame();
    h.clock.advance(Duration::from_millis(500));
    h.sync.animate(h.clock.now());

    let ops = h.recorder.take();
    let midway = ops
        .iter()
        .rev()
        .find_map(|op| match op {
            SurfaceOp::MoveMarker { position, .. } => Some(*position),
            _ => None,
        })
        .expect("no move emitted");
    assert!((midway.lat - 5.0).abs() < 1e-6);
    assert!((midway.lng - 15.0).abs() < 1e-6);

    h.clock.advance(Duration::from_millis(600));
    h.sync.animate(h.clock.now());
    assert!(matches!(
        h.recorder.take().as_slice(),
        [SurfaceOp::MoveMarker { position, .. }] if *position == Position::new(10.0, 20.0)
    ));
}

#[tokio::test]
async fn test_ops_wait_for_surface_ready() {
    let mut h = harness(false);
    h.sync.dispatch(location("a1", 1.0, 1.0));
    h.frame();
    assert!(h.recorder.snapshot().is_empty());

    h.sync.handle_input(SyncInput::SurfaceReady);
    assert_eq!(h.recorder.take().len(), 1);
}

#[tokio::test]
async fn test_marker_click_returns_entity() {
    let mut h = harness(true);
    h.sync.dispatch(location("a1", 1.0, 1.0));
    h.sync.dispatch(location("a2", 0.0, 0.0));
    h.frame();

    assert_eq!(h.sync.marker_clicked("a1").map(|e| e.id), Some("a1".to_string()));
    // Known entity without a marker is not clickable
    assert!(h.sync.marker_clicked("a2").is_none());
    assert!(h.sync.marker_clicked("missing").is_none());

    let (reply, answer) = oneshot::channel();
    h.sync.handle_input(SyncInput::MarkerClicked {
        entity_id: "a1".to_string(),
        reply,
    });
    assert!(answer.await.unwrap().is_some());
}

#[tokio::test]
async fn test_show_route_draws_fallback_when_service_disabled() {
    let mut h = harness(true);
    h.sync.handle_input(SyncInput::ShowRoute {
        origin: Position::new(12.97, 77.59),
        destination: Position::new(12.93, 77.62),
    });
    let completion = h.next_completion().await;
    h.sync.complete(completion);

    assert!(matches!(
        h.recorder.take().as_slice(),
        [SurfaceOp::DrawRoute { path }] if path.is_approximate()
    ));

    h.sync.handle_input(SyncInput::ClearRoute);
    assert_eq!(h.recorder.take(), vec![SurfaceOp::ClearRoute]);
}

#[tokio::test]
async fn test_connect_announces_join_and_counts_reconnects() {
    let mut h = harness(true);
    h.sync.dispatch(ChannelEvent::Connected);

    // No live socket behind the channel, so the join fails fast
    match h.next_completion().await {
        Completion::JoinAck(Err(e)) => assert_eq!(e, ChannelError::Closed),
        _ => panic!("Expected a failed joinRoom"),
    }

    h.sync.dispatch(ChannelEvent::Disconnected {
        reason: DisconnectReason::ServerDisconnect,
    });
    h.sync.dispatch(ChannelEvent::Connected);
    assert_eq!(h.sync.session().connects(), 2);
    assert_eq!(h.sync.reconciler().metrics.get_snapshot().reconnects, 1);
}

#[tokio::test]
async fn test_join_ack_payload_marks_session_joined() {
    let mut h = harness(true);
    h.sync
        .complete(Completion::JoinAck(Ok(serde_json::json!({"success": true}))));
    assert!(h.sync.session().is_joined());
}

#[tokio::test]
async fn test_teardown_releases_handlers_and_animations() {
    let mut h = harness(true);
    let id = h.sync.on("orderStatusUpdate", Arc::new(|_: &Value| {}));
    h.sync.dispatch(location("a1", 0.0, 10.0));
    h.frame();
    h.sync.dispatch(location("a1", 10.0, 20.0));
    h.frame();
    h.recorder.take();

    h.sync.teardown().await;

    assert!(!h.sync.channel().off(id));
    h.clock.advance(Duration::from_millis(500));
    h.sync.animate(h.clock.now());
    assert!(h.recorder.take().is_empty());
}
