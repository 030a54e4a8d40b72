// Integration tests for channel reconnect and room re-join
//
// A tokio-tungstenite server stands in for the push backend. It acknowledges
// joinRoom, terminates the session with a disconnect frame and checks that the
// synchronizer comes straight back and announces the same identity.

use fleetsync::channel::Frame;
use fleetsync::config::SyncConfig;
use fleetsync::surface::{MapSurface, SurfaceOp};
use fleetsync::sync::{SyncInput, Synchronizer};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

const WAIT: Duration = Duration::from_secs(5);

/// Surface that remembers which markers were added
#[derive(Clone, Default)]
struct AddedMarkers(Arc<Mutex<Vec<String>>>);

impl MapSurface for AddedMarkers {
    fn apply(&mut self, op: &SurfaceOp) {
        if let SurfaceOp::AddMarker { id, .. } = op {
            self.0.lock().unwrap().push(id.clone());
        }
    }
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("synchronizer never connected")
        .unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_frame(socket: &mut WebSocketStream<TcpStream>) -> Frame {
    loop {
        let message = tokio::time::timeout(WAIT, socket.next())
            .await
            .expect("no frame from synchronizer")
            .unwrap()
            .unwrap();
        if let Message::Text(text) = message {
            return Frame::decode(&text).unwrap();
        }
    }
}

async fn send(socket: &mut WebSocketStream<TcpStream>, frame: Value) {
    socket.send(Message::Text(frame.to_string())).await.unwrap();
}

/// Read the join announcement and acknowledge it
async fn expect_join(socket: &mut WebSocketStream<TcpStream>) -> Value {
    let frame = next_frame(socket).await;
    assert_eq!(frame.event, "joinRoom");
    let ack_id = frame.ack_id.expect("joinRoom should request an ack");
    send(
        socket,
        json!({"event": "ack", "ackId": ack_id, "data": {"success": true}}),
    )
    .await;
    frame.data
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition never held");
}

#[tokio::test]
async fn test_server_disconnect_reconnects_and_rejoins() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = SyncConfig::default();
    config.server.socket_url = format!("ws://{}/ws", addr);
    // Nothing listens here; the snapshot fails and the stream carries the data
    config.server.base_url = "http://127.0.0.1:1/api".to_string();
    config.server.user_id = "ops_7".to_string();
    // Only the immediate reconnect path fits inside the test timeout
    config.channel.reconnect_delay_ms = 60_000;
    config.route.enabled = false;

    let surface = AddedMarkers::default();
    let sync = Synchronizer::new(config, Box::new(surface.clone())).unwrap();
    let reconciler = sync.reconciler();
    let (inputs, input_rx) = mpsc::channel(8);
    inputs.send(SyncInput::SurfaceReady).await.unwrap();
    let running = tokio::spawn(sync.run(input_rx));

    let mut first = accept(&listener).await;
    let first_join = expect_join(&mut first).await;
    assert_eq!(first_join, json!({"userId": "ops_7", "userType": "admin"}));

    send(&mut first, json!({"event": "disconnect"})).await;

    let mut second = accept(&listener).await;
    let second_join = expect_join(&mut second).await;
    assert_eq!(second_join, first_join);

    send(
        &mut second,
        json!({
            "event": "admin:updateLocation",
            "data": {"agentId": "a1", "lat": 12.97, "lng": 77.59, "currentStatus": "PICKED_UP"}
        }),
    )
    .await;

    eventually(|| reconciler.get_entity("a1").is_some()).await;
    eventually(|| surface.0.lock().unwrap().contains(&"a1".to_string())).await;
    assert_eq!(reconciler.metrics.get_snapshot().reconnects, 1);

    inputs.send(SyncInput::Shutdown).await.unwrap();
    tokio::time::timeout(WAIT, running)
        .await
        .expect("synchronizer did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_the_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = SyncConfig::default();
    config.server.socket_url = format!("ws://{}/ws", addr);
    config.server.base_url = "http://127.0.0.1:1/api".to_string();
    config.route.enabled = false;

    let sync = Synchronizer::new(config, Box::new(AddedMarkers::default())).unwrap();
    let (inputs, input_rx) = mpsc::channel(8);
    let running = tokio::spawn(sync.run(input_rx));

    let mut socket = accept(&listener).await;
    expect_join(&mut socket).await;

    inputs.send(SyncInput::Shutdown).await.unwrap();
    tokio::time::timeout(WAIT, running).await.unwrap().unwrap().unwrap();

    // Client closed: the stream ends with a close frame or EOF
    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .unwrap();
    assert!(closed);

    // And it does not come back
    assert!(tokio::time::timeout(Duration::from_millis(300), listener.accept())
        .await
        .is_err());
}
