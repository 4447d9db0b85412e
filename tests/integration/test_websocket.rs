//! Integration tests for the WebSocket event stream.
//!
//! These tests run the real router on a local port and check what a browser
//! client would see: the connected snapshot, batch progress triggered over
//! HTTP, and behaviour across connects and disconnects.

mod common;

use std::time::Duration;

use common::{orchestrator, spawn_test_server, ScriptedService};
use futures::SinkExt;
use futures::StreamExt;
use quantprep_core::{BatchMode, SessionEvent};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tungstenite::Message;

/// Helper type for WebSocket client
type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn ws_url(base: &str) -> String {
    format!("{}/ws", base.replace("http://", "ws://"))
}

/// Connects a WebSocket client to the given server.
async fn connect_client(base: &str) -> WsClient {
    let (ws_stream, _) = connect_async(ws_url(base))
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream
}

/// Receives the next text message and parses it as a `SessionEvent`.
/// Answers pings on the way.
async fn receive_event(client: &mut WsClient) -> SessionEvent {
    loop {
        let msg = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("Timeout waiting for message")
            .expect("Stream ended")
            .expect("WebSocket error");

        match msg {
            Message::Text(text) => {
                return serde_json::from_str(&text).expect("Failed to parse event");
            }
            Message::Ping(data) => {
                client
                    .send(Message::Pong(data))
                    .await
                    .expect("Failed to send pong");
            }
            Message::Pong(_) => {}
            other => panic!("Expected text message, got: {other:?}"),
        }
    }
}

/// Receives events until one matches `pred`, returning everything seen.
async fn receive_until(
    client: &mut WsClient,
    pred: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = receive_event(client).await;
        let done = pred(&event);
        seen.push(event);
        if done {
            return seen;
        }
    }
}

// ============================================================================
// Connection Tests
// ============================================================================

/// A new client first receives the current session snapshot.
#[tokio::test]
async fn test_client_receives_connected_snapshot() {
    let (base, _handle) = spawn_test_server(orchestrator(ScriptedService::new(), 6)).await;

    let mut client = connect_client(&base).await;
    let event = receive_event(&mut client).await;

    let SessionEvent::Connected(payload) = event else {
        panic!("Expected Connected event, got: {event:?}");
    };
    assert!(payload.snapshot.active.slots.is_empty());
    assert!(!payload.snapshot.active_loading);
}

/// A client connecting mid-session sees the questions already shown.
#[tokio::test]
async fn test_connected_snapshot_reflects_current_set() {
    let session = orchestrator(ScriptedService::new(), 3);
    session.generate().await.expect("generate failed");
    let (base, _handle) = spawn_test_server(session).await;

    let mut client = connect_client(&base).await;
    let SessionEvent::Connected(payload) = receive_event(&mut client).await else {
        panic!("Expected Connected event");
    };

    assert_eq!(payload.snapshot.active.slots.len(), 3);
    assert!(payload.snapshot.active.has_any_title());
}

/// Several clients can connect at once.
#[tokio::test]
async fn test_multiple_clients_can_connect() {
    let (base, _handle) = spawn_test_server(orchestrator(ScriptedService::new(), 6)).await;

    let mut client1 = connect_client(&base).await;
    let mut client2 = connect_client(&base).await;
    let mut client3 = connect_client(&base).await;

    assert!(matches!(receive_event(&mut client1).await, SessionEvent::Connected(_)));
    assert!(matches!(receive_event(&mut client2).await, SessionEvent::Connected(_)));
    assert!(matches!(receive_event(&mut client3).await, SessionEvent::Connected(_)));
}

// ============================================================================
// Event Streaming Tests
// ============================================================================

/// Generating over HTTP streams batch progress to every client, ending with
/// the prefetched set becoming ready.
#[tokio::test]
async fn test_generate_streams_progress_to_all_clients() {
    let (base, _handle) = spawn_test_server(orchestrator(ScriptedService::new(), 2)).await;

    let mut client1 = connect_client(&base).await;
    let mut client2 = connect_client(&base).await;
    receive_event(&mut client1).await;
    receive_event(&mut client2).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/generate"))
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    for client in [&mut client1, &mut client2] {
        let seen = receive_until(client, |e| matches!(e, SessionEvent::BufferReady(_))).await;

        assert!(
            matches!(&seen[0], SessionEvent::BatchStarted(p) if p.mode == BatchMode::Foreground),
            "Expected foreground batch_started first, got: {:?}",
            seen[0]
        );
        assert!(seen
            .iter()
            .any(|e| matches!(e, SessionEvent::SlotUpdated(p) if p.data.has_title())));
        assert_eq!(
            seen.iter()
                .filter(|e| matches!(e, SessionEvent::SlotSettled(p) if p.mode == BatchMode::Foreground))
                .count(),
            2
        );
    }
}

/// Settings changes over HTTP reach WebSocket clients.
#[tokio::test]
async fn test_settings_change_event_broadcast() {
    let (base, _handle) = spawn_test_server(orchestrator(ScriptedService::new(), 2)).await;

    let mut client = connect_client(&base).await;
    receive_event(&mut client).await;

    let response = reqwest::Client::new()
        .put(format!("{base}/api/settings"))
        .json(&serde_json::json!({ "topic": "linear_algebra" }))
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert!(response.status().is_success());

    let event = receive_event(&mut client).await;
    let SessionEvent::SettingsChanged(payload) = event else {
        panic!("Expected SettingsChanged event, got: {event:?}");
    };
    assert_eq!(payload.request.effective_topic(), "Linear Algebra");
}

// ============================================================================
// Disconnection Tests
// ============================================================================

/// A client can close cleanly.
#[tokio::test]
async fn test_client_can_disconnect() {
    let (base, _handle) = spawn_test_server(orchestrator(ScriptedService::new(), 6)).await;

    let mut client = connect_client(&base).await;
    receive_event(&mut client).await;

    client
        .close(None)
        .await
        .expect("Failed to close connection");
}

/// The server keeps broadcasting after a client goes away.
#[tokio::test]
async fn test_server_continues_after_client_disconnect() {
    let session = orchestrator(ScriptedService::new(), 6);
    let broadcaster = session.events().clone();
    let (base, _handle) = spawn_test_server(session).await;

    let mut client1 = connect_client(&base).await;
    receive_event(&mut client1).await;
    client1.close(None).await.ok();
    drop(client1);

    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut client2 = connect_client(&base).await;
    assert!(matches!(receive_event(&mut client2).await, SessionEvent::Connected(_)));

    broadcaster.send(SessionEvent::error("upstream unavailable"));
    let event = receive_event(&mut client2).await;
    assert!(
        matches!(&event, SessionEvent::Error(p) if p.message == "upstream unavailable"),
        "Expected Error event, got: {event:?}"
    );
}
