//! Integration tests for the HTTP API over a real socket.

mod common;

use common::{orchestrator, spawn_test_server, wait_for, ScriptedService};
use quantprep_core::{
    BufferPhase, Difficulty, ErrorResponse, GenerateAction, GenerateResponse, SessionSnapshot,
    SettingsResponse,
};
use reqwest::StatusCode;

async fn post_generate(client: &reqwest::Client, base: &str) -> reqwest::Response {
    client
        .post(format!("{base}/api/generate"))
        .send()
        .await
        .expect("Failed to send HTTP request")
}

#[tokio::test]
async fn test_status_of_fresh_session() {
    let (base, _handle) = spawn_test_server(orchestrator(ScriptedService::new(), 6)).await;

    let snapshot: SessionSnapshot = reqwest::get(format!("{base}/api/status"))
        .await
        .expect("Failed to send HTTP request")
        .json()
        .await
        .expect("Failed to parse snapshot");

    assert!(snapshot.active.slots.is_empty());
    assert!(!snapshot.active_loading);
    assert_eq!(snapshot.buffer_phase, BufferPhase::Empty);
    assert!(snapshot.last_error.is_none());
}

/// The first request starts a batch; once the next set is pre-loaded the
/// following request swaps it in.
#[tokio::test]
async fn test_generate_starts_then_swaps() {
    let session = orchestrator(ScriptedService::new(), 3);
    let (base, _handle) = spawn_test_server(session.clone()).await;
    let client = reqwest::Client::new();

    let response = post_generate(&client, &base).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let first: GenerateResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(first.action, GenerateAction::Started);

    wait_for(&session, SessionSnapshot::is_buffer_ready).await;
    let buffered = session.snapshot().buffer.expect("buffer should be ready");

    let response = post_generate(&client, &base).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let second: GenerateResponse = response.json().await.expect("Failed to parse response");
    assert_eq!(second.action, GenerateAction::Swapped);
    assert_eq!(second.token, buffered.token);
    assert_ne!(second.token, first.token);

    let snapshot: SessionSnapshot = client
        .get(format!("{base}/api/status"))
        .send()
        .await
        .expect("Failed to send HTTP request")
        .json()
        .await
        .expect("Failed to parse snapshot");
    assert_eq!(snapshot.active, buffered);
}

#[tokio::test]
async fn test_generate_rejected_while_set_is_streaming() {
    let service = ScriptedService::held();
    let (base, _handle) = spawn_test_server(orchestrator(service.clone(), 2)).await;
    let client = reqwest::Client::new();

    let first = post_generate(&client, &base).await;
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = post_generate(&client, &base).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error: ErrorResponse = second.json().await.expect("Failed to parse error");
    assert!(error.error.contains("still generating"));

    // Let the foreground and the background batch finish
    service.release(4);
}

#[tokio::test]
async fn test_settings_update_and_validation() {
    let (base, _handle) = spawn_test_server(orchestrator(ScriptedService::new(), 2)).await;
    let client = reqwest::Client::new();

    let response = client
        .put(format!("{base}/api/settings"))
        .json(&serde_json::json!({ "difficulty": "hard", "customTopic": "Optimal stopping" }))
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: SettingsResponse = response.json().await.expect("Failed to parse response");
    assert!(body.changed);
    assert_eq!(body.request.difficulty, Difficulty::Hard);
    assert_eq!(body.request.effective_topic(), "Optimal stopping");

    let response = client
        .put(format!("{base}/api/settings"))
        .json(&serde_json::json!({ "model": "gpt-4" }))
        .send()
        .await
        .expect("Failed to send HTTP request");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
