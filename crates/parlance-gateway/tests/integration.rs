//! Gateway integration tests — start a real gateway and interact via WS + HTTP.
//!
//! Run with: `cargo test -p parlance-gateway --test integration`
//!
//! No stage providers are configured, so a processed utterance exercises
//! the Hear-exhausted path and yields a protocol `error` event.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Find an available port.
fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Build a minimal gateway and return its state + port.
async fn start_test_gateway() -> (Arc<parlance_gateway::GatewayState>, u16) {
    let port = find_free_port();

    let config = Arc::new(parlance_core::config::Config::default());
    let state = Arc::new(parlance_gateway::GatewayState::new(config));

    let state_clone = state.clone();
    tokio::spawn(async move {
        let _ = parlance_gateway::start_gateway(state_clone, port).await;
    });

    // Wait for the gateway to be ready
    for _ in 0..50 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if reqwest::get(format!("http://127.0.0.1:{port}/health"))
            .await
            .is_ok()
        {
            break;
        }
    }

    (state, port)
}

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

async fn connect(port: u16) -> WsStream {
    let url = format!("ws://127.0.0.1:{port}/ws");
    let (ws, _) = connect_async(&url).await.expect("WS connect failed");
    ws
}

/// Read the next JSON event frame, with a deadline.
async fn next_event(ws: &mut WsStream) -> serde_json::Value {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for event")
        .expect("connection closed")
        .expect("websocket error");
    serde_json::from_str(msg.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (_state, port) = start_test_gateway().await;

    let resp = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .expect("Health request failed");

    assert!(resp.status().is_success());
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_hello_on_connect() {
    let (_state, port) = start_test_gateway().await;
    let mut ws = connect(port).await;

    let hello = next_event(&mut ws).await;
    assert_eq!(hello["event"], "hello");
    assert!(hello["payload"]["session_id"].is_string());
    assert!(hello["payload"]["version"].is_string());

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_utterance_without_providers_yields_error_event() {
    let (_state, port) = start_test_gateway().await;
    let mut ws = connect(port).await;

    // Skip hello
    let _ = next_event(&mut ws).await;

    ws.send(Message::Text(
        json!({"event": "start_stream"}).to_string().into(),
    ))
    .await
    .unwrap();
    ws.send(Message::Binary(vec![0u8; 1500].into()))
        .await
        .unwrap();
    ws.send(Message::Text(
        json!({"event": "end_stream"}).to_string().into(),
    ))
    .await
    .unwrap();

    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "error");
    assert_eq!(event["payload"]["message"], "Could not understand audio");

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_short_clip_produces_no_events() {
    let (_state, port) = start_test_gateway().await;
    let mut ws = connect(port).await;

    // Skip hello
    let _ = next_event(&mut ws).await;

    ws.send(Message::Text(
        json!({"event": "start_stream"}).to_string().into(),
    ))
    .await
    .unwrap();
    ws.send(Message::Binary(vec![0u8; 500].into()))
        .await
        .unwrap();
    ws.send(Message::Text(
        json!({"event": "end_stream"}).to_string().into(),
    ))
    .await
    .unwrap();

    // Below the minimum utterance size: discarded without any outbound event
    let silence = tokio::time::timeout(Duration::from_millis(800), ws.next()).await;
    assert!(silence.is_err(), "expected no event, got {silence:?}");

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_invalid_frame_is_ignored_and_connection_survives() {
    let (_state, port) = start_test_gateway().await;
    let mut ws = connect(port).await;

    // Skip hello
    let _ = next_event(&mut ws).await;

    ws.send(Message::Text(
        json!({"event": "join_session", "payload": {"room": 7}})
            .to_string()
            .into(),
    ))
    .await
    .unwrap();

    // The connection still processes a normal utterance afterwards
    ws.send(Message::Binary(vec![0u8; 1500].into()))
        .await
        .unwrap();
    ws.send(Message::Text(
        json!({"event": "end_stream"}).to_string().into(),
    ))
    .await
    .unwrap();

    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "error");

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_disconnect_removes_session() {
    let (state, port) = start_test_gateway().await;
    let mut ws = connect(port).await;

    let hello = next_event(&mut ws).await;
    let session_id = hello["payload"]["session_id"].as_str().unwrap().to_string();
    assert!(state.registry.contains(&session_id).await);

    ws.send(Message::Binary(vec![0u8; 2000].into()))
        .await
        .unwrap();
    ws.close(None).await.ok();

    // Cleanup is asynchronous; poll for removal
    let mut removed = false;
    for _ in 0..50 {
        if !state.registry.contains(&session_id).await {
            removed = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(removed, "session entry was not removed on disconnect");
}
