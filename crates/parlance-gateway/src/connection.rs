//! WebSocket connection lifecycle — one session per connection.
//!
//! Binary messages are audio chunks; text messages are JSON control
//! frames. The read loop stays responsive while a pipeline run is in
//! flight, so a disconnect mid-processing is observed immediately.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use parlance_core::protocol::{ClientFrame, ServerEvent};
use parlance_pipeline::{EventSink, SessionDriver};

use crate::state::{ConnectionState, GatewayState};

/// Sink backed by the connection's outbound channel.
struct ChannelSink {
    event_tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn emit(&self, event: ServerEvent) {
        match serde_json::to_string(&event) {
            // Send failure means the writer task is gone; nothing to do
            Ok(msg) => {
                let _ = self.event_tx.send(msg);
            }
            Err(e) => error!(%e, "Failed to serialize event"),
        }
    }
}

/// Handle a new WebSocket connection.
pub async fn handle_ws_connection(state: Arc<GatewayState>, ws: WebSocket) {
    let conn_id = Uuid::new_v4().to_string();
    info!(conn_id = %conn_id, "New WebSocket connection");

    let (mut ws_tx, mut ws_rx) = ws.split();

    // Outbound event channel for this connection
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();

    {
        let mut connections = state.connections.write().await;
        connections.insert(
            conn_id.clone(),
            ConnectionState {
                conn_id: conn_id.clone(),
                event_tx: event_tx.clone(),
            },
        );
    }

    let sink: Arc<dyn EventSink> = Arc::new(ChannelSink { event_tx });
    let driver = Arc::new(SessionDriver::new(
        conn_id.clone(),
        state.registry.clone(),
        state.orchestrator.clone(),
        sink,
        state.config.min_utterance_bytes(),
        state.config.audio_mime(),
    ));

    driver.handle_connect().await;

    // Writer task drains the event channel onto the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = event_rx.recv().await {
            if ws_tx.send(Message::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    // Main read loop
    while let Some(msg_result) = ws_rx.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => {
                driver.handle_audio_chunk(data.to_vec()).await;
            }
            Ok(Message::Text(text)) => {
                let text = text.to_string();
                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(ClientFrame::StartStream) => driver.handle_start_stream().await,
                    Ok(ClientFrame::EndStream) => driver.handle_end_stream().await,
                    Err(e) => {
                        warn!(conn_id = %conn_id, %e, "Invalid frame received, ignoring");
                    }
                }
            }
            Ok(Message::Ping(_)) => {
                // Axum handles ping/pong automatically
            }
            Ok(Message::Close(_)) => {
                debug!(conn_id = %conn_id, "Client requested close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn_id, %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup: session first, so any in-flight result is dropped
    driver.handle_disconnect().await;
    send_task.abort();
    {
        let mut connections = state.connections.write().await;
        connections.remove(&conn_id);
    }
    info!(conn_id = %conn_id, "WebSocket connection closed");
}
