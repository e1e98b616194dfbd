//! Per-connection session driver.
//!
//! Owns one session's lifecycle and translates transport events into
//! registry and orchestrator calls. The pipeline run is spawned so the
//! connection keeps receiving control events (notably disconnect) while
//! processing is in flight; emission is guarded by session existence so a
//! result arriving after disconnect is silently dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use parlance_core::protocol::ServerEvent;

use crate::lifecycle::{EndOfStream, StreamLifecycle, StreamState};
use crate::orchestrator::PipelineOrchestrator;
use crate::registry::SessionBufferRegistry;
use crate::{EventSink, Utterance};

pub struct SessionDriver {
    session_id: String,
    registry: Arc<SessionBufferRegistry>,
    orchestrator: Arc<PipelineOrchestrator>,
    sink: Arc<dyn EventSink>,
    lifecycle: Arc<Mutex<StreamLifecycle>>,
    min_utterance_bytes: usize,
    audio_mime: String,
}

/// Sink wrapper that drops events once the session is gone.
struct GuardedSink {
    session_id: String,
    registry: Arc<SessionBufferRegistry>,
    inner: Arc<dyn EventSink>,
}

#[async_trait]
impl EventSink for GuardedSink {
    async fn emit(&self, event: ServerEvent) {
        if !self.registry.contains(&self.session_id).await {
            debug!(session_id = %self.session_id, "Session gone, dropping pipeline event");
            return;
        }
        self.inner.emit(event).await;
    }
}

impl SessionDriver {
    pub fn new(
        session_id: String,
        registry: Arc<SessionBufferRegistry>,
        orchestrator: Arc<PipelineOrchestrator>,
        sink: Arc<dyn EventSink>,
        min_utterance_bytes: usize,
        audio_mime: String,
    ) -> Self {
        Self {
            session_id,
            registry,
            orchestrator,
            sink,
            lifecycle: Arc::new(Mutex::new(StreamLifecycle::new())),
            min_utterance_bytes,
            audio_mime,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn state(&self) -> StreamState {
        self.lifecycle.lock().await.state()
    }

    /// Register the session and announce it to the client.
    pub async fn handle_connect(&self) {
        self.registry.open(&self.session_id).await;
        self.sink
            .emit(ServerEvent::Hello {
                session_id: self.session_id.clone(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await;
        info!(session_id = %self.session_id, "Session opened");
    }

    pub async fn handle_start_stream(&self) {
        self.lifecycle.lock().await.on_start_stream();
        let dropped = self.registry.drain(&self.session_id).await;
        if !dropped.is_empty() {
            debug!(
                session_id = %self.session_id,
                bytes = dropped.len(),
                "Stale buffer cleared on stream start"
            );
        }
    }

    pub async fn handle_audio_chunk(&self, chunk: Vec<u8>) {
        self.lifecycle.lock().await.on_audio_chunk();
        self.registry.append(&self.session_id, chunk).await;
    }

    /// End of utterance: gate on size, then drain and run the pipeline in
    /// a spawned task.
    pub async fn handle_end_stream(&self) {
        let buffered = self.registry.buffered_bytes(&self.session_id).await;
        let action = self
            .lifecycle
            .lock()
            .await
            .on_end_stream(buffered, self.min_utterance_bytes);

        match action {
            EndOfStream::Ignore => {}
            EndOfStream::Discard => {
                let dropped = self.registry.drain(&self.session_id).await;
                debug!(
                    session_id = %self.session_id,
                    bytes = dropped.len(),
                    "Ignored short utterance"
                );
            }
            EndOfStream::Reject => {
                warn!(
                    session_id = %self.session_id,
                    "end_stream while an utterance is in flight, ignoring"
                );
            }
            EndOfStream::Process => {
                let audio = self.registry.drain(&self.session_id).await;
                info!(
                    session_id = %self.session_id,
                    bytes = audio.len(),
                    "Processing utterance"
                );

                let session_id = self.session_id.clone();
                let orchestrator = self.orchestrator.clone();
                let lifecycle = self.lifecycle.clone();
                let utterance = Utterance {
                    audio,
                    mime: self.audio_mime.clone(),
                };
                let guard = GuardedSink {
                    session_id: session_id.clone(),
                    registry: self.registry.clone(),
                    inner: self.sink.clone(),
                };

                tokio::spawn(async move {
                    let outcome = orchestrator.run(utterance, &guard).await;

                    debug!(
                        session_id = %session_id,
                        replied = outcome.reply.is_some(),
                        "Pipeline run finished"
                    );
                    lifecycle.lock().await.on_pipeline_done();
                });
            }
        }
    }

    /// Terminal: remove the session. Any in-flight pipeline result will be
    /// dropped by the emission guard when it lands.
    pub async fn handle_disconnect(&self) {
        self.registry.remove(&self.session_id).await;
        info!(session_id = %self.session_id, "Session closed");
    }
}
