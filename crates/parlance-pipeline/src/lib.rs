//! Streaming voice pipeline — session buffers, stream lifecycle, and the
//! Hear → Think → Speak orchestrator with per-stage provider fallback.

use async_trait::async_trait;

use parlance_core::protocol::ServerEvent;

pub mod driver;
pub mod lifecycle;
pub mod orchestrator;
pub mod registry;

pub use driver::SessionDriver;
pub use lifecycle::{StreamLifecycle, StreamState};
pub use orchestrator::{PipelineOrchestrator, PipelineOutcome};
pub use registry::SessionBufferRegistry;

/// A completed utterance ready for the pipeline. Transient — lives only
/// for the duration of one run and is never persisted.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub audio: Vec<u8>,
    /// Container hint for the raw bytes (e.g., "audio/wav").
    pub mime: String,
}

/// Emission seam between the pipeline and the transport.
///
/// The orchestrator emits progressively through this; the gateway backs
/// it with the connection's outbound channel.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: ServerEvent);
}
