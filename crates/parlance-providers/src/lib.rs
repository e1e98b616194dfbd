//! Stage provider abstraction.
//!
//! Each pipeline stage (Hear, Think, Speak) defines its own capability
//! trait; concrete external integrations implement one or more of them.
//! The orchestrator is generic over priority-ordered lists of these, so
//! adding or reordering a provider is a configuration change.

use async_trait::async_trait;
use thiserror::Error;

pub mod elevenlabs;
pub mod gemini;
pub mod openai;
pub mod registry;
pub mod whisper;

pub use registry::{stage_plan_from_config, StagePlan};

/// Uniform three-way provider failure classification.
///
/// All three classes advance the fallback chain identically; they are kept
/// distinct for logging. Network-level failures count as transient.
#[derive(Debug, Error)]
pub enum StageError {
    /// Quota exhausted, rate limited, or the service is unavailable.
    #[error("provider unavailable or over quota: {0}")]
    TransientQuota(String),

    /// Bad or missing model, or input the provider cannot handle.
    #[error("unsupported input or model: {0}")]
    Unsupported(String),

    /// Anything else.
    #[error("provider failure: {0}")]
    Unknown(String),
}

impl StageError {
    /// Short classification label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::TransientQuota(_) => "transient_quota",
            StageError::Unsupported(_) => "unsupported",
            StageError::Unknown(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for StageError {
    fn from(e: reqwest::Error) -> Self {
        StageError::TransientQuota(e.to_string())
    }
}

/// Classify an HTTP error status into the three-way taxonomy.
pub fn classify_status(status: reqwest::StatusCode, message: String) -> StageError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StageError::TransientQuota(message)
    } else if matches!(status.as_u16(), 400 | 404 | 413 | 415 | 422) {
        StageError::Unsupported(message)
    } else {
        StageError::Unknown(message)
    }
}

/// Drain an error response body and classify it.
pub(crate) async fn error_for_response(provider: &str, resp: reqwest::Response) -> StageError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    classify_status(status, format!("{provider}: {status}: {body}"))
}

/// Speech-to-text capability (Hear stage).
#[async_trait]
pub trait HearProvider: Send + Sync {
    /// Provider identifier (e.g., "gemini", "whisper-groq").
    fn id(&self) -> &str;

    /// Transcribe a complete utterance. `mime` is the container hint for
    /// the raw bytes (e.g., "audio/wav").
    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, StageError>;
}

/// Reply generation capability (Think stage).
#[async_trait]
pub trait ThinkProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Generate a short reply to the transcript.
    async fn reply(&self, transcript: &str) -> Result<String, StageError>;
}

/// Speech synthesis capability (Speak stage).
#[async_trait]
pub trait SpeakProvider: Send + Sync {
    fn id(&self) -> &str;

    /// Synthesize the reply text to audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, StageError>;
}
