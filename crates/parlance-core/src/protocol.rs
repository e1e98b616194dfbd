//! Stream wire protocol.
//!
//! All control traffic is JSON-over-WebSocket using an `{event, payload}`
//! envelope. Audio chunks travel as raw binary WebSocket messages and are
//! not part of the JSON frame set.

use serde::{Deserialize, Serialize};

/// Client -> Server control frames.
///
/// `start_stream` and `end_stream` carry no payload; chunk data arrives
/// out-of-band as binary messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ClientFrame {
    StartStream,
    EndStream,
}

/// Server -> Client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Connection ack: the assigned session id and server version.
    Hello { session_id: String, version: String },

    /// The user's transcript, emitted as soon as the Hear stage succeeds.
    TranscriptionUpdate { role: String, text: String },

    /// Final reply: text plus optional base64-encoded audio.
    ///
    /// The `audio` key is always present; `null` means synthesis was
    /// skipped or failed.
    AiResponse { text: String, audio: Option<String> },

    /// Emitted only when the utterance could not be transcribed at all.
    Error { message: String },
}

impl ServerEvent {
    /// Transcript event with the fixed `"user"` role.
    pub fn transcription(text: impl Into<String>) -> Self {
        Self::TranscriptionUpdate {
            role: "user".into(),
            text: text.into(),
        }
    }
}
