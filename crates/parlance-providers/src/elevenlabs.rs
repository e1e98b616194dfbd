//! ElevenLabs speech synthesis.

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::{error_for_response, SpeakProvider, StageError};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_VOICE: &str = "Rachel";
const DEFAULT_MODEL: &str = "eleven_turbo_v2";

pub struct ElevenLabsSpeak {
    pub base_url: String,
    voice: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl ElevenLabsSpeak {
    pub fn new(
        api_key: String,
        voice: Option<&str>,
        model: Option<&str>,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            voice: voice.unwrap_or(DEFAULT_VOICE).to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/text-to-speech/{}", self.base_url, self.voice)
    }
}

#[async_trait]
impl SpeakProvider for ElevenLabsSpeak {
    fn id(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, StageError> {
        debug!(voice = %self.voice, model = %self.model, text_len = text.len(), "Synthesizing via ElevenLabs");

        let response = self
            .client
            .post(self.url())
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&json!({
                "text": text,
                "model_id": self.model,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response("elevenlabs", response).await);
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_url() {
        let p = ElevenLabsSpeak::new("k".into(), None, None, None);
        let url = p.url();
        assert!(url.starts_with("https://api.elevenlabs.io"));
        assert!(url.contains("text-to-speech/Rachel"));
    }

    #[test]
    fn test_custom_voice_and_base() {
        let p = ElevenLabsSpeak::new("k".into(), Some("Bella"), None, Some("http://localhost:2/"));
        assert_eq!(p.url(), "http://localhost:2/v1/text-to-speech/Bella");
        assert_eq!(p.id(), "elevenlabs");
    }
}
