//! OpenAI chat and speech providers.
//!
//! Think uses non-streaming `/v1/chat/completions`; Speak uses
//! `/v1/audio/speech`. Both authenticate with a bearer key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{error_for_response, SpeakProvider, StageError, ThinkProvider};

const OPENAI_BASE_URL: &str = "https://api.openai.com";

// --- chat completion types ---

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiThink {
    pub base_url: String,
    model: String,
    api_key: String,
    system_prompt: String,
    client: reqwest::Client,
}

impl OpenAiThink {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
        system_prompt: String,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or("gpt-4o-mini").to_string(),
            api_key,
            system_prompt,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ThinkProvider for OpenAiThink {
    fn id(&self) -> &str {
        "openai"
    }

    async fn reply(&self, transcript: &str) -> Result<String, StageError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                json!({ "role": "system", "content": self.system_prompt }),
                json!({ "role": "user", "content": transcript }),
            ],
            max_tokens: 256,
        };

        debug!(model = %body.model, "Generating reply via OpenAI");

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response("openai-think", response).await);
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| StageError::Unknown(format!("openai-think: malformed response: {e}")))?;

        let text = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }
}

pub struct OpenAiSpeak {
    pub base_url: String,
    model: String,
    voice: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiSpeak {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        voice: Option<&str>,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or("tts-1").to_string(),
            voice: voice.unwrap_or("alloy").to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SpeakProvider for OpenAiSpeak {
    fn id(&self) -> &str {
        "openai"
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, StageError> {
        debug!(model = %self.model, voice = %self.voice, text_len = text.len(), "Synthesizing via OpenAI");

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&json!({
                "model": self.model,
                "voice": self.voice,
                "input": text,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response("openai-speak", response).await);
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_think_defaults() {
        let p = OpenAiThink::new("k".into(), None, None, "prompt".into());
        assert_eq!(p.id(), "openai");
        assert_eq!(p.base_url, OPENAI_BASE_URL);
        assert_eq!(p.model, "gpt-4o-mini");
    }

    #[test]
    fn test_speak_defaults() {
        let p = OpenAiSpeak::new("k".into(), None, None, Some("http://localhost:1/"));
        assert_eq!(p.base_url, "http://localhost:1");
        assert_eq!(p.model, "tts-1");
        assert_eq!(p.voice, "alloy");
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Hi!"}}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Hi!"));
    }

    #[test]
    fn test_chat_response_empty_choices() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(resp.choices.is_empty());
    }
}
