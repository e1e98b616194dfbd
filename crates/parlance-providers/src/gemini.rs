//! Google Generative AI (Gemini) providers.
//!
//! One `generateContent` integration covers two stages: Hear sends the
//! utterance as an inline base64 audio part with a fixed transcription
//! instruction, Think sends the transcript under a system instruction.
//! Auth is via API key in the query string.

use async_trait::async_trait;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::{error_for_response, HearProvider, StageError, ThinkProvider};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-flash-latest";

const TRANSCRIBE_INSTRUCTION: &str = "Transcribe this audio exactly. Output only the text.";

// --- Gemini request/response types ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

impl GeminiResponse {
    /// Concatenated text of the first candidate's parts.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default()
    }
}

/// Shared call plumbing for both Gemini stages.
struct GeminiClient {
    base_url: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiClient {
    fn new(api_key: String, model: Option<&str>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: model.unwrap_or(DEFAULT_MODEL).to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    async fn generate(&self, provider: &str, body: &GeminiRequest) -> Result<String, StageError> {
        let response = self
            .client
            .post(self.url())
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(provider, response).await);
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| StageError::Unknown(format!("{provider}: malformed response: {e}")))?;

        Ok(parsed.text().trim().to_string())
    }
}

/// Hear via Gemini: inline audio + transcription instruction.
pub struct GeminiHear {
    inner: GeminiClient,
}

impl GeminiHear {
    pub fn new(api_key: String, model: Option<&str>, base_url: Option<&str>) -> Self {
        Self {
            inner: GeminiClient::new(api_key, model, base_url),
        }
    }
}

#[async_trait]
impl HearProvider for GeminiHear {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, StageError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(audio);

        let body = GeminiRequest {
            contents: vec![json!({
                "parts": [
                    { "text": TRANSCRIBE_INSTRUCTION },
                    { "inlineData": { "mimeType": mime, "data": encoded } },
                ]
            })],
            system_instruction: None,
            generation_config: None,
        };

        debug!(model = %self.inner.model, audio_bytes = audio.len(), "Transcribing via Gemini");
        self.inner.generate("gemini-hear", &body).await
    }
}

/// Think via Gemini: transcript under a system instruction.
pub struct GeminiThink {
    inner: GeminiClient,
    system_prompt: String,
}

impl GeminiThink {
    pub fn new(
        api_key: String,
        model: Option<&str>,
        base_url: Option<&str>,
        system_prompt: String,
    ) -> Self {
        Self {
            inner: GeminiClient::new(api_key, model, base_url),
            system_prompt,
        }
    }
}

#[async_trait]
impl ThinkProvider for GeminiThink {
    fn id(&self) -> &str {
        "gemini"
    }

    async fn reply(&self, transcript: &str) -> Result<String, StageError> {
        let body = GeminiRequest {
            contents: vec![json!({
                "role": "user",
                "parts": [{ "text": transcript }],
            })],
            system_instruction: Some(json!({
                "parts": [{ "text": self.system_prompt }]
            })),
            generation_config: Some(GenerationConfig {
                max_output_tokens: Some(256),
                temperature: None,
            }),
        };

        debug!(model = %self.inner.model, "Generating reply via Gemini");
        self.inner.generate("gemini-think", &body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_url_embeds_model_and_key() {
        let client = GeminiClient::new("test-key".into(), None, None);
        let url = client.url();
        assert!(url.starts_with("https://generativelanguage.googleapis.com/v1beta/models/"));
        assert!(url.contains("gemini-flash-latest:generateContent"));
        assert!(url.ends_with("key=test-key"));
    }

    #[test]
    fn test_custom_base_url_trailing_slash() {
        let client = GeminiClient::new("k".into(), Some("my-model"), Some("http://localhost:9999/"));
        assert!(client.url().starts_with("http://localhost:9999/v1beta/models/my-model"));
    }

    #[test]
    fn test_response_text_concatenates_parts() {
        let json = r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"there"}]}}]}"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.text(), "Hello there");
    }

    #[test]
    fn test_response_text_empty_when_no_candidates() {
        let resp: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert_eq!(resp.text(), "");
    }

    #[test]
    fn test_hear_request_includes_inline_audio() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(b"RIFFdata");
        let body = GeminiRequest {
            contents: vec![json!({
                "parts": [
                    { "text": TRANSCRIBE_INSTRUCTION },
                    { "inlineData": { "mimeType": "audio/wav", "data": encoded } },
                ]
            })],
            system_instruction: None,
            generation_config: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value["contents"][0]["parts"][1]["inlineData"]["mimeType"],
            "audio/wav"
        );
        assert!(value.get("systemInstruction").is_none());
    }

    #[test]
    fn test_think_request_carries_system_instruction() {
        let think = GeminiThink::new("k".into(), None, None, "Be brief.".into());
        let body = GeminiRequest {
            contents: vec![json!({"role": "user", "parts": [{"text": "hi"}]})],
            system_instruction: Some(json!({"parts": [{"text": think.system_prompt}]})),
            generation_config: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "Be brief.");
    }
}
