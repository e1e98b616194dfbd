//! Whisper-compatible transcription over the OpenAI audio API shape.
//!
//! Covers OpenAI and Groq, which share the `/v1/audio/transcriptions`
//! multipart contract; the base URL and default model differ.

use async_trait::async_trait;
use tracing::debug;

use crate::{error_for_response, HearProvider, StageError};

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai";

pub struct WhisperHear {
    pub base_url: String,
    provider_id: String,
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl WhisperHear {
    pub fn openai(api_key: String, model: Option<&str>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            provider_id: "whisper-openai".into(),
            model: model.unwrap_or("whisper-1").to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    pub fn groq(api_key: String, model: Option<&str>, base_url: Option<&str>) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(GROQ_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            provider_id: "whisper-groq".into(),
            model: model.unwrap_or("whisper-large-v3-turbo").to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self) -> String {
        format!("{}/v1/audio/transcriptions", self.base_url)
    }
}

/// File name extension matching the MIME hint, for the multipart part.
fn file_name_for_mime(mime: &str) -> &'static str {
    match mime {
        "audio/webm" => "audio.webm",
        "audio/ogg" => "audio.ogg",
        "audio/mpeg" | "audio/mp3" => "audio.mp3",
        _ => "audio.wav",
    }
}

#[async_trait]
impl HearProvider for WhisperHear {
    fn id(&self) -> &str {
        &self.provider_id
    }

    async fn transcribe(&self, audio: &[u8], mime: &str) -> Result<String, StageError> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(file_name_for_mime(mime))
            .mime_str(mime)
            .map_err(|e| StageError::Unsupported(format!("{}: bad mime: {e}", self.provider_id)))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "text")
            .part("file", part);

        debug!(
            url = %self.url(),
            model = %self.model,
            audio_bytes = audio.len(),
            "Sending audio for transcription"
        );

        let response = self
            .client
            .post(self.url())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_for_response(&self.provider_id, response).await);
        }

        let text = response.text().await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_constructor() {
        let p = WhisperHear::openai("k".into(), None, None);
        assert_eq!(p.id(), "whisper-openai");
        assert_eq!(p.url(), "https://api.openai.com/v1/audio/transcriptions");
        assert_eq!(p.model, "whisper-1");
    }

    #[test]
    fn test_groq_constructor() {
        let p = WhisperHear::groq("k".into(), Some("whisper-large-v3"), None);
        assert_eq!(p.id(), "whisper-groq");
        assert!(p.url().contains("groq.com"));
        assert_eq!(p.model, "whisper-large-v3");
    }

    #[test]
    fn test_custom_base_url() {
        let p = WhisperHear::openai("k".into(), None, Some("http://localhost:1234/"));
        assert_eq!(p.url(), "http://localhost:1234/v1/audio/transcriptions");
    }

    #[test]
    fn test_file_name_for_mime() {
        assert_eq!(file_name_for_mime("audio/wav"), "audio.wav");
        assert_eq!(file_name_for_mime("audio/webm"), "audio.webm");
        assert_eq!(file_name_for_mime("application/octet-stream"), "audio.wav");
    }
}
