//! Pipeline orchestrator — runs Hear → Think → Speak over a completed
//! utterance with per-stage ranked provider fallback.
//!
//! Failure policy per stage:
//! - Hear: all providers fail (or every transcript is blank) ⇒ emit one
//!   `error` event and abort; Think and Speak do not run.
//! - Think: all providers fail ⇒ substitute the apology reply and keep
//!   going.
//! - Speak: all providers fail, or none configured ⇒ reply ships text-only.
//!
//! Attempts per stage are bounded by the provider list length; no provider
//! is retried.

use std::time::Duration;

use base64::Engine as _;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use parlance_core::config::Config;
use parlance_core::protocol::ServerEvent;
use parlance_providers::{stage_plan_from_config, StageError, StagePlan};

use crate::{EventSink, Utterance};

/// Message sent to the client when no Hear provider produced a transcript.
pub const HEAR_FAILED_MESSAGE: &str = "Could not understand audio";

/// One phase of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Hear,
    Think,
    Speak,
}

impl Stage {
    fn name(self) -> &'static str {
        match self {
            Stage::Hear => "hear",
            Stage::Think => "think",
            Stage::Speak => "speak",
        }
    }
}

/// A failed provider call, kept for observability.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub kind: &'static str,
    pub message: String,
}

/// Which provider (if any) won a stage, plus every failed attempt.
#[derive(Debug, Clone)]
pub struct StageReport {
    pub stage: Stage,
    pub provider: Option<String>,
    pub attempts: Vec<ProviderAttempt>,
}

/// Result of one pipeline run. Emitted and discarded — never retained.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub transcript: String,
    pub reply: Option<String>,
    pub audio: Option<Vec<u8>>,
    pub stages: Vec<StageReport>,
}

pub struct PipelineOrchestrator {
    plan: StagePlan,
    apology_reply: String,
    stage_timeout: Option<Duration>,
}

/// Try each provider future in priority order until one succeeds.
async fn run_chain<T>(
    stage: Stage,
    timeout: Option<Duration>,
    attempts: Vec<(String, BoxFuture<'_, Result<T, StageError>>)>,
) -> (Option<(String, T)>, Vec<ProviderAttempt>) {
    let mut records = Vec::new();

    for (i, (id, fut)) in attempts.into_iter().enumerate() {
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(r) => r,
                Err(_) => Err(StageError::TransientQuota(format!(
                    "timed out after {}s",
                    limit.as_secs()
                ))),
            },
            None => fut.await,
        };

        match result {
            Ok(value) => {
                if i > 0 {
                    info!(
                        stage = stage.name(),
                        provider = %id,
                        attempt = i + 1,
                        "Fallback succeeded"
                    );
                }
                return (Some((id, value)), records);
            }
            Err(e) => {
                warn!(
                    stage = stage.name(),
                    provider = %id,
                    attempt = i + 1,
                    kind = e.kind(),
                    %e,
                    "Provider failed, trying next"
                );
                records.push(ProviderAttempt {
                    provider: id,
                    kind: e.kind(),
                    message: e.to_string(),
                });
            }
        }
    }

    (None, records)
}

impl PipelineOrchestrator {
    pub fn new(plan: StagePlan, apology_reply: String, stage_timeout: Option<Duration>) -> Self {
        Self {
            plan,
            apology_reply,
            stage_timeout,
        }
    }

    /// Build the orchestrator and its stage plan straight from config.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            stage_plan_from_config(config),
            config.apology_reply(),
            Some(Duration::from_secs(config.stage_timeout_secs())),
        )
    }

    /// Run the three stages over one utterance, emitting progressively
    /// through `sink`. Never fails: every provider error is absorbed into
    /// the stage fallback policy.
    pub async fn run(&self, utterance: Utterance, sink: &dyn EventSink) -> PipelineOutcome {
        let mut stages = Vec::new();

        // --- Hear ---
        let audio = utterance.audio.as_slice();
        let mime = utterance.mime.as_str();
        let hear_attempts: Vec<(String, BoxFuture<'_, Result<String, StageError>>)> = self
            .plan
            .hear
            .iter()
            .map(|p| {
                let fut = async move {
                    let text = p.transcribe(audio, mime).await?;
                    if text.trim().is_empty() {
                        // A silent transcript still gives later providers a shot
                        return Err(StageError::Unsupported("transcript empty".into()));
                    }
                    Ok(text)
                }
                .boxed();
                (p.id().to_string(), fut)
            })
            .collect();

        let (hear_win, attempts) = run_chain(Stage::Hear, self.stage_timeout, hear_attempts).await;

        let (transcript, hear_provider) = match hear_win {
            Some((id, text)) => (text, Some(id)),
            None => {
                stages.push(StageReport {
                    stage: Stage::Hear,
                    provider: None,
                    attempts,
                });
                warn!(audio_bytes = utterance.audio.len(), "No usable transcript");
                sink.emit(ServerEvent::Error {
                    message: HEAR_FAILED_MESSAGE.into(),
                })
                .await;
                return PipelineOutcome {
                    transcript: String::new(),
                    reply: None,
                    audio: None,
                    stages,
                };
            }
        };
        stages.push(StageReport {
            stage: Stage::Hear,
            provider: hear_provider,
            attempts,
        });

        info!(chars = transcript.len(), "Utterance transcribed");
        // The client sees what was heard before the reply arrives
        sink.emit(ServerEvent::transcription(transcript.clone()))
            .await;

        // --- Think ---
        let think_attempts: Vec<(String, BoxFuture<'_, Result<String, StageError>>)> = self
            .plan
            .think
            .iter()
            .map(|p| {
                let transcript = transcript.as_str();
                let fut = async move { p.reply(transcript).await }.boxed();
                (p.id().to_string(), fut)
            })
            .collect();

        let (think_win, attempts) =
            run_chain(Stage::Think, self.stage_timeout, think_attempts).await;

        let (reply, think_provider) = match think_win {
            Some((id, text)) => (text, Some(id)),
            None => {
                warn!("All think providers failed; substituting apology reply");
                (self.apology_reply.clone(), None)
            }
        };
        stages.push(StageReport {
            stage: Stage::Think,
            provider: think_provider,
            attempts,
        });

        // --- Speak ---
        let speak_attempts: Vec<(String, BoxFuture<'_, Result<Vec<u8>, StageError>>)> = self
            .plan
            .speak
            .iter()
            .map(|p| {
                let reply = reply.as_str();
                let fut = async move { p.synthesize(reply).await }.boxed();
                (p.id().to_string(), fut)
            })
            .collect();

        let (speak_win, attempts) =
            run_chain(Stage::Speak, self.stage_timeout, speak_attempts).await;

        let (audio, speak_provider) = match speak_win {
            Some((id, bytes)) => (Some(bytes), Some(id)),
            None => (None, None),
        };
        stages.push(StageReport {
            stage: Stage::Speak,
            provider: speak_provider,
            attempts,
        });

        let audio_b64 = audio
            .as_ref()
            .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes));

        debug!(
            reply_chars = reply.len(),
            has_audio = audio.is_some(),
            "Pipeline complete"
        );
        sink.emit(ServerEvent::AiResponse {
            text: reply.clone(),
            audio: audio_b64,
        })
        .await;

        PipelineOutcome {
            transcript,
            reply: Some(reply),
            audio,
            stages,
        }
    }
}
