//! Config-driven stage plan construction.
//!
//! Maps the ranked per-stage provider entries in the config onto concrete
//! adapter instances. Order in the config is priority order; entries with
//! an unknown id or no resolvable API key are skipped with a warning so a
//! half-configured install degrades instead of failing to boot.

use std::sync::Arc;

use tracing::warn;

use parlance_core::config::{Config, StageProviderConfig};

use crate::elevenlabs::ElevenLabsSpeak;
use crate::gemini::{GeminiHear, GeminiThink};
use crate::openai::{OpenAiSpeak, OpenAiThink};
use crate::whisper::WhisperHear;
use crate::{HearProvider, SpeakProvider, ThinkProvider};

/// Ranked provider lists for the three pipeline stages, primary first.
#[derive(Default)]
pub struct StagePlan {
    pub hear: Vec<Arc<dyn HearProvider>>,
    pub think: Vec<Arc<dyn ThinkProvider>>,
    pub speak: Vec<Arc<dyn SpeakProvider>>,
}

fn resolve_key(stage: &str, entry: &StageProviderConfig) -> Option<String> {
    match entry.resolve_api_key() {
        Some(key) => Some(key),
        None => {
            warn!(stage, provider = %entry.id, "Skipping provider with no API key");
            None
        }
    }
}

/// Build the stage plan from config. Unknown provider ids are skipped.
pub fn stage_plan_from_config(config: &Config) -> StagePlan {
    let mut plan = StagePlan::default();

    let Some(stages) = config.stages.as_ref() else {
        warn!("No stages configured; pipeline will reject every utterance");
        return plan;
    };

    let system_prompt = config.system_prompt();

    for entry in &stages.hear {
        let Some(key) = resolve_key("hear", entry) else {
            continue;
        };
        let model = entry.model.as_deref();
        let base_url = entry.base_url.as_deref();
        let provider: Arc<dyn HearProvider> = match entry.id.as_str() {
            "gemini" => Arc::new(GeminiHear::new(key, model, base_url)),
            "whisper-openai" => Arc::new(WhisperHear::openai(key, model, base_url)),
            "whisper-groq" => Arc::new(WhisperHear::groq(key, model, base_url)),
            other => {
                warn!(provider = other, "Unknown hear provider id, skipping");
                continue;
            }
        };
        plan.hear.push(provider);
    }

    for entry in &stages.think {
        let Some(key) = resolve_key("think", entry) else {
            continue;
        };
        let model = entry.model.as_deref();
        let base_url = entry.base_url.as_deref();
        let provider: Arc<dyn ThinkProvider> = match entry.id.as_str() {
            "gemini" => Arc::new(GeminiThink::new(key, model, base_url, system_prompt.clone())),
            "openai" => Arc::new(OpenAiThink::new(key, model, base_url, system_prompt.clone())),
            other => {
                warn!(provider = other, "Unknown think provider id, skipping");
                continue;
            }
        };
        plan.think.push(provider);
    }

    for entry in &stages.speak {
        let Some(key) = resolve_key("speak", entry) else {
            continue;
        };
        let model = entry.model.as_deref();
        let base_url = entry.base_url.as_deref();
        let voice = entry.voice.as_deref();
        let provider: Arc<dyn SpeakProvider> = match entry.id.as_str() {
            "elevenlabs" => Arc::new(ElevenLabsSpeak::new(key, voice, model, base_url)),
            "openai" => Arc::new(OpenAiSpeak::new(key, model, voice, base_url)),
            other => {
                warn!(provider = other, "Unknown speak provider id, skipping");
                continue;
            }
        };
        plan.speak.push(provider);
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlance_core::config::StagesConfig;

    fn entry(id: &str, api_key: Option<&str>) -> StageProviderConfig {
        StageProviderConfig {
            id: id.into(),
            api_key: api_key.map(|s| s.to_string()),
            api_key_env: None,
            base_url: None,
            model: None,
            voice: None,
        }
    }

    #[test]
    fn test_empty_config_builds_empty_plan() {
        let plan = stage_plan_from_config(&Config::default());
        assert!(plan.hear.is_empty());
        assert!(plan.think.is_empty());
        assert!(plan.speak.is_empty());
    }

    #[test]
    fn test_plan_preserves_config_order() {
        let mut config = Config::default();
        config.stages = Some(StagesConfig {
            hear: vec![entry("gemini", Some("k1")), entry("whisper-groq", Some("k2"))],
            think: vec![entry("gemini", Some("k1")), entry("openai", Some("k3"))],
            speak: vec![entry("elevenlabs", Some("k4")), entry("openai", Some("k3"))],
            system_prompt: None,
            apology_reply: None,
        });

        let plan = stage_plan_from_config(&config);
        assert_eq!(plan.hear.len(), 2);
        assert_eq!(plan.hear[0].id(), "gemini");
        assert_eq!(plan.hear[1].id(), "whisper-groq");
        assert_eq!(plan.think[1].id(), "openai");
        assert_eq!(plan.speak[0].id(), "elevenlabs");
    }

    #[test]
    fn test_unknown_and_keyless_entries_skipped() {
        let mut config = Config::default();
        config.stages = Some(StagesConfig {
            hear: vec![
                entry("gemini", None),          // no key
                entry("mystery-stt", Some("k")), // unknown id
                entry("whisper-openai", Some("k")),
            ],
            think: vec![],
            speak: vec![],
            system_prompt: None,
            apology_reply: None,
        });

        let plan = stage_plan_from_config(&config);
        assert_eq!(plan.hear.len(), 1);
        assert_eq!(plan.hear[0].id(), "whisper-openai");
    }
}
