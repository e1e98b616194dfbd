//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default minimum utterance size in bytes. Clips below this are treated
/// as mic pops or silence and discarded without a pipeline run.
pub const DEFAULT_MIN_UTTERANCE_BYTES: usize = 1000;

/// Default MIME hint for inbound audio.
pub const DEFAULT_AUDIO_MIME: &str = "audio/wav";

/// Default per-stage provider timeout in seconds.
pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 30;

/// Reply substituted when every Think provider fails.
pub const DEFAULT_APOLOGY_REPLY: &str =
    "Sorry, I had trouble coming up with an answer just now. Could you ask me again?";

/// System prompt for the Think stage.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly and encouraging voice tutor. \
Explain things simply and keep answers to at most two sentences.";

/// Top-level Parlance configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway: Option<GatewayConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stages: Option<StagesConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,

    /// Allowed CORS origin for the HTTP surface (`*` when unset).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cors_origin: Option<String>,
}

/// Streaming buffer and gating parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_utterance_bytes: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_mime: Option<String>,

    /// Per-provider call timeout; a timed-out call counts as a transient
    /// provider failure and the fallback chain advances.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_timeout_secs: Option<u64>,
}

/// Ranked provider lists per pipeline stage, primary first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StagesConfig {
    #[serde(default)]
    pub hear: Vec<StageProviderConfig>,

    #[serde(default)]
    pub think: Vec<StageProviderConfig>,

    #[serde(default)]
    pub speak: Vec<StageProviderConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub apology_reply: Option<String>,
}

/// Configuration for a single stage provider entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProviderConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

impl StageProviderConfig {
    /// Resolve the API key: check `api_key` first, then `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::ParlanceError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::ParlanceError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file location: `~/.parlance/config.json`
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Gateway port.
    pub fn gateway_port(&self) -> u16 {
        self.gateway.as_ref().map(|g| g.port).unwrap_or(8080)
    }

    /// Minimum utterance byte length before the pipeline runs.
    pub fn min_utterance_bytes(&self) -> usize {
        self.stream
            .as_ref()
            .and_then(|s| s.min_utterance_bytes)
            .unwrap_or(DEFAULT_MIN_UTTERANCE_BYTES)
    }

    /// MIME hint forwarded to Hear providers.
    pub fn audio_mime(&self) -> String {
        self.stream
            .as_ref()
            .and_then(|s| s.audio_mime.clone())
            .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string())
    }

    /// Per-stage provider call timeout in seconds.
    pub fn stage_timeout_secs(&self) -> u64 {
        self.stream
            .as_ref()
            .and_then(|s| s.stage_timeout_secs)
            .unwrap_or(DEFAULT_STAGE_TIMEOUT_SECS)
    }

    /// Think-stage system prompt.
    pub fn system_prompt(&self) -> String {
        self.stages
            .as_ref()
            .and_then(|s| s.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
    }

    /// Reply text substituted when every Think provider fails.
    pub fn apology_reply(&self) -> String {
        self.stages
            .as_ref()
            .and_then(|s| s.apology_reply.clone())
            .unwrap_or_else(|| DEFAULT_APOLOGY_REPLY.to_string())
    }

    /// Get a config value by dotted path (e.g. "gateway.port", "stream.audio_mime").
    pub fn get_path(&self, path: &str) -> Option<serde_json::Value> {
        let json = serde_json::to_value(self).ok()?;
        let mut current = &json;
        for segment in path.split('.') {
            current = current.get(segment)?;
        }
        Some(current.clone())
    }

    /// Set a config value by dotted path.
    pub fn set_path(&mut self, path: &str, value: serde_json::Value) -> anyhow::Result<()> {
        let mut json = serde_json::to_value(&*self)
            .map_err(|e| anyhow::anyhow!("Config serialization error: {e}"))?;

        let segments: Vec<&str> = path.split('.').collect();
        if segments.is_empty() {
            return Err(anyhow::anyhow!("Empty path"));
        }

        let mut current = &mut json;
        for segment in &segments[..segments.len() - 1] {
            if current.get(segment).is_none() {
                current[segment] = serde_json::json!({});
            }
            current = current.get_mut(segment).unwrap();
        }

        let last = segments.last().unwrap();
        current[last] = value;

        *self = serde_json::from_value(json)
            .map_err(|e| anyhow::anyhow!("Config deserialization error: {e}"))?;
        Ok(())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(stages) = &self.stages {
            for (stage, entries) in [
                ("hear", &stages.hear),
                ("think", &stages.think),
                ("speak", &stages.speak),
            ] {
                for p in entries {
                    if p.resolve_api_key().is_none() {
                        warnings.push(format!(
                            "{stage} provider '{}' has no API key configured",
                            p.id
                        ));
                    }
                }
            }
            if stages.hear.is_empty() {
                warnings.push("no hear providers configured; every utterance will fail".into());
            }
        } else {
            warnings.push("no stages configured; every utterance will fail".into());
        }

        if let Some(gw) = &self.gateway {
            if gw.port == 0 {
                errors.push("Gateway port cannot be 0".to_string());
            }
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Parlance data: `~/.parlance/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parlance")
}
