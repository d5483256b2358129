use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RelayMode {
    /// Reply with the incoming text, no inference calls.
    Echo,
    #[default]
    Inference,
}

impl std::fmt::Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RelayMode::Echo => write!(f, "echo"),
            RelayMode::Inference => write!(f, "inference"),
        }
    }
}

impl FromStr for RelayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "echo" => Ok(RelayMode::Echo),
            "inference" => Ok(RelayMode::Inference),
            other => anyhow::bail!("unknown relay mode '{}' (expected echo or inference)", other),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub inference: InferenceConfig,
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub api_url: String,
    /// Public base URL of this service; `/webhook` is appended on registration.
    pub webhook_base_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            api_url: "https://api.telegram.org".to_string(),
            webhook_base_url: "https://your-default-url.com".to_string(),
        }
    }
}

impl TelegramConfig {
    pub fn webhook_url(&self) -> String {
        format!("{}/webhook", self.webhook_base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InferenceConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub speech_model: String,
    pub max_new_tokens: u32,
    pub temperature: f32,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://router.huggingface.co/hf-inference/models".to_string(),
            text_model: "google/gemma-7b-it".to_string(),
            speech_model: "openai/whisper-tiny".to_string(),
            max_new_tokens: 200,
            temperature: 0.8,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RelayConfig {
    pub mode: RelayMode,
    /// Prompt sent for text generation; `{text}` is replaced with the user's input.
    pub prompt_template: String,
    /// Send "transcribing..." and transcript notices around voice messages.
    pub notify_progress: bool,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            mode: RelayMode::default(),
            prompt_template: default_prompt_template(),
            notify_progress: false,
        }
    }
}

fn default_prompt_template() -> String {
    "You are an AI music composer. Smooth this hummed or whistled melody into a \
     beautiful, pleasant one. Answer only with the sequence of notes \
     (for example: do re mi) or the improved humming.\n\
     Original melody: {text}\n\
     Improved melody:"
        .to_string()
}

/// Returns `None` for unset or blank variables.
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Config {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))?
            }
            None => Config::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        if let Some(host) = get("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get("PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        if let Some(token) = get("TELEGRAM_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(url) = get("TELEGRAM_API_URL") {
            self.telegram.api_url = url;
        }
        if let Some(url) = get("WEBHOOK_BASE_URL") {
            self.telegram.webhook_base_url = url;
        }

        if let Some(key) = get("HF_TOKEN") {
            self.inference.api_key = Some(key);
        }
        if let Some(url) = get("HF_API_BASE_URL") {
            self.inference.base_url = url;
        }
        if let Some(model) = get("HF_MODEL_LLM") {
            self.inference.text_model = model;
        }
        if let Some(model) = get("HF_MODEL_ASR") {
            self.inference.speech_model = model;
        }

        if let Some(mode) = get("RELAY_MODE") {
            self.relay.mode = mode.parse()?;
        }

        // Blank values from the file are treated like missing ones.
        self.telegram.bot_token = non_empty(self.telegram.bot_token.take());
        self.inference.api_key = non_empty(self.inference.api_key.take());

        Ok(())
    }

    /// Human-readable warnings for credentials that are not configured.
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.telegram.bot_token.is_none() {
            missing.push("TELEGRAM_TOKEN");
        }
        if self.relay.mode == RelayMode::Inference && self.inference.api_key.is_none() {
            missing.push("HF_TOKEN");
        }
        missing
    }
}
