//! Persisted config (service URLs, models, retrieval knobs) in the app data directory,
//! plus credentials read from the environment. Credentials are never written to disk.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::app_data;
use crate::chunks::DEFAULT_MAX_CHARS;

const CONFIG_FILENAME: &str = "config.toml";

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBED_MODEL: &str = "nomic-embed-text";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "llama-3.1-70b-versatile";
pub const DEFAULT_OLLAMA_CHAT_MODEL: &str = "llama3.1";
/// Number of nearest chunks fed to the model per question.
pub const DEFAULT_TOP_K: usize = 3;

/// Environment variables holding the completion API key, in lookup order.
pub const API_KEY_VARS: &[&str] = &["REPOCHAT_API_KEY", "GROQ_API_KEY"];

/// Which service answers questions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionBackend {
    /// OpenAI-compatible `/chat/completions` endpoint (Groq by default). Needs an API key.
    #[default]
    Openai,
    /// Local Ollama chat.
    Ollama,
}

impl std::str::FromStr for CompletionBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "ollama" => Ok(Self::Ollama),
            _ => Err(ConfigError::InvalidValue {
                key: "completion_backend".into(),
                value: s.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ollama_url: String,
    /// Embedding model; pinned per namespace at ingestion time.
    pub embed_model: String,
    pub completion_backend: CompletionBackend,
    pub completion_base_url: String,
    /// Completion model id. Falls back to a per-backend default when unset.
    pub completion_model: Option<String>,
    pub max_chunk_chars: usize,
    pub top_k: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.into(),
            embed_model: DEFAULT_EMBED_MODEL.into(),
            completion_backend: CompletionBackend::default(),
            completion_base_url: DEFAULT_OPENAI_BASE_URL.into(),
            completion_model: None,
            max_chunk_chars: DEFAULT_MAX_CHARS,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl Config {
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Set one field by its config-file key.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let invalid = || ConfigError::InvalidValue {
            key: key.into(),
            value: value.into(),
        };
        match key {
            "ollama_url" => self.ollama_url = value.into(),
            "embed_model" => self.embed_model = value.into(),
            "completion_backend" => self.completion_backend = value.parse()?,
            "completion_base_url" => self.completion_base_url = value.trim_end_matches('/').into(),
            "completion_model" => {
                self.completion_model = Some(value.to_string()).filter(|s| !s.is_empty())
            }
            "max_chunk_chars" => {
                self.max_chunk_chars = value.parse().ok().filter(|n| *n > 0).ok_or_else(invalid)?
            }
            "top_k" => self.top_k = value.parse().ok().filter(|n| *n > 0).ok_or_else(invalid)?,
            _ => return Err(ConfigError::UnknownKey(key.into())),
        }
        Ok(())
    }
}

/// Load config from the app data directory. Returns default config if missing or invalid.
pub fn load_config() -> Config {
    let Some(data_dir) = app_data::app_data_dir() else {
        return Config::default();
    };
    let path = data_dir.join(CONFIG_FILENAME);
    let Ok(s) = std::fs::read_to_string(&path) else {
        return Config::default();
    };
    toml::from_str(&s).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "invalid config, using defaults");
        Config::default()
    })
}

/// Save config to the app data directory.
pub fn save_config(config: &Config) -> Result<(), ConfigError> {
    let data_dir = app_data::app_data_dir().ok_or(ConfigError::NoDataDir)?;
    let path = data_dir.join(CONFIG_FILENAME);
    let s = config.to_toml()?;
    std::fs::write(&path, s).map_err(ConfigError::Write)
}

/// Config plus everything taken from the environment. Loaded once at start-up.
#[derive(Clone)]
pub struct Settings {
    pub config: Config,
    api_key: Option<String>,
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("config", &self.config)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Settings {
    /// Reads credentials and overrides from the process environment.
    pub fn from_env(config: Config) -> Self {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Like [`Settings::from_env`], with a custom variable lookup.
    pub fn from_lookup(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        if let Some(url) = get("REPOCHAT_OLLAMA_URL") {
            config.ollama_url = url;
        }
        if let Some(model) = get("REPOCHAT_EMBED_MODEL") {
            config.embed_model = model;
        }
        if let Some(model) = get("REPOCHAT_MODEL") {
            config.completion_model = Some(model);
        }
        let api_key = API_KEY_VARS.iter().find_map(|name| get(name));
        Self { config, api_key }
    }

    /// Fails with the first required credential that is missing.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        match self.config.completion_backend {
            CompletionBackend::Openai if self.api_key.is_none() => {
                Err(ConfigError::MissingCredential(API_KEY_VARS[0]))
            }
            _ => Ok(()),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Completion model id, or the default for the configured backend.
    pub fn completion_model(&self) -> &str {
        match (&self.config.completion_model, self.config.completion_backend) {
            (Some(model), _) => model,
            (None, CompletionBackend::Openai) => DEFAULT_OPENAI_MODEL,
            (None, CompletionBackend::Ollama) => DEFAULT_OLLAMA_CHAT_MODEL,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine app data directory")]
    NoDataDir,
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("failed to write config: {0}")]
    Write(std::io::Error),
    #[error("missing credential: set {0} (or GROQ_API_KEY) in the environment or .env")]
    MissingCredential(&'static str),
    #[error("unknown config key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}
