use crate::llm::ollama::{OllamaConfig, DEFAULT_OLLAMA_HOST};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

/// Environment variable that overrides [`Settings::ollama_host`].
pub const OLLAMA_HOST_ENV: &str = "OLLAMA_HOST";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub ollama_host: String,
    /// Initial model selection for new sessions.
    #[serde(alias = "selected_model")]
    pub default_model: Option<String>,
    pub user_preferences: UserPreferences,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub list_timeout_secs: u64,
}

/// Front-end preferences. Stored here so they live in the same file; the
/// core never reads them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct UserPreferences {
    pub theme: String,
    pub font_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        let ollama = OllamaConfig::default();
        Self {
            ollama_host: DEFAULT_OLLAMA_HOST.to_string(),
            default_model: None,
            user_preferences: UserPreferences::default(),
            connect_timeout_secs: ollama.connect_timeout.as_secs(),
            read_timeout_secs: ollama.read_timeout.as_secs(),
            list_timeout_secs: ollama.list_timeout.as_secs(),
        }
    }
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            font_size: 12,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode settings: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unknown setting key: {0}")]
    UnknownKey(String),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Keys accepted by [`Settings::set`].
pub const SETTING_KEYS: &[&str] = &["ollama_host", "default_model", "theme", "font_size"];

impl Settings {
    /// Load settings from a JSON file. A missing or malformed file yields
    /// the defaults; other I/O failures are reported.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str(&raw) {
            Ok(settings) => Ok(settings),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "malformed settings file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Apply `OLLAMA_HOST` from the environment, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(host) = std::env::var(OLLAMA_HOST_ENV) {
            self.apply_host_override(&host);
        }
        self
    }

    fn apply_host_override(&mut self, host: &str) {
        let host = host.trim();
        if host.is_empty() {
            return;
        }
        // Ollama accepts a bare `host:port` here.
        self.ollama_host = if host.contains("://") {
            host.to_string()
        } else {
            format!("http://{host}")
        };
    }

    /// Update one setting by key, as a settings form would.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), SettingsError> {
        match key {
            "ollama_host" => self.apply_host_override(value),
            "default_model" => {
                let value = value.trim();
                self.default_model = (!value.is_empty()).then(|| value.to_string());
            }
            "theme" => self.user_preferences.theme = value.to_string(),
            "font_size" => {
                let size = value.trim().parse::<u32>().map_err(|e| SettingsError::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                })?;
                self.user_preferences.font_size = size;
            }
            other => return Err(SettingsError::UnknownKey(other.to_string())),
        }
        Ok(())
    }

    pub fn ollama(&self) -> OllamaConfig {
        OllamaConfig {
            base_url: self.ollama_host.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            list_timeout: Duration::from_secs(self.list_timeout_secs),
        }
    }
}
