use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{NudgeError, Result};

/// Environment variable carrying the messaging transport secret.
pub const BOT_TOKEN_ENV: &str = "NUDGE_BOT_TOKEN";

/// Top-level configuration for the Nudge application.
///
/// Loaded from `~/.nudge/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern. The transport token is
/// deliberately not part of the file; it comes from the environment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    pub general: GeneralConfig,
    pub transcribe: TranscribeConfig,
    pub scheduler: SchedulerConfig,
    pub transport: TransportConfig,
}

impl NudgeConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NudgeConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// Read the transport secret from the environment.
///
/// Absence is a fatal startup error; nothing else in the system is allowed
/// to run without it.
pub fn bot_token_from_env() -> Result<String> {
    match std::env::var(BOT_TOKEN_ENV) {
        Ok(token) if !token.trim().is_empty() => Ok(token),
        _ => Err(NudgeError::Config(format!(
            "{BOT_TOKEN_ENV} is not set; the messaging transport cannot start"
        ))),
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory for the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.nudge/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Speech-to-text configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    /// Language hint passed to the transcription service.
    pub language: String,
    /// Speech recognition endpoint.
    pub endpoint: String,
    /// Speech API key. Empty means recognition is not configured.
    pub api_key: String,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            language: "fa-IR".to_string(),
            endpoint: "http://www.google.com/speech-api/v2/recognize".to_string(),
            api_key: String::new(),
        }
    }
}

/// Delivery scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Delay before the first due-reminder scan, in seconds.
    pub first_tick_delay_secs: u64,
    /// Interval between due-reminder scans, in seconds.
    pub tick_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            first_tick_delay_secs: 10,
            tick_interval_secs: 60,
        }
    }
}

/// Messaging transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Base URL of the Bot API. Overridable for local test servers.
    pub api_base: String,
    /// Long-poll timeout for inbound updates, in seconds.
    pub poll_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.telegram.org".to_string(),
            poll_timeout_secs: 30,
        }
    }
}
