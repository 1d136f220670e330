//! User configuration
//!
//! Loaded from `~/.deskbot/config.toml`. Every field has a default so an
//! absent or partial file is fine.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskConfig {
    pub ai: AiSettings,
    pub rate: RateSettings,
    pub guard: GuardSettings,
    pub desk: DeskSettings,
}

/// Provider call settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub model: String,
    pub base_url: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub timeout_ms: u64,
    pub history_cap: usize,
    /// Declare the search-grounding tool in every request
    pub grounding: bool,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            model: constants::ai::DEFAULT_MODEL.to_string(),
            base_url: constants::ai::DEFAULT_BASE_URL.to_string(),
            temperature: constants::ai::DEFAULT_TEMPERATURE,
            max_output_tokens: constants::ai::MAX_OUTPUT_TOKENS,
            timeout_ms: constants::ai::REQUEST_TIMEOUT_MS,
            history_cap: constants::ai::HISTORY_CAP,
            grounding: true,
        }
    }
}

/// Call budget shared by all instances using the same store
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateSettings {
    pub max_calls: usize,
    pub window_ms: i64,
}

impl Default for RateSettings {
    fn default() -> Self {
        Self {
            max_calls: constants::rate::MAX_CALLS,
            window_ms: constants::rate::WINDOW_MS,
        }
    }
}

/// Prompt guard limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    pub max_user_message: usize,
    pub max_document: usize,
    pub max_context: usize,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            max_user_message: constants::guard::MAX_USER_MESSAGE,
            max_document: constants::guard::MAX_DOCUMENT,
            max_context: constants::guard::MAX_CONTEXT,
        }
    }
}

/// Facade-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeskSettings {
    /// Prefix for every persisted key; separate namespaces never share state
    pub namespace: String,
    pub system_prompt: String,
    pub search_limit: usize,
    /// Screen retrieved documents one by one instead of as a single block
    pub screen_each_document: bool,
    /// Minimum strength points a new key must reach (0-3)
    pub min_key_strength: u8,
    /// PBKDF2 rounds for the credential key; values below the floor are raised
    pub kdf_iterations: u32,
}

impl Default for DeskSettings {
    fn default() -> Self {
        Self {
            namespace: constants::app::DEFAULT_NAMESPACE.to_string(),
            system_prompt: constants::ai::DEFAULT_SYSTEM_PROMPT.to_string(),
            search_limit: constants::guard::SEARCH_LIMIT,
            screen_each_document: true,
            min_key_strength: 1,
            kdf_iterations: constants::vault::PBKDF2_ITERATIONS,
        }
    }
}

impl DeskConfig {
    /// Load from the default location, applying environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::load_from_path(&crate::paths::config_file())?;
        config.apply_env();
        Ok(config)
    }

    /// Load from a specific path; a missing file yields defaults
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Write to a specific path, creating parent directories
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("DESKBOT_MODEL") {
            if !model.trim().is_empty() {
                tracing::info!(model = %model, "Model overridden from DESKBOT_MODEL");
                self.ai.model = model;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DeskConfig::load_from_path(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.ai.history_cap, 16);
        assert_eq!(config.ai.timeout_ms, 30_000);
        assert_eq!(config.desk.namespace, "deskbot");
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[rate]\nmax_calls = 3\n\n[ai]\nmodel = \"gemini-pro\"\n").unwrap();

        let config = DeskConfig::load_from_path(&path).unwrap();
        assert_eq!(config.rate.max_calls, 3);
        assert_eq!(config.rate.window_ms, 60_000);
        assert_eq!(config.ai.model, "gemini-pro");
        assert_eq!(config.ai.max_output_tokens, 1024);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = DeskConfig::default();
        config.guard.max_context = 1234;
        config.save_to_path(&path).unwrap();

        let loaded = DeskConfig::load_from_path(&path).unwrap();
        assert_eq!(loaded.guard.max_context, 1234);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ai\nmodel=").unwrap();
        assert!(matches!(
            DeskConfig::load_from_path(&path),
            Err(ConfigError::Parse(_))
        ));
    }
}
