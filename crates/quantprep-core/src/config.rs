//! Configuration types for QuantPrep.
//!
//! Configuration is read from `quantprep.json` in the working directory. Every
//! key is optional; a missing file yields the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QuantError, Result};
use crate::request::{GenerationRequest, ModelTier};

/// The default config file name.
pub const CONFIG_FILE_NAME: &str = "quantprep.json";

/// Default number of questions per batch.
const fn default_batch_size() -> usize {
    6
}

/// Default base URL of the generation service.
fn default_api_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

/// Default environment variable holding the API key.
fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

/// Default connect timeout in seconds.
const fn default_connect_timeout_secs() -> u64 {
    10
}

/// Default capacity of the session event channel.
const fn default_event_capacity() -> usize {
    256
}

fn default_flash_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_pro_model() -> String {
    "gemini-3-pro-preview".to_string()
}

fn default_lite_model() -> String {
    "gemini-flash-lite-latest".to_string()
}

/// Main configuration for QuantPrep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Number of questions generated concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Base URL of the generation service API.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Connect timeout for the generation service in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Backend model ids per tier.
    #[serde(default)]
    pub models: ModelIds,

    /// Settings the session starts with.
    #[serde(default)]
    pub defaults: GenerationRequest,

    /// Capacity of the session event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            api_base_url: default_api_base_url(),
            api_key_env: default_api_key_env(),
            connect_timeout_secs: default_connect_timeout_secs(),
            models: ModelIds::default(),
            defaults: GenerationRequest::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `quantprep.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            QuantError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `quantprep.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns `QuantError::ConfigParseError` if the file cannot be read or
    /// contains invalid JSON or enum values, and
    /// `QuantError::ConfigValidationError` if a value is out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(QuantError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| QuantError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `QuantError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(QuantError::config_validation(
                "batchSize must be greater than 0",
                "Set batchSize to at least 1 in your quantprep.json",
            ));
        }

        if self.event_capacity == 0 {
            return Err(QuantError::config_validation(
                "eventCapacity must be greater than 0",
                "Set eventCapacity to at least 1 in your quantprep.json",
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(QuantError::config_validation(
                "connectTimeoutSecs must be greater than 0",
                "Set connectTimeoutSecs to at least 1 second in your quantprep.json",
            ));
        }

        let base = self.api_base_url.trim();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(QuantError::config_validation(
                format!("apiBaseUrl '{}' is not an http(s) URL", self.api_base_url),
                "Set apiBaseUrl to the generation service endpoint, e.g. https://generativelanguage.googleapis.com/v1beta",
            ));
        }

        if self.api_key_env.trim().is_empty() {
            return Err(QuantError::config_validation(
                "apiKeyEnv must not be empty",
                "Set apiKeyEnv to the name of the environment variable holding your API key",
            ));
        }

        for tier in ModelTier::ALL {
            if self.models.id_for(tier).trim().is_empty() {
                return Err(QuantError::config_validation(
                    format!("models.{} must not be empty", tier.key()),
                    "Provide a backend model id for every tier or remove the key to use the default",
                ));
            }
        }

        Ok(())
    }

    /// Reads the API key from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns `QuantError::MissingApiKey` if the variable is unset or blank.
    pub fn resolve_api_key(&self) -> Result<String> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(QuantError::missing_api_key(&self.api_key_env)),
        }
    }
}

/// Backend model ids for each [`ModelTier`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelIds {
    /// Model id used for [`ModelTier::Flash`].
    #[serde(default = "default_flash_model")]
    pub flash: String,

    /// Model id used for [`ModelTier::Pro`].
    #[serde(default = "default_pro_model")]
    pub pro: String,

    /// Model id used for [`ModelTier::Lite`].
    #[serde(default = "default_lite_model")]
    pub lite: String,
}

impl Default for ModelIds {
    fn default() -> Self {
        Self {
            flash: default_flash_model(),
            pro: default_pro_model(),
            lite: default_lite_model(),
        }
    }
}

impl ModelIds {
    /// Returns the backend model id for a tier.
    #[must_use]
    pub fn id_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Flash => &self.flash,
            ModelTier::Pro => &self.pro,
            ModelTier::Lite => &self.lite,
        }
    }
}
