//! Error types for QuantPrep.
//!
//! This module defines the error hierarchy for configuration loading, the
//! generation service boundary, stream decoding, and orchestrator requests.
//! Per-slot fetch failures never surface from the orchestrator as errors; they
//! are recorded in the slot's status.

use std::path::PathBuf;

/// A specialized `Result` type for QuantPrep operations.
pub type Result<T> = std::result::Result<T, QuantError>;

/// Errors that can occur while generating questions.
///
/// Variants carry an actionable suggestion where the user can do something
/// about the failure.
#[derive(Debug, thiserror::Error)]
pub enum QuantError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your quantprep.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The API key environment variable is unset or empty.
    #[error("API key not found in environment variable '{var}'\n\nSuggestion: Export {var} or point apiKeyEnv in quantprep.json at the right variable")]
    MissingApiKey {
        /// Name of the environment variable that was consulted.
        var: String,
    },

    /// A settings value could not be parsed.
    #[error("Invalid value '{value}' for setting '{setting}'\n\nSuggestion: Use one of: {expected}")]
    InvalidSetting {
        /// Name of the setting (e.g. "difficulty").
        setting: String,
        /// The rejected value.
        value: String,
        /// Human-readable list of accepted values.
        expected: String,
    },

    // ========================================================================
    // Generation Service Errors
    // ========================================================================
    /// The generation service returned an error (authentication, rate limiting, etc.).
    #[error("LLM API error ({kind}): {message}\n\nSuggestion: {suggestion}")]
    LlmApiError {
        /// The kind of API error.
        kind: LlmErrorKind,
        /// Detailed error message from the API.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// A streamed event could not be decoded.
    #[error("Malformed stream event: {message}")]
    StreamDecode {
        /// Description of the decoding failure.
        message: String,
    },

    // ========================================================================
    // Orchestrator Errors
    // ========================================================================
    /// `generate` was requested while the active batch is still streaming.
    #[error("A question batch is still generating ({pending} of {total} slots pending)\n\nSuggestion: Wait for the current batch to finish")]
    GenerationInFlight {
        /// Number of active slots still pending.
        pending: usize,
        /// Total number of active slots.
        total: usize,
    },

    /// A batch task ended abnormally (panicked or was cancelled).
    #[error("Batch task failed: {message}")]
    TaskFailed {
        /// Description from the task runtime.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of generation service errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Authentication failure (invalid API key, expired credentials).
    Authentication,
    /// Rate limit exceeded.
    RateLimit,
    /// Server error (5xx responses).
    Server,
    /// Network connectivity issues.
    Network,
    /// Other unclassified errors.
    Other,
}

impl std::fmt::Display for LlmErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Server => "server",
            Self::Network => "network",
            Self::Other => "other",
        })
    }
}

impl LlmErrorKind {
    /// Returns a suggestion message for this error kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::Authentication => "Check your API key",
            Self::RateLimit => "Wait a moment before generating the next set",
            Self::Server => "Retry later; the generation service may be experiencing issues",
            Self::Network => "Check your network connection",
            Self::Other => "Check the generation service status page",
        }
    }

    /// Classifies an HTTP status code returned by the generation service.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }
}

impl From<reqwest::Error> for QuantError {
    fn from(err: reqwest::Error) -> Self {
        let kind = match err.status() {
            Some(status) => LlmErrorKind::from_status(status.as_u16()),
            None if err.is_connect() || err.is_timeout() || err.is_request() => {
                LlmErrorKind::Network
            }
            None => LlmErrorKind::Other,
        };
        Self::llm_api_error(kind, err.to_string())
    }
}

impl QuantError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `MissingApiKey` error.
    #[must_use]
    pub fn missing_api_key(var: impl Into<String>) -> Self {
        Self::MissingApiKey { var: var.into() }
    }

    /// Creates a new `InvalidSetting` error.
    #[must_use]
    pub fn invalid_setting(
        setting: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidSetting {
            setting: setting.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Creates a new `LlmApiError` with automatic suggestion based on error kind.
    #[must_use]
    pub fn llm_api_error(kind: LlmErrorKind, message: impl Into<String>) -> Self {
        let suggestion = kind.suggestion().to_string();
        Self::LlmApiError {
            kind,
            message: message.into(),
            suggestion,
        }
    }

    /// Creates a new `StreamDecode` error.
    #[must_use]
    pub fn stream_decode(message: impl Into<String>) -> Self {
        Self::StreamDecode {
            message: message.into(),
        }
    }

    /// Returns `true` if this error is transient and a later attempt may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::LlmApiError {
                kind: LlmErrorKind::RateLimit | LlmErrorKind::Server | LlmErrorKind::Network,
                ..
            } | Self::GenerationInFlight { .. }
        )
    }

    /// Returns `true` if this error prevents the session from starting at all.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::MissingApiKey { .. }
                | Self::LlmApiError {
                    kind: LlmErrorKind::Authentication,
                    ..
                }
        )
    }
}
