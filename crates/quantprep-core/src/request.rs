//! Generation settings.
//!
//! A [`GenerationRequest`] is the immutable tuple of settings a batch is built
//! against. The orchestrator keeps one "live" request and hands a clone of it
//! to every batch at the moment that batch starts.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuantError, Result};

/// Lowercases and maps spaces and hyphens to underscores so that
/// "Brain Teasers", "brain-teasers" and "BRAIN_TEASERS" compare equal.
fn normalize(s: &str) -> String {
    s.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

/// Implements case-insensitive parsing and snake_case serialization for a
/// settings enum with `ALL`, `key()` and `label()`.
macro_rules! settings_enum_serde {
    ($ty:ident, $setting:literal) => {
        impl $ty {
            /// Parses a value case-insensitively from its label or key.
            pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
                let wanted = normalize(s);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.key() == wanted || normalize(v.label()) == wanted)
            }

            /// Comma-separated list of accepted keys, for error messages.
            #[must_use]
            pub fn expected() -> String {
                Self::ALL
                    .iter()
                    .map(|v| v.key())
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl std::str::FromStr for $ty {
            type Err = QuantError;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_str_case_insensitive(s)
                    .ok_or_else(|| QuantError::invalid_setting($setting, s, Self::expected()))
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                Self::from_str_case_insensitive(&s).ok_or_else(|| {
                    serde::de::Error::custom(format!(
                        "invalid {} '{s}': expected one of {}",
                        $setting,
                        Self::expected()
                    ))
                })
            }
        }

        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.key())
            }
        }
    };
}

// ============================================================================
// Topic
// ============================================================================

/// Preset question topics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Probability puzzles (default).
    #[default]
    Probability,
    /// Statistics and inference.
    Statistics,
    /// Logic and estimation brain teasers.
    BrainTeasers,
    /// Stochastic calculus.
    StochasticCalculus,
    /// Linear algebra.
    LinearAlgebra,
}

impl Topic {
    /// All topics in display order.
    pub const ALL: [Self; 5] = [
        Self::Probability,
        Self::Statistics,
        Self::BrainTeasers,
        Self::StochasticCalculus,
        Self::LinearAlgebra,
    ];

    /// Human-readable name, as embedded in the prompt.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Probability => "Probability",
            Self::Statistics => "Statistics",
            Self::BrainTeasers => "Brain Teasers",
            Self::StochasticCalculus => "Stochastic Calculus",
            Self::LinearAlgebra => "Linear Algebra",
        }
    }

    /// Serialized snake_case key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Probability => "probability",
            Self::Statistics => "statistics",
            Self::BrainTeasers => "brain_teasers",
            Self::StochasticCalculus => "stochastic_calculus",
            Self::LinearAlgebra => "linear_algebra",
        }
    }
}

settings_enum_serde!(Topic, "topic");

// ============================================================================
// Difficulty
// ============================================================================

/// Question difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Difficulty {
    /// Warm-up level.
    Easy,
    /// Typical first-round interview level (default).
    #[default]
    Medium,
    /// Final-round level.
    Hard,
    /// Beyond most interviews.
    SuperHard,
}

impl Difficulty {
    /// All difficulties in ascending order.
    pub const ALL: [Self; 4] = [Self::Easy, Self::Medium, Self::Hard, Self::SuperHard];

    /// Human-readable name, as embedded in the prompt.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Easy => "Easy",
            Self::Medium => "Medium",
            Self::Hard => "Hard",
            Self::SuperHard => "Super Hard",
        }
    }

    /// Serialized snake_case key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
            Self::SuperHard => "super_hard",
        }
    }
}

settings_enum_serde!(Difficulty, "difficulty");

// ============================================================================
// Language
// ============================================================================

/// Language used both for the generated content and for UI labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Language {
    /// English (default).
    #[default]
    English,
    /// Simplified Chinese.
    Chinese,
}

impl Language {
    /// All supported languages.
    pub const ALL: [Self; 2] = [Self::English, Self::Chinese];

    /// Human-readable name, as embedded in the prompt.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Chinese => "Chinese",
        }
    }

    /// Serialized snake_case key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::English => "english",
            Self::Chinese => "chinese",
        }
    }
}

settings_enum_serde!(Language, "language");

// ============================================================================
// ModelTier
// ============================================================================

/// Logical model tier. The concrete backend model id comes from
/// [`crate::config::ModelIds`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// Fast, balanced model (default).
    #[default]
    Flash,
    /// High-quality model.
    Pro,
    /// Ultra-fast, low-cost model.
    Lite,
}

impl ModelTier {
    /// All tiers.
    pub const ALL: [Self; 3] = [Self::Flash, Self::Pro, Self::Lite];

    /// Human-readable name.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Flash => "Flash",
            Self::Pro => "Pro",
            Self::Lite => "Lite",
        }
    }

    /// Serialized snake_case key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Flash => "flash",
            Self::Pro => "pro",
            Self::Lite => "lite",
        }
    }
}

settings_enum_serde!(ModelTier, "model");

// ============================================================================
// GenerationRequest
// ============================================================================

/// The settings tuple a batch is generated against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerationRequest {
    /// Preset topic.
    pub topic: Topic,
    /// Free-text topic; overrides `topic` when non-blank.
    pub custom_topic: String,
    /// Difficulty level.
    pub difficulty: Difficulty,
    /// Content language.
    pub language: Language,
    /// Model tier.
    pub model: ModelTier,
}

impl GenerationRequest {
    /// Returns the topic text to put in the prompt: the custom topic when it is
    /// non-blank, otherwise the preset topic's label.
    ///
    /// # Examples
    ///
    /// ```
    /// use quantprep_core::{GenerationRequest, Topic};
    ///
    /// let mut request = GenerationRequest::default();
    /// assert_eq!(request.effective_topic(), "Probability");
    ///
    /// request.custom_topic = "Markov Chains".to_string();
    /// assert_eq!(request.effective_topic(), "Markov Chains");
    ///
    /// request.custom_topic = "   ".to_string();
    /// request.topic = Topic::LinearAlgebra;
    /// assert_eq!(request.effective_topic(), "Linear Algebra");
    /// ```
    #[must_use]
    pub fn effective_topic(&self) -> &str {
        if self.custom_topic.trim().is_empty() {
            self.topic.label()
        } else {
            &self.custom_topic
        }
    }
}

// ============================================================================
// SettingsPatch
// ============================================================================

/// A partial update to the live [`GenerationRequest`].
///
/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    /// New preset topic.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<Topic>,
    /// New custom topic (empty string clears it).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_topic: Option<String>,
    /// New difficulty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    /// New language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<Language>,
    /// New model tier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelTier>,
}

impl SettingsPatch {
    /// Builds a single-field patch from a `key value` pair as typed at the
    /// terminal, e.g. `difficulty hard` or `custom_topic Markov Chains`.
    pub fn from_key_value(key: &str, value: &str) -> Result<Self> {
        let mut patch = Self::default();
        match normalize(key).as_str() {
            "topic" => patch.topic = Some(value.parse()?),
            "custom_topic" | "customtopic" | "custom" => {
                patch.custom_topic = Some(value.trim().to_string());
            }
            "difficulty" => patch.difficulty = Some(value.parse()?),
            "language" | "lang" => patch.language = Some(value.parse()?),
            "model" => patch.model = Some(value.parse()?),
            _ => {
                return Err(QuantError::invalid_setting(
                    "setting",
                    key,
                    "topic, custom_topic, difficulty, language, model",
                ))
            }
        }
        Ok(patch)
    }

    /// Returns `true` if the patch sets no field.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.topic.is_none()
            && self.custom_topic.is_none()
            && self.difficulty.is_none()
            && self.language.is_none()
            && self.model.is_none()
    }

    /// Applies the patch and returns the resulting request.
    ///
    /// Picking a preset topic without a custom topic clears the custom one, so
    /// the preset takes effect.
    #[must_use]
    pub fn applied_to(&self, current: &GenerationRequest) -> GenerationRequest {
        let custom_topic = match (&self.custom_topic, self.topic) {
            (Some(custom), _) => custom.clone(),
            (None, Some(_)) => String::new(),
            (None, None) => current.custom_topic.clone(),
        };

        GenerationRequest {
            topic: self.topic.unwrap_or(current.topic),
            custom_topic,
            difficulty: self.difficulty.unwrap_or(current.difficulty),
            language: self.language.unwrap_or(current.language),
            model: self.model.unwrap_or(current.model),
        }
    }
}
