//! JSON export of question batches.
//!
//! [`JsonGenerator`] flattens a [`Batch`] into a [`BatchExport`]: the settings
//! it was generated with and one numbered entry per question, in slot order.
//!
//! # Example
//!
//! ```rust
//! use quantprep_core::{Batch, BatchMode, GenerationRequest};
//! use quantprep_render::json::JsonGenerator;
//!
//! let batch = Batch::new(7, BatchMode::Foreground, GenerationRequest::default(), 6);
//! let generator = JsonGenerator::new(&batch);
//!
//! let compact = generator.generate().unwrap();
//! assert!(compact.contains(r#""token":7"#));
//!
//! let pretty = generator.generate_pretty().unwrap();
//! assert!(pretty.contains('\n'));
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use quantprep_core::{
    Batch, BatchMode, Difficulty, Language, ModelTier, PartialQuestion, SlotStatus,
};
use serde::{Deserialize, Serialize};

use crate::{RenderError, Result};

/// Exported form of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchExport {
    /// Generation token of the batch.
    pub token: u64,
    /// Whether the batch was shown directly or prefetched.
    pub mode: BatchMode,
    /// Effective topic (the custom topic when one was set).
    pub topic: String,
    /// Difficulty level.
    pub difficulty: Difficulty,
    /// Output language.
    pub language: Language,
    /// Model tier.
    pub model: ModelTier,
    /// When the export was taken.
    pub exported_at: DateTime<Utc>,
    /// Questions in slot order.
    pub questions: Vec<QuestionExport>,
}

/// One exported question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionExport {
    /// 1-based position in the batch.
    pub number: usize,
    /// Settlement status at export time.
    pub status: SlotStatus,
    /// Parsed content.
    #[serde(flatten)]
    pub question: PartialQuestion,
}

impl BatchExport {
    /// Builds the export of `batch` stamped with `exported_at`.
    #[must_use]
    pub fn from_batch(batch: &Batch, exported_at: DateTime<Utc>) -> Self {
        let request = &batch.request;
        Self {
            token: batch.token,
            mode: batch.mode,
            topic: request.effective_topic().to_string(),
            difficulty: request.difficulty,
            language: request.language,
            model: request.model,
            exported_at,
            questions: batch
                .slots
                .iter()
                .enumerate()
                .map(|(index, slot)| QuestionExport {
                    number: index + 1,
                    status: slot.status.clone(),
                    question: slot.data.clone(),
                })
                .collect(),
        }
    }
}

/// JSON batch generator.
pub struct JsonGenerator<'a> {
    batch: &'a Batch,
}

impl<'a> JsonGenerator<'a> {
    /// Creates a new JSON generator for the given batch.
    #[must_use]
    pub const fn new(batch: &'a Batch) -> Self {
        Self { batch }
    }

    /// Builds the export, stamped now.
    #[must_use]
    pub fn export(&self) -> BatchExport {
        BatchExport::from_batch(self.batch, Utc::now())
    }

    /// Generates compact JSON (single line).
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Serialization`] if JSON serialization fails.
    pub fn generate(&self) -> Result<String> {
        serde_json::to_string(&self.export()).map_err(RenderError::from)
    }

    /// Generates pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Serialization`] if JSON serialization fails.
    pub fn generate_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.export()).map_err(RenderError::from)
    }

    /// Writes the export to `path`, creating or truncating the file.
    ///
    /// Parent directories must exist.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Serialization`] if JSON serialization fails.
    /// Returns [`RenderError::Io`] if file creation or writing fails.
    pub fn write_to_file(&self, path: &Path, pretty: bool) -> Result<()> {
        let json = if pretty {
            self.generate_pretty()?
        } else {
            self.generate()?
        };

        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;

        Ok(())
    }
}
