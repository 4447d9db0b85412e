//! QuantPrep rendering
//!
//! Turns question slots and batches into something a person can read.
//!
//! # Generators
//!
//! - [`MarkdownGenerator`] - Localized Markdown question cards, one per slot
//! - [`json::JsonGenerator`] - JSON export of a batch
//!
//! # Example
//!
//! ```rust
//! use quantprep_core::{Language, PartialQuestion, Slot, SlotStatus};
//! use quantprep_render::{MarkdownGenerator, Reveal};
//!
//! let slot = Slot {
//!     data: PartialQuestion {
//!         title: Some("Two Dice".to_string()),
//!         question_text: Some("What is $P(\\text{sum} = 7)$?".to_string()),
//!         hint: Some("Count the pairs.".to_string()),
//!         solution: Some("$6/36 = 1/6$".to_string()),
//!         key_takeaway: Some("Enumerate small spaces.".to_string()),
//!     },
//!     status: SlotStatus::Succeeded,
//! };
//!
//! let card = MarkdownGenerator::new(Language::English).card(1, &slot, Reveal::default());
//! assert!(card.contains("#### Problem 1: Two Dice"));
//! assert!(card.contains("[Show Hint]"));
//! ```

use quantprep_core::Language;
use thiserror::Error;

pub mod json;
pub mod markdown;

pub use markdown::MarkdownGenerator;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while rendering.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Failed to serialize to JSON.
    #[error("failed to serialize batch: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to write rendered output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for render operations.
pub type Result<T> = std::result::Result<T, RenderError>;

// ============================================================================
// Reveal State
// ============================================================================

/// Which collapsible sections of a card are expanded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Reveal {
    /// Hint section expanded.
    pub hint: bool,
    /// Solution (and takeaway) section expanded.
    pub solution: bool,
}

impl Reveal {
    /// Everything expanded.
    pub const ALL: Self = Self {
        hint: true,
        solution: true,
    };

    /// Flips the hint toggle.
    pub fn toggle_hint(&mut self) {
        self.hint = !self.hint;
    }

    /// Flips the solution toggle.
    pub fn toggle_solution(&mut self) {
        self.solution = !self.solution;
    }
}

// ============================================================================
// Labels
// ============================================================================

/// User-facing strings for one display language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Labels {
    /// Placeholder while a slot has no title yet.
    pub loading: &'static str,
    /// Card heading prefix.
    pub problem: &'static str,
    /// Hint toggle, collapsed.
    pub show_hint: &'static str,
    /// Hint toggle, expanded.
    pub hide_hint: &'static str,
    /// Solution toggle, collapsed.
    pub show_solution: &'static str,
    /// Solution toggle, expanded.
    pub hide_solution: &'static str,
    /// Hint section heading.
    pub hint_title: &'static str,
    /// Solution section heading.
    pub solution_title: &'static str,
    /// Takeaway heading inside the solution.
    pub takeaway_title: &'static str,
    /// Prefix of the line shown on a card whose stream failed.
    pub failed: &'static str,
    /// Hint toggle while the slot streams without a hint.
    pub streaming_hint: &'static str,
    /// Solution toggle while the slot streams without a solution.
    pub streaming_solution: &'static str,
    /// Shown while the next set loads in the background.
    pub preloading: &'static str,
    /// Action label when the next set is ready to swap in.
    pub show_next: &'static str,
    /// Action label when nothing is buffered.
    pub generate: &'static str,
    /// Action label while the active set streams.
    pub generating: &'static str,
    /// Heading of the empty session.
    pub empty_title: &'static str,
    /// Subtitle of the empty session.
    pub empty_subtitle: &'static str,
}

impl Labels {
    /// English labels.
    pub const ENGLISH: Self = Self {
        loading: "Generating problem...",
        problem: "Problem",
        show_hint: "Show Hint",
        hide_hint: "Hide Hint",
        show_solution: "Reveal Solution",
        hide_solution: "Hide Solution",
        hint_title: "Hint",
        solution_title: "Solution",
        takeaway_title: "Key Takeaway",
        failed: "Generation failed",
        streaming_hint: "Generating hint...",
        streaming_solution: "Deriving solution...",
        preloading: "Pre-loading next set...",
        show_next: "Show Next Set (Ready)",
        generate: "Generate Questions",
        generating: "Generating...",
        empty_title: "Ready to practice?",
        empty_subtitle: "Select your preferences and click generate",
    };

    /// Simplified Chinese labels.
    pub const CHINESE: Self = Self {
        loading: "正在生成题目...",
        problem: "问题",
        show_hint: "显示提示",
        hide_hint: "隐藏提示",
        show_solution: "显示解答",
        hide_solution: "隐藏解答",
        hint_title: "提示",
        solution_title: "解答",
        takeaway_title: "核心要点",
        failed: "生成失败",
        streaming_hint: "正在生成提示...",
        streaming_solution: "正在推导解答...",
        preloading: "后台正在预加载下一组...",
        show_next: "显示下一组 (已就绪)",
        generate: "生成题目",
        generating: "生成中...",
        empty_title: "准备好开始练习了吗？",
        empty_subtitle: "选择你的偏好并点击生成",
    };

    /// Returns the label set for `language`.
    #[must_use]
    pub const fn for_language(language: Language) -> &'static Self {
        match language {
            Language::English => &Self::ENGLISH,
            Language::Chinese => &Self::CHINESE,
        }
    }
}
