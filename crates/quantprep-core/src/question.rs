//! Question content and per-slot state.

use serde::{Deserialize, Serialize};

/// Structured question content, possibly incomplete while streaming.
///
/// Every field is independently optional. The section parser always fills all
/// five (with empty strings for missing sections); `None` only appears on
/// slots that have not received any chunk yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialQuestion {
    /// Short title of the question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Problem statement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
    /// A hint that does not give the answer away.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Full worked solution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    /// One-sentence key takeaway.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_takeaway: Option<String>,
}

impl PartialQuestion {
    /// Overwrites every field that is present in `update`.
    ///
    /// Fields absent from `update` keep their current value.
    pub fn merge(&mut self, update: Self) {
        if update.title.is_some() {
            self.title = update.title;
        }
        if update.question_text.is_some() {
            self.question_text = update.question_text;
        }
        if update.hint.is_some() {
            self.hint = update.hint;
        }
        if update.solution.is_some() {
            self.solution = update.solution;
        }
        if update.key_takeaway.is_some() {
            self.key_takeaway = update.key_takeaway;
        }
    }

    /// Returns `true` if the title is present and non-empty.
    #[must_use]
    pub fn has_title(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns `true` once there is something to show as a question: a title
    /// or a problem statement.
    #[must_use]
    pub fn has_question(&self) -> bool {
        self.has_title()
            || self
                .question_text
                .as_deref()
                .is_some_and(|t| !t.is_empty())
    }
}

/// Settlement state of a single slot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SlotStatus {
    /// The slot's fetch has not settled yet.
    #[default]
    Pending,
    /// The stream completed.
    Succeeded,
    /// The fetch failed; the slot keeps whatever was parsed before the failure.
    Failed(String),
}

impl SlotStatus {
    /// Returns `true` while the slot is still streaming.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Returns `true` if the slot's fetch failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// One position in a batch: the content streamed so far and its status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    /// Content parsed so far.
    pub data: PartialQuestion,
    /// Settlement state.
    pub status: SlotStatus,
}

impl Slot {
    /// Returns `true` while the slot is still streaming.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.status.is_pending()
    }
}
