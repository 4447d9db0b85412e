//! Markdown rendering of question cards.
//!
//! A card shows the title and problem statement, a toggle line for the hint
//! and the solution, and the expanded sections selected by a [`Reveal`].
//! Slots that are still streaming render placeholders in place of the
//! sections that have not arrived yet.
//!
//! # Example
//!
//! ```rust
//! use quantprep_core::{Batch, BatchMode, GenerationRequest, Language};
//! use quantprep_render::MarkdownGenerator;
//!
//! let batch = Batch::new(1, BatchMode::Foreground, GenerationRequest::default(), 2);
//! let markdown = MarkdownGenerator::new(Language::English).batch(&batch, &[]);
//! assert!(markdown.contains("#### Problem 2"));
//! assert!(markdown.contains("_Generating problem..._"));
//! ```

use std::fmt::Write;

use quantprep_core::{
    Batch, BufferPhase, Language, PartialQuestion, SessionSnapshot, Slot, SlotStatus,
};

use crate::{Labels, Reveal};

/// Separator written between cards.
const CARD_SEPARATOR: &str = "\n---\n\n";

/// Generates localized Markdown for slots, batches and whole sessions.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownGenerator {
    labels: &'static Labels,
}

impl MarkdownGenerator {
    /// Creates a generator that labels cards in `language`.
    #[must_use]
    pub const fn new(language: Language) -> Self {
        Self {
            labels: Labels::for_language(language),
        }
    }

    /// The label set in use.
    #[must_use]
    pub const fn labels(&self) -> &'static Labels {
        self.labels
    }

    /// Renders one slot as a card numbered `number` (1-based).
    #[must_use]
    pub fn card(&self, number: usize, slot: &Slot, reveal: Reveal) -> String {
        let labels = self.labels;
        let data = &slot.data;
        let streaming = slot.is_loading();
        let mut output = String::new();

        if streaming && !data.has_title() {
            let _ = writeln!(output, "#### {} {number}\n", labels.problem);
            let _ = writeln!(output, "_{}_", labels.loading);
            return output;
        }

        let title = non_empty(data.title.as_deref()).unwrap_or("...");
        let _ = writeln!(output, "#### {} {number}: {title}\n", labels.problem);

        match non_empty(data.question_text.as_deref()) {
            Some(text) => {
                let _ = writeln!(output, "{text}\n");
            }
            None => {
                let _ = writeln!(output, "_..._\n");
            }
        }

        if let SlotStatus::Failed(reason) = &slot.status {
            let _ = writeln!(output, "_{}: {reason}_\n", labels.failed);
        }

        let _ = writeln!(
            output,
            "{} {}",
            self.hint_toggle(data, streaming, reveal.hint),
            self.solution_toggle(data, streaming, reveal.solution)
        );

        if reveal.hint {
            if let Some(hint) = non_empty(data.hint.as_deref()) {
                let _ = writeln!(output, "\n**{}**\n\n{hint}", labels.hint_title);
            }
        }

        if reveal.solution {
            if let Some(solution) = non_empty(data.solution.as_deref()) {
                let _ = writeln!(output, "\n**{}**\n\n{solution}", labels.solution_title);
                if let Some(takeaway) = non_empty(data.key_takeaway.as_deref()) {
                    let _ = writeln!(
                        output,
                        "\n**{}**\n\n_{takeaway}_",
                        labels.takeaway_title
                    );
                }
            }
        }

        output
    }

    /// Renders every slot of `batch`.
    ///
    /// `reveals[i]` applies to slot `i`; missing entries render collapsed.
    #[must_use]
    pub fn batch(&self, batch: &Batch, reveals: &[Reveal]) -> String {
        batch
            .slots
            .iter()
            .enumerate()
            .map(|(index, slot)| {
                let reveal = reveals.get(index).copied().unwrap_or_default();
                self.card(index + 1, slot, reveal)
            })
            .collect::<Vec<_>>()
            .join(CARD_SEPARATOR)
    }

    /// Renders the active set of a session, with the error banner, the
    /// empty-state placeholder and the action line.
    #[must_use]
    pub fn session(&self, snapshot: &SessionSnapshot, reveals: &[Reveal]) -> String {
        let labels = self.labels;
        let mut output = String::new();

        if let Some(error) = &snapshot.last_error {
            let _ = writeln!(output, "> {error}\n");
        }

        let has_questions = snapshot
            .active
            .slots
            .iter()
            .any(|slot| slot.data.has_question());
        if has_questions || snapshot.active_loading {
            output.push_str(&self.batch(&snapshot.active, reveals));
            let _ = writeln!(output);
        } else {
            let _ = writeln!(output, "### {}\n", labels.empty_title);
            let _ = writeln!(output, "{}\n", labels.empty_subtitle);
        }

        let _ = writeln!(output, "**[{}]**", self.action_label(snapshot));
        if snapshot.buffer_phase == BufferPhase::Loading {
            let _ = writeln!(output, "_{}_", labels.preloading);
        }

        output
    }

    /// The label of the "next" action in the current state.
    #[must_use]
    pub const fn action_label(&self, snapshot: &SessionSnapshot) -> &'static str {
        if snapshot.active_loading {
            self.labels.generating
        } else if snapshot.buffer_phase.is_ready() {
            self.labels.show_next
        } else {
            self.labels.generate
        }
    }

    fn hint_toggle(&self, data: &PartialQuestion, streaming: bool, revealed: bool) -> String {
        let labels = self.labels;
        toggle(
            non_empty(data.hint.as_deref()).is_some(),
            streaming,
            revealed,
            [labels.streaming_hint, labels.show_hint, labels.hide_hint],
        )
    }

    fn solution_toggle(&self, data: &PartialQuestion, streaming: bool, revealed: bool) -> String {
        let labels = self.labels;
        toggle(
            non_empty(data.solution.as_deref()).is_some(),
            streaming,
            revealed,
            [
                labels.streaming_solution,
                labels.show_solution,
                labels.hide_solution,
            ],
        )
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Formats a reveal toggle. Unavailable toggles are struck through.
///
/// `labels` is `[streaming, show, hide]`.
fn toggle(available: bool, streaming: bool, revealed: bool, labels: [&str; 3]) -> String {
    let [streaming_label, show, hide] = labels;
    match (available, streaming) {
        (false, true) => format!("[{streaming_label}]"),
        (false, false) => format!("~~{show}~~"),
        (true, _) if revealed => format!("[{hide}]"),
        (true, _) => format!("[{show}]"),
    }
}

/// Returns the trimmed text if it has any content.
fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}
