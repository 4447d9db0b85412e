//! Batch generation: N concurrent question streams with settle-all semantics.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::QuantError;
use crate::fetcher::StreamFetcher;
use crate::question::{PartialQuestion, Slot, SlotStatus};
use crate::request::GenerationRequest;

// ============================================================================
// BatchMode
// ============================================================================

/// Whether a batch fills the visible slots or the hidden prefetch buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Visible batch; each slot's loading flag clears as it settles.
    Foreground,
    /// Prefetch batch; only the aggregate flag matters until all slots settle.
    Background,
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Foreground => write!(f, "foreground"),
            Self::Background => write!(f, "background"),
        }
    }
}

// ============================================================================
// Batch
// ============================================================================

/// An ordered set of slots generated against one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    /// Generation token; updates carrying any other token are ignored.
    pub token: u64,
    /// Mode the batch was started in.
    pub mode: BatchMode,
    /// Settings captured when the batch started.
    pub request: GenerationRequest,
    /// One slot per question.
    pub slots: Vec<Slot>,
    /// When the batch started.
    pub started_at: DateTime<Utc>,
    /// When the last slot settled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    /// Creates a batch of `size` pending slots.
    ///
    /// # Examples
    ///
    /// ```
    /// use quantprep_core::{Batch, BatchMode, GenerationRequest};
    ///
    /// let batch = Batch::new(1, BatchMode::Foreground, GenerationRequest::default(), 6);
    /// assert_eq!(batch.slots.len(), 6);
    /// assert_eq!(batch.pending_count(), 6);
    /// assert!(!batch.is_settled());
    /// ```
    #[must_use]
    pub fn new(token: u64, mode: BatchMode, request: GenerationRequest, size: usize) -> Self {
        Self {
            token,
            mode,
            request,
            slots: vec![Slot::default(); size],
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Number of slots still streaming.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_loading()).count()
    }

    /// Returns `true` once every slot has settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.pending_count() == 0
    }

    /// Returns `true` if any slot has a non-empty title.
    #[must_use]
    pub fn has_any_title(&self) -> bool {
        self.slots.iter().any(|s| s.data.has_title())
    }

    /// Returns `true` if every slot settled as failed.
    #[must_use]
    pub fn all_failed(&self) -> bool {
        !self.slots.is_empty() && self.slots.iter().all(|s| s.status.is_failed())
    }

    /// Merges a partial update into a pending slot.
    ///
    /// Returns `false` if the slot does not exist or has already settled.
    pub fn apply_partial(&mut self, slot: usize, data: PartialQuestion) -> bool {
        match self.slots.get_mut(slot) {
            Some(s) if s.is_loading() => {
                s.data.merge(data);
                true
            }
            _ => false,
        }
    }

    /// Settles a pending slot. Stamps `completed_at` when it is the last one.
    ///
    /// Returns `false` if the slot does not exist or has already settled.
    pub fn settle(&mut self, slot: usize, status: SlotStatus) -> bool {
        let Some(s) = self.slots.get_mut(slot) else {
            return false;
        };
        if !s.is_loading() || status.is_pending() {
            return false;
        }
        s.status = status;
        if self.is_settled() {
            self.completed_at = Some(Utc::now());
        }
        true
    }
}

// ============================================================================
// BatchSink / BatchReport
// ============================================================================

/// Receives per-slot progress from [`BatchGenerator::generate_batch`].
pub trait BatchSink: Send + Sync {
    /// Called with the full current parse of a slot after every chunk.
    fn partial(&self, slot: usize, data: PartialQuestion);

    /// Called exactly once per slot with `Succeeded` or `Failed`.
    fn settled(&self, slot: usize, status: SlotStatus);
}

/// Outcome counts of a finished batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Slots whose stream completed.
    pub succeeded: usize,
    /// Slots whose fetch failed.
    pub failed: usize,
}

impl BatchReport {
    /// Returns `true` if at least one slot ran and none succeeded.
    #[must_use]
    pub const fn all_failed(&self) -> bool {
        self.succeeded == 0 && self.failed > 0
    }
}

/// First line of an error's display text, used as a slot failure message.
fn failure_message(err: &QuantError) -> String {
    let text = err.to_string();
    text.lines().next().unwrap_or_default().to_string()
}

// ============================================================================
// BatchGenerator
// ============================================================================

/// Runs N question fetches concurrently.
#[derive(Debug, Clone)]
pub struct BatchGenerator {
    fetcher: StreamFetcher,
    batch_size: usize,
}

impl BatchGenerator {
    /// Creates a generator producing `batch_size` questions per batch.
    #[must_use]
    pub const fn new(fetcher: StreamFetcher, batch_size: usize) -> Self {
        Self {
            fetcher,
            batch_size,
        }
    }

    /// Number of slots per batch.
    #[must_use]
    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Generates one batch.
    ///
    /// All fetches are started before any is awaited. A failing fetch never
    /// affects its siblings and the batch itself never fails: each slot is
    /// reported to `sink` as settled exactly once, and the returned report
    /// counts the outcomes.
    pub async fn generate_batch(
        &self,
        mode: BatchMode,
        request: &GenerationRequest,
        sink: &dyn BatchSink,
    ) -> BatchReport {
        info!(%mode, size = self.batch_size, topic = request.effective_topic(), "starting batch");

        let fetches = (0..self.batch_size).map(|slot| async move {
            let outcome = self
                .fetcher
                .fetch_streaming(request, |data| sink.partial(slot, data))
                .await;
            let status = match outcome {
                Ok(_) => SlotStatus::Succeeded,
                Err(e) => {
                    warn!(slot, %mode, error = %e, "slot failed");
                    SlotStatus::Failed(failure_message(&e))
                }
            };
            let failed = status.is_failed();
            sink.settled(slot, status);
            failed
        });

        let report = join_all(fetches)
            .await
            .into_iter()
            .fold(BatchReport::default(), |mut report, failed| {
                if failed {
                    report.failed += 1;
                } else {
                    report.succeeded += 1;
                }
                report
            });

        info!(
            %mode,
            succeeded = report.succeeded,
            failed = report.failed,
            "batch settled"
        );
        report
    }
}
