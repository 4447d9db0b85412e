//! Dual-buffer prefetch orchestrator.
//!
//! The orchestrator owns two batches: the *active* batch the user is looking
//! at, and an optional *buffer* batch generated silently in the background so
//! that the next `generate` can swap it in without waiting.
//!
//! The buffer moves through three phases:
//!
//! - `Empty` -> `Loading` when the refill guard holds (some active title, no
//!   active slot pending, buffer empty)
//! - `Loading` -> `Ready` once every buffer slot has settled
//! - `Ready` -> `Empty` when `generate` swaps it in
//! - `Loading | Ready` -> `Empty` when the live settings change
//!
//! The refill guard is re-evaluated after every state mutation. The check and
//! the transition to `Loading` happen under one lock acquisition, so two
//! evaluations can never both start a background batch.
//!
//! Every batch carries a generation token. Progress callbacks from a batch
//! that is no longer the active or loading buffer batch are dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::batch::{Batch, BatchGenerator, BatchMode, BatchReport, BatchSink};
use crate::config::Config;
use crate::error::{QuantError, Result};
use crate::events::{EventBroadcaster, SessionEvent};
use crate::fetcher::StreamFetcher;
use crate::question::{PartialQuestion, SlotStatus};
use crate::request::{GenerationRequest, SettingsPatch};
use crate::service::GenerationService;

// ============================================================================
// BufferPhase
// ============================================================================

/// Phase of the prefetch buffer.
///
/// A single enum makes "loading and ready at the same time" unrepresentable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferPhase {
    /// No buffer batch exists.
    #[default]
    Empty,
    /// A background batch is streaming.
    Loading,
    /// A complete background batch is waiting to be swapped in.
    Ready,
}

impl BufferPhase {
    /// Returns `true` while a background batch is streaming.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Returns `true` when a complete batch can be swapped in.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

// ============================================================================
// PrefetchState
// ============================================================================

/// Mutable orchestrator state. Always accessed under the orchestrator lock.
#[derive(Debug, Clone)]
struct PrefetchState {
    request: GenerationRequest,
    active: Batch,
    buffer: Option<Batch>,
    buffer_phase: BufferPhase,
    last_error: Option<String>,
    next_token: u64,
}

impl PrefetchState {
    fn new(request: GenerationRequest) -> Self {
        Self {
            active: Batch::new(0, BatchMode::Foreground, request.clone(), 0),
            request,
            buffer: None,
            buffer_phase: BufferPhase::Empty,
            last_error: None,
            next_token: 1,
        }
    }

    fn issue_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    /// Refill guard: some active title, nothing active pending, buffer empty.
    fn should_refill(&self) -> bool {
        self.active.has_any_title()
            && self.active.is_settled()
            && self.buffer_phase == BufferPhase::Empty
    }

    /// Returns the batch a callback with `token` may still write to.
    fn live_batch_mut(&mut self, token: u64) -> Option<&mut Batch> {
        if self.active.token == token {
            return Some(&mut self.active);
        }
        match self.buffer.as_mut() {
            Some(buffer) if buffer.token == token && self.buffer_phase.is_loading() => Some(buffer),
            _ => None,
        }
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            request: self.request.clone(),
            active_loading: !self.active.is_settled(),
            active: self.active.clone(),
            buffer_phase: self.buffer_phase,
            buffer: self.buffer.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

// ============================================================================
// SessionSnapshot
// ============================================================================

/// Serializable view of the orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// The live settings.
    pub request: GenerationRequest,
    /// The visible batch.
    pub active: Batch,
    /// `true` while any active slot is pending.
    pub active_loading: bool,
    /// Phase of the prefetch buffer.
    pub buffer_phase: BufferPhase,
    /// The prefetch batch, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buffer: Option<Batch>,
    /// Aggregate error of the last visible batch, if every question failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl SessionSnapshot {
    /// Returns `true` while a background batch is streaming.
    #[must_use]
    pub const fn is_buffer_loading(&self) -> bool {
        self.buffer_phase.is_loading()
    }

    /// Returns `true` when the next batch can be shown instantly.
    #[must_use]
    pub const fn is_buffer_ready(&self) -> bool {
        self.buffer_phase.is_ready()
    }
}

// ============================================================================
// Generate outcomes
// ============================================================================

/// Immediate result of [`Orchestrator::begin_generate`].
#[derive(Debug)]
pub enum GenerateStart {
    /// The ready buffer was swapped in; nothing to wait for.
    Swapped {
        /// Token of the batch now active.
        token: u64,
    },
    /// A foreground batch started streaming.
    Started {
        /// Token of the new active batch.
        token: u64,
        /// Resolves when every slot has settled.
        handle: JoinHandle<BatchReport>,
    },
}

/// Final result of [`Orchestrator::generate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateOutcome {
    /// The ready buffer was swapped in.
    Swapped {
        /// Token of the batch now active.
        token: u64,
    },
    /// A foreground batch was generated.
    Completed {
        /// Token of the batch now active.
        token: u64,
        /// Outcome counts.
        report: BatchReport,
    },
}

// ============================================================================
// Orchestrator
// ============================================================================

struct Inner {
    state: Mutex<PrefetchState>,
    generator: BatchGenerator,
    events: EventBroadcaster,
}

/// Cloneable handle to the prefetch orchestrator.
///
/// All methods that may start a batch spawn onto the current Tokio runtime and
/// must be called from within one.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("generator", &self.inner.generator)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator starting from `request` with no questions.
    #[must_use]
    pub fn new(
        generator: BatchGenerator,
        events: EventBroadcaster,
        request: GenerationRequest,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(PrefetchState::new(request)),
                generator,
                events,
            }),
        }
    }

    /// Creates an orchestrator from configuration and a generation backend.
    pub fn from_config(config: &Config, service: Arc<dyn GenerationService>) -> Self {
        let fetcher = StreamFetcher::new(service, config.models.clone());
        Self::new(
            BatchGenerator::new(fetcher, config.batch_size),
            EventBroadcaster::new(config.event_capacity),
            config.defaults.clone(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, PrefetchState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: SessionEvent) {
        self.inner.events.send(event);
    }

    /// Subscribes to session events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the event broadcaster.
    #[must_use]
    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Returns the live settings.
    #[must_use]
    pub fn settings(&self) -> GenerationRequest {
        self.lock().request.clone()
    }

    /// Number of slots per batch.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.inner.generator.batch_size()
    }

    /// Shows the next set of questions.
    ///
    /// Swaps in the buffer if it is ready, otherwise starts a foreground batch
    /// against the live settings. An in-flight buffer batch is left running.
    ///
    /// # Errors
    ///
    /// Returns `QuantError::GenerationInFlight` while any active slot is still
    /// pending.
    pub fn begin_generate(&self) -> Result<GenerateStart> {
        let started = {
            let mut state = self.lock();

            let pending = state.active.pending_count();
            if pending > 0 {
                return Err(QuantError::GenerationInFlight {
                    pending,
                    total: state.active.slots.len(),
                });
            }

            state.last_error = None;

            if state.buffer_phase.is_ready() {
                if let Some(buffer) = state.buffer.take() {
                    let token = buffer.token;
                    state.active = buffer;
                    state.buffer_phase = BufferPhase::Empty;
                    info!(token, "swapped prefetched batch into view");
                    self.emit(SessionEvent::swapped(token));
                    drop(state);
                    self.evaluate();
                    return Ok(GenerateStart::Swapped { token });
                }
                // Unreachable through the transitions above; recover as empty.
                state.buffer_phase = BufferPhase::Empty;
            }

            let token = state.issue_token();
            let request = state.request.clone();
            let size = self.batch_size();
            state.active = Batch::new(token, BatchMode::Foreground, request.clone(), size);
            self.emit(SessionEvent::batch_started(
                token,
                BatchMode::Foreground,
                size,
                request.clone(),
            ));
            (token, request)
        };

        let (token, request) = started;
        info!(token, topic = request.effective_topic(), "starting foreground batch");
        let handle = tokio::spawn(self.clone().run_batch(token, BatchMode::Foreground, request));
        Ok(GenerateStart::Started { token, handle })
    }

    /// Shows the next set of questions and waits until it is fully loaded.
    ///
    /// # Errors
    ///
    /// Returns `QuantError::GenerationInFlight` as [`Self::begin_generate`]
    /// does, or `QuantError::TaskFailed` if the batch task ended abnormally.
    pub async fn generate(&self) -> Result<GenerateOutcome> {
        match self.begin_generate()? {
            GenerateStart::Swapped { token } => Ok(GenerateOutcome::Swapped { token }),
            GenerateStart::Started { token, handle } => {
                let report = handle.await.map_err(|e| QuantError::TaskFailed {
                    message: e.to_string(),
                })?;
                Ok(GenerateOutcome::Completed { token, report })
            }
        }
    }

    /// Applies a settings change.
    ///
    /// Any actual change discards the buffer batch, whether loading or ready;
    /// the active batch is left as it is. Returns `false` if the patch does not
    /// change anything.
    pub fn update_settings(&self, patch: &SettingsPatch) -> bool {
        {
            let mut state = self.lock();
            let next = patch.applied_to(&state.request);
            if next == state.request {
                return false;
            }
            state.request = next.clone();

            let discarded = state.buffer.take().map(|b| b.token);
            let had_buffer = discarded.is_some() || state.buffer_phase != BufferPhase::Empty;
            state.buffer_phase = BufferPhase::Empty;
            if had_buffer {
                info!(token = ?discarded, "discarding prefetch buffer after settings change");
                self.emit(SessionEvent::buffer_discarded(discarded));
            }
            self.emit(SessionEvent::settings_changed(next));
        }
        self.evaluate();
        true
    }

    /// Re-checks the refill guard and starts a background batch if it holds.
    ///
    /// Returns the token of the started batch.
    pub fn evaluate(&self) -> Option<u64> {
        let (token, request) = {
            let mut state = self.lock();
            if !state.should_refill() {
                return None;
            }
            let token = state.issue_token();
            let request = state.request.clone();
            let size = self.batch_size();
            state.buffer = Some(Batch::new(token, BatchMode::Background, request.clone(), size));
            state.buffer_phase = BufferPhase::Loading;
            self.emit(SessionEvent::batch_started(
                token,
                BatchMode::Background,
                size,
                request.clone(),
            ));
            (token, request)
        };

        info!(token, topic = request.effective_topic(), "prefetching next batch");
        tokio::spawn(self.clone().run_batch(token, BatchMode::Background, request));
        Some(token)
    }

    async fn run_batch(self, token: u64, mode: BatchMode, request: GenerationRequest) -> BatchReport {
        let sink = OrchestratorSink {
            orchestrator: self.clone(),
            token,
            mode,
        };
        let report = self
            .inner
            .generator
            .generate_batch(mode, &request, &sink)
            .await;
        self.finish_batch(token, mode, report);
        report
    }

    fn on_partial(&self, token: u64, mode: BatchMode, slot: usize, data: PartialQuestion) {
        let applied = {
            let mut state = self.lock();
            let applied = state
                .live_batch_mut(token)
                .is_some_and(|batch| batch.apply_partial(slot, data.clone()));
            if applied {
                self.emit(SessionEvent::slot_updated(token, mode, slot, data));
            }
            applied
        };
        if applied {
            self.evaluate();
        } else {
            debug!(token, slot, "dropping update from stale batch");
        }
    }

    fn on_settled(&self, token: u64, mode: BatchMode, slot: usize, status: SlotStatus) {
        let applied = {
            let mut state = self.lock();
            let applied = state
                .live_batch_mut(token)
                .is_some_and(|batch| batch.settle(slot, status.clone()));
            if applied {
                self.emit(SessionEvent::slot_settled(token, mode, slot, status));
            }
            applied
        };
        if applied {
            self.evaluate();
        } else {
            debug!(token, slot, "dropping settlement from stale batch");
        }
    }

    fn finish_batch(&self, token: u64, mode: BatchMode, report: BatchReport) {
        {
            let mut state = self.lock();
            match mode {
                BatchMode::Foreground if state.active.token == token => {
                    self.emit(SessionEvent::batch_completed(token, mode, report));
                    if state.active.all_failed() {
                        let reason = state
                            .active
                            .slots
                            .iter()
                            .find_map(|s| match &s.status {
                                SlotStatus::Failed(message) => Some(message.clone()),
                                _ => None,
                            })
                            .unwrap_or_default();
                        let message = format!("All {} questions failed: {reason}", report.failed);
                        warn!(token, "{message}");
                        state.last_error = Some(message.clone());
                        self.emit(SessionEvent::error(message));
                    }
                }
                BatchMode::Background
                    if state.buffer_phase.is_loading()
                        && state.buffer.as_ref().is_some_and(|b| b.token == token) =>
                {
                    state.buffer_phase = BufferPhase::Ready;
                    info!(
                        token,
                        succeeded = report.succeeded,
                        failed = report.failed,
                        "prefetch buffer ready"
                    );
                    self.emit(SessionEvent::batch_completed(token, mode, report));
                    self.emit(SessionEvent::buffer_ready(token));
                }
                _ => {
                    debug!(token, %mode, "batch finished after being superseded");
                }
            }
        }
        self.evaluate();
    }
}

/// Routes batch progress into the orchestrator, tagged with the batch token.
struct OrchestratorSink {
    orchestrator: Orchestrator,
    token: u64,
    mode: BatchMode,
}

impl BatchSink for OrchestratorSink {
    fn partial(&self, slot: usize, data: PartialQuestion) {
        self.orchestrator.on_partial(self.token, self.mode, slot, data);
    }

    fn settled(&self, slot: usize, status: SlotStatus) {
        self.orchestrator.on_settled(self.token, self.mode, slot, status);
    }
}

// ============================================================================
// Tests
// ============================================================================
