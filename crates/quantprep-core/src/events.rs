//! Session events and WebSocket streaming.
//!
//! Every orchestrator transition is published on an [`EventBroadcaster`].
//! WebSocket clients on `/ws` receive a `connected` event carrying the current
//! [`SessionSnapshot`], then every event as it happens.
//!
//! # Event Types
//!
//! - `connected` - Sent when a client connects, includes current snapshot
//! - `batch_started` - A foreground or background batch begins
//! - `slot_updated` - A slot received new partial content
//! - `slot_settled` - A slot's stream succeeded or failed
//! - `batch_completed` - Every slot of a batch has settled
//! - `buffer_ready` - The prefetch buffer holds a complete batch
//! - `buffer_discarded` - The prefetch buffer was dropped after a settings change
//! - `swapped` - The ready buffer became the active batch
//! - `settings_changed` - The live generation settings changed
//! - `error` - Every question of a visible batch failed
//!
//! # Example
//!
//! ```no_run
//! use quantprep_core::events::{EventBroadcaster, SessionEvent};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(SessionEvent::error("All questions failed"));
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {}", event.event_name());
//! }
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::api::AppState;
use crate::batch::{BatchMode, BatchReport};
use crate::prefetch::SessionSnapshot;
use crate::question::{PartialQuestion, SlotStatus};
use crate::request::GenerationRequest;

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `connected` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedPayload {
    /// The current session snapshot.
    pub snapshot: SessionSnapshot,
}

/// Payload for the `batch_started` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStartedPayload {
    /// Generation token of the new batch.
    pub token: u64,
    /// Foreground or background.
    pub mode: BatchMode,
    /// Number of slots.
    pub size: usize,
    /// Settings the batch was built with.
    pub request: GenerationRequest,
}

/// Payload for the `slot_updated` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotUpdatedPayload {
    /// Generation token of the batch.
    pub token: u64,
    /// Foreground or background.
    pub mode: BatchMode,
    /// Slot index.
    pub slot: usize,
    /// Full current content of the slot.
    pub data: PartialQuestion,
}

/// Payload for the `slot_settled` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotSettledPayload {
    /// Generation token of the batch.
    pub token: u64,
    /// Foreground or background.
    pub mode: BatchMode,
    /// Slot index.
    pub slot: usize,
    /// Final status of the slot.
    pub status: SlotStatus,
}

/// Payload for the `batch_completed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCompletedPayload {
    /// Generation token of the batch.
    pub token: u64,
    /// Foreground or background.
    pub mode: BatchMode,
    /// Outcome counts.
    pub report: BatchReport,
}

/// Payload for events that only identify a batch (`buffer_ready`,
/// `swapped`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPayload {
    /// Generation token of the batch.
    pub token: u64,
}

/// Payload for the `buffer_discarded` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferDiscardedPayload {
    /// Token of the discarded batch, if one existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<u64>,
}

/// Payload for the `settings_changed` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsChangedPayload {
    /// The new live settings.
    pub request: GenerationRequest,
}

/// Payload for the `error` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Human-readable error message.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Session events.
///
/// All events are serialized as JSON objects with "event" and "payload" fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Sent when a client connects.
    Connected(ConnectedPayload),
    /// A batch started.
    BatchStarted(BatchStartedPayload),
    /// A slot received new content.
    SlotUpdated(SlotUpdatedPayload),
    /// A slot settled.
    SlotSettled(SlotSettledPayload),
    /// Every slot of a batch settled.
    BatchCompleted(BatchCompletedPayload),
    /// The prefetch buffer is ready to swap in.
    BufferReady(TokenPayload),
    /// The prefetch buffer was discarded.
    BufferDiscarded(BufferDiscardedPayload),
    /// The buffer was swapped into the active slots.
    Swapped(TokenPayload),
    /// The live settings changed.
    SettingsChanged(SettingsChangedPayload),
    /// A visible batch failed entirely.
    Error(ErrorPayload),
}

impl SessionEvent {
    /// Creates a `Connected` event.
    #[must_use]
    pub const fn connected(snapshot: SessionSnapshot) -> Self {
        Self::Connected(ConnectedPayload { snapshot })
    }

    /// Creates a `BatchStarted` event.
    #[must_use]
    pub const fn batch_started(
        token: u64,
        mode: BatchMode,
        size: usize,
        request: GenerationRequest,
    ) -> Self {
        Self::BatchStarted(BatchStartedPayload {
            token,
            mode,
            size,
            request,
        })
    }

    /// Creates a `SlotUpdated` event.
    #[must_use]
    pub const fn slot_updated(token: u64, mode: BatchMode, slot: usize, data: PartialQuestion) -> Self {
        Self::SlotUpdated(SlotUpdatedPayload {
            token,
            mode,
            slot,
            data,
        })
    }

    /// Creates a `SlotSettled` event.
    #[must_use]
    pub const fn slot_settled(token: u64, mode: BatchMode, slot: usize, status: SlotStatus) -> Self {
        Self::SlotSettled(SlotSettledPayload {
            token,
            mode,
            slot,
            status,
        })
    }

    /// Creates a `BatchCompleted` event.
    #[must_use]
    pub const fn batch_completed(token: u64, mode: BatchMode, report: BatchReport) -> Self {
        Self::BatchCompleted(BatchCompletedPayload {
            token,
            mode,
            report,
        })
    }

    /// Creates a `BufferReady` event.
    #[must_use]
    pub const fn buffer_ready(token: u64) -> Self {
        Self::BufferReady(TokenPayload { token })
    }

    /// Creates a `BufferDiscarded` event.
    #[must_use]
    pub const fn buffer_discarded(token: Option<u64>) -> Self {
        Self::BufferDiscarded(BufferDiscardedPayload { token })
    }

    /// Creates a `Swapped` event.
    #[must_use]
    pub const fn swapped(token: u64) -> Self {
        Self::Swapped(TokenPayload { token })
    }

    /// Creates a `SettingsChanged` event.
    #[must_use]
    pub const fn settings_changed(request: GenerationRequest) -> Self {
        Self::SettingsChanged(SettingsChangedPayload { request })
    }

    /// Creates an `Error` event.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::BatchStarted(_) => "batch_started",
            Self::SlotUpdated(_) => "slot_updated",
            Self::SlotSettled(_) => "slot_settled",
            Self::BatchCompleted(_) => "batch_completed",
            Self::BufferReady(_) => "buffer_ready",
            Self::BufferDiscarded(_) => "buffer_discarded",
            Self::Swapped(_) => "swapped",
            Self::SettingsChanged(_) => "settings_changed",
            Self::Error(_) => "error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts session events to every subscriber.
///
/// Uses a tokio broadcast channel for pub-sub event distribution.
/// Events are not persisted for disconnected clients.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// The buffer determines how many events can be queued per subscriber
    /// before old events are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    ///
    /// If a subscriber falls behind it receives a `Lagged` error and misses
    /// some events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all subscribers.
    ///
    /// Returns the number of receivers; 0 means nobody is listening.
    pub fn send(&self, event: SessionEvent) -> usize {
        // send() returns Err only if there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}

// ============================================================================
// WebSocket Handler
// ============================================================================

/// WebSocket upgrade handler for `/ws`.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("New WebSocket connection request");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Seconds between heartbeat pings.
const HEARTBEAT_SECS: u64 = 30;

/// Maximum number of missed pong responses before disconnecting.
const MAX_MISSED_PONGS: u8 = 3;

/// Serializes an event for the wire.
fn encode(event: &SessionEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!(event = event.event_name(), "Failed to serialize event: {e}");
            None
        }
    }
}

/// What the connection loop does after handling one input.
enum Flow {
    Continue,
    Close,
}

type WsSender = SplitSink<WebSocket, Message>;

/// Streams session events to one client until either side goes away.
///
/// The client first gets `connected` with the current snapshot. A ping goes
/// out every heartbeat; after [`MAX_MISSED_PONGS`] unanswered pings the
/// connection is dropped.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribing before taking the snapshot means no transition can fall
    // between the two.
    let mut events = state.orchestrator.subscribe();

    let Some(connected) = encode(&SessionEvent::connected(state.orchestrator.snapshot())) else {
        return;
    };
    if sender.send(Message::Text(connected)).await.is_err() {
        debug!("Client left before the snapshot was sent");
        return;
    }
    info!(subscribers = state.orchestrator.events().receiver_count(), "WebSocket client attached");

    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_SECS));
    let mut unanswered = 0u8;

    loop {
        let flow = tokio::select! {
            incoming = receiver.next() => {
                on_client_message(&mut sender, incoming, &mut unanswered).await
            }
            event = events.recv() => forward_event(&mut sender, event).await,
            _ = heartbeat.tick() => {
                unanswered += 1;
                if unanswered > MAX_MISSED_PONGS {
                    info!(missed = MAX_MISSED_PONGS, "Heartbeat unanswered, dropping client");
                    Flow::Close
                } else if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    Flow::Close
                } else {
                    Flow::Continue
                }
            }
        };

        if matches!(flow, Flow::Close) {
            break;
        }
    }

    info!("WebSocket client detached");
}

async fn on_client_message(
    sender: &mut WsSender,
    incoming: Option<std::result::Result<Message, axum::Error>>,
    unanswered: &mut u8,
) -> Flow {
    match incoming {
        Some(Ok(Message::Pong(_))) => {
            *unanswered = 0;
            Flow::Continue
        }
        Some(Ok(Message::Ping(data))) => {
            if sender.send(Message::Pong(data)).await.is_err() {
                Flow::Close
            } else {
                Flow::Continue
            }
        }
        // The stream is one-way; commands go through the HTTP API.
        Some(Ok(Message::Text(_) | Message::Binary(_))) => Flow::Continue,
        Some(Ok(Message::Close(frame))) => {
            debug!(?frame, "Client closed the connection");
            Flow::Close
        }
        Some(Err(e)) => {
            debug!(error = %e, "WebSocket receive failed");
            Flow::Close
        }
        None => Flow::Close,
    }
}

async fn forward_event(
    sender: &mut WsSender,
    event: std::result::Result<SessionEvent, broadcast::error::RecvError>,
) -> Flow {
    match event {
        Ok(event) => {
            let Some(json) = encode(&event) else {
                return Flow::Continue;
            };
            if sender.send(Message::Text(json)).await.is_err() {
                debug!(event = event.event_name(), "Client gone while forwarding");
                return Flow::Close;
            }
            Flow::Continue
        }
        // Lagging clients resync from `GET /api/status` or a reconnect.
        Err(broadcast::error::RecvError::Lagged(skipped)) => {
            warn!(skipped, "WebSocket client lagged behind session events");
            Flow::Continue
        }
        Err(broadcast::error::RecvError::Closed) => Flow::Close,
    }
}

// ============================================================================
// Tests
// ============================================================================
