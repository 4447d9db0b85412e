//! QuantPrep core
//!
//! Streams quantitative-finance interview questions from a generation service
//! in batches, parses the partial replies into question cards, and keeps the
//! next batch prefetched in the background so "next set" is instant.
//!
//! The pieces, bottom-up:
//!
//! - [`parser`] turns raw (possibly partial) reply text into a [`PartialQuestion`]
//! - [`fetcher`] streams one question and reports every growing parse
//! - [`batch`] runs a fixed-size batch concurrently and settles every slot
//! - [`prefetch`] owns the active and buffered batches
//! - [`api`] and [`events`] expose the session over HTTP and WebSocket

pub mod api;
pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod parser;
pub mod prefetch;
pub mod prompt;
pub mod question;
pub mod request;
pub mod service;

pub use api::{
    create_router, AppState, ErrorResponse, GenerateAction, GenerateResponse, SettingsResponse,
};
pub use batch::{Batch, BatchGenerator, BatchMode, BatchReport, BatchSink};
pub use config::{Config, ModelIds, CONFIG_FILE_NAME};
pub use error::{LlmErrorKind, QuantError, Result};
pub use events::{EventBroadcaster, SessionEvent};
pub use fetcher::StreamFetcher;
pub use prefetch::{BufferPhase, GenerateOutcome, GenerateStart, Orchestrator, SessionSnapshot};
pub use question::{PartialQuestion, Slot, SlotStatus};
pub use request::{Difficulty, GenerationRequest, Language, ModelTier, SettingsPatch, Topic};
pub use service::{GeminiService, GenerationService, SseDecoder, TextStream};
