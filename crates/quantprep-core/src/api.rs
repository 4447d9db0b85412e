//! HTTP API for driving a practice session.
//!
//! # Endpoints
//!
//! - `GET /api/status` - Current session snapshot
//! - `POST /api/generate` - Show the next set (swap the buffer or start a batch)
//! - `PUT /api/settings` - Change topic, difficulty, language or model
//! - `GET /ws` - WebSocket event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use quantprep_core::{create_router, AppState, Config, GeminiService, Orchestrator};
//!
//! # async fn example() -> quantprep_core::Result<()> {
//! let config = Config::load()?;
//! let service = Arc::new(GeminiService::from_env(&config)?);
//! let orchestrator = Orchestrator::from_config(&config, service);
//!
//! let router = create_router(AppState::new(orchestrator));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::events::ws_handler;
use crate::prefetch::{GenerateStart, Orchestrator, SessionSnapshot};
use crate::request::{GenerationRequest, SettingsPatch};
use crate::QuantError;

// ============================================================================
// Request/Response Types
// ============================================================================

/// How a generate request was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerateAction {
    /// The prefetched buffer was swapped in.
    Swapped,
    /// A foreground batch started streaming.
    Started,
}

/// Response body for `POST /api/generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// What happened.
    pub action: GenerateAction,
    /// Token of the batch now active.
    pub token: u64,
}

/// Response body for `PUT /api/settings`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsResponse {
    /// Whether the settings actually changed.
    pub changed: bool,
    /// The live settings after the update.
    pub request: GenerationRequest,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The session orchestrator.
    pub orchestrator: Orchestrator,
}

impl AppState {
    /// Creates a new `AppState`.
    #[must_use]
    pub const fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request conflicts with work in progress.
    Conflict(String),
    /// The batch could not be started.
    Internal(String),
}

impl From<QuantError> for ApiError {
    fn from(err: QuantError) -> Self {
        match err {
            QuantError::GenerationInFlight { .. } => Self::Conflict(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries:
/// - All API routes under `/api`
/// - The WebSocket event stream at `/ws`
/// - CORS middleware for development
/// - Tracing middleware for request logging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS for development (allow all origins)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/status", get(handle_status))
        .route("/generate", post(handle_generate))
        .route("/settings", put(handle_settings));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `GET /api/status`.
async fn handle_status(State(state): State<Arc<AppState>>) -> Json<SessionSnapshot> {
    Json(state.orchestrator.snapshot())
}

/// Handler for `POST /api/generate`.
///
/// Returns immediately; progress is reported on `/ws`.
async fn handle_generate(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<GenerateResponse>), ApiError> {
    let start = state.orchestrator.begin_generate().map_err(|e| {
        warn!(error = %e, "Generate request rejected");
        ApiError::from(e)
    })?;

    let response = match start {
        GenerateStart::Swapped { token } => GenerateResponse {
            action: GenerateAction::Swapped,
            token,
        },
        // The batch keeps running after the handle is dropped.
        GenerateStart::Started { token, .. } => GenerateResponse {
            action: GenerateAction::Started,
            token,
        },
    };

    info!(action = ?response.action, token = response.token, "Generate request served");
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Handler for `PUT /api/settings`.
async fn handle_settings(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> Json<SettingsResponse> {
    let changed = state.orchestrator.update_settings(&patch);
    let request = state.orchestrator.settings();
    info!(changed, topic = request.effective_topic(), "Settings updated");
    Json(SettingsResponse { changed, request })
}

// ============================================================================
// Tests
// ============================================================================
