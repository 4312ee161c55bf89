//! HTTP API for health checks, status, and monitoring

use crate::config::ApiConfig;
use crate::error::{CourierError, CourierResult};
use crate::session::SessionManager;
use crate::submit::SubmissionClient;
use crate::track::{StatusTracker, TrackingSnapshot};

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub submission: Arc<SubmissionClient>,
    pub tracker: Arc<StatusTracker>,
}

/// Run the HTTP API server
pub async fn run_server(config: ApiConfig, state: AppState) -> CourierResult<()> {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/status", get(get_status))
        .route("/sessions", get(get_sessions))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| CourierError::Internal(e.to_string()))?;
    axum::serve(listener, app)
        .await
        .map_err(|e| CourierError::Internal(e.to_string()))?;

    Ok(())
}

/// Health check endpoint - basic liveness
async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Readiness check - wallet session and SDK handle both live
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let connected = state.session.connected().await;
    let sdk_ready = state.submission.is_ready().await;

    let response = ReadyResponse {
        ready: connected && sdk_ready,
        wallet_connected: connected,
        sdk_ready,
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Current courier status
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    let submission = state.submission.state();

    Json(StatusResponse {
        wallet: state.session.display_address().await,
        wallet_connected: state.session.connected().await,
        sdk_ready: state.submission.is_ready().await,
        submission_in_flight: submission.is_loading,
        submission_error: submission.error,
        has_transaction_linker: submission.transaction_linker.is_some(),
        tracking_sessions: state.tracker.active_sessions().len(),
    })
}

/// Snapshots of all registered tracking sessions
async fn get_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions: Vec<SessionResponse> = state
        .tracker
        .active_sessions()
        .into_iter()
        .map(|(key, snapshot)| SessionResponse { key, snapshot })
        .collect();

    Json(sessions)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    ready: bool,
    wallet_connected: bool,
    sdk_ready: bool,
}

#[derive(Serialize)]
struct StatusResponse {
    wallet: Option<String>,
    wallet_connected: bool,
    sdk_ready: bool,
    submission_in_flight: bool,
    submission_error: Option<String>,
    has_transaction_linker: bool,
    tracking_sessions: usize,
}

#[derive(Serialize)]
struct SessionResponse {
    key: String,
    snapshot: TrackingSnapshot,
}
