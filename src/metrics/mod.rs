//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - SDK lifecycle
//! - Submission outcomes
//! - Operation-id resolution and status polling
//! - Tracking session terminal states

use crate::error::CourierResult;

use axum::{routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge, CounterVec, Encoder,
    IntCounter, IntGauge, TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // SDK lifecycle
    pub static ref SDK_INITIALIZED: IntCounter = register_int_counter!(
        "tac_courier_sdk_initialized_total",
        "Times the cross-chain SDK handle was created"
    ).unwrap();

    // Submission metrics
    pub static ref SUBMISSIONS: CounterVec = register_counter_vec!(
        "tac_courier_submissions_total",
        "Cross-chain submissions by outcome",
        &["outcome"]
    ).unwrap();

    // Tracking metrics
    pub static ref RESOLVE_ATTEMPTS: IntCounter = register_int_counter!(
        "tac_courier_resolve_attempts_total",
        "Operation-id resolution attempts"
    ).unwrap();

    pub static ref STATUS_POLLS: IntCounter = register_int_counter!(
        "tac_courier_status_polls_total",
        "Status poll requests issued"
    ).unwrap();

    pub static ref TRACKING_STARTED: IntCounter = register_int_counter!(
        "tac_courier_tracking_sessions_started_total",
        "Tracking sessions started"
    ).unwrap();

    pub static ref TRACKING_TERMINAL: CounterVec = register_counter_vec!(
        "tac_courier_tracking_terminal_total",
        "Tracking sessions reaching a terminal condition, by outcome",
        &["outcome"]
    ).unwrap();

    pub static ref TRACKING_SESSIONS: IntGauge = register_int_gauge!(
        "tac_courier_tracking_sessions_active",
        "Currently registered tracking sessions"
    ).unwrap();
}

/// Metrics HTTP server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    /// Run the metrics server
    pub async fn run(&self) -> CourierResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| crate::error::CourierError::Internal(e.to_string()))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| crate::error::CourierError::Internal(e.to_string()))?;

        Ok(())
    }
}

/// Render all registered metrics in the Prometheus text format
async fn metrics_handler() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_sdk_initialized() {
    SDK_INITIALIZED.inc();
}

pub fn record_submission(outcome: &str) {
    SUBMISSIONS.with_label_values(&[outcome]).inc();
}

pub fn record_resolve_attempt() {
    RESOLVE_ATTEMPTS.inc();
}

pub fn record_poll() {
    STATUS_POLLS.inc();
}

pub fn record_tracking_started() {
    TRACKING_STARTED.inc();
}

pub fn record_tracking_terminal(outcome: &str) {
    TRACKING_TERMINAL.with_label_values(&[outcome]).inc();
}

pub fn set_tracking_sessions(count: i64) {
    TRACKING_SESSIONS.set(count);
}
