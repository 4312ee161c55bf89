//! Transaction status tracking
//!
//! One tracking session per transaction linker:
//! 1. Resolve an operation id from the linker, bounded attempts at a fixed
//!    interval
//! 2. Poll simplified status at a fixed interval while pending
//! 3. Stop on a terminal status, a protocol error, or cancellation
//!
//! Network calls within a session are strictly sequential: the next timer is
//! armed only after the previous attempt resolves. Cancellation is an explicit
//! token checked before every state mutation, so nothing fires after a session
//! is cancelled.

use crate::error::CourierError;
use crate::metrics;
use crate::sdk::{OperationId, SimplifiedStatus, TrackerApi, TransactionLinker};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tracker timing parameters
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub resolve_interval: Duration,
    pub resolve_max_attempts: u32,
    pub poll_interval: Duration,
}

impl From<&crate::config::CourierConfig> for TrackerConfig {
    fn from(c: &crate::config::CourierConfig) -> Self {
        Self {
            resolve_interval: Duration::from_millis(c.resolve_interval_ms),
            resolve_max_attempts: c.resolve_max_attempts,
            poll_interval: Duration::from_millis(c.poll_interval_ms),
        }
    }
}

/// Last known transaction status within a tracking session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackingStatus {
    Unknown,
    Pending,
    Successful,
    Failed,
    OperationIdNotFound,
}

impl TrackingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TrackingStatus::Successful
                | TrackingStatus::Failed
                | TrackingStatus::OperationIdNotFound
        )
    }
}

impl From<SimplifiedStatus> for TrackingStatus {
    fn from(s: SimplifiedStatus) -> Self {
        match s {
            SimplifiedStatus::Pending => TrackingStatus::Pending,
            SimplifiedStatus::Successful => TrackingStatus::Successful,
            SimplifiedStatus::Failed => TrackingStatus::Failed,
            SimplifiedStatus::OperationIdNotFound => TrackingStatus::OperationIdNotFound,
        }
    }
}

/// Tracking failure, distinct from any transaction status.
///
/// `ResolutionTimeout` is the resolver's own attempt budget running out; it is
/// never conflated with the remote service reporting
/// `OPERATION_ID_NOT_FOUND`, which is a transaction status. `Protocol` means
/// the tracker could not learn the status at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum TrackingError {
    ResolutionTimeout { attempts: u32 },
    Protocol(String),
}

impl From<TrackingError> for CourierError {
    fn from(e: TrackingError) -> Self {
        match e {
            TrackingError::ResolutionTimeout { attempts } => {
                CourierError::ResolutionTimeout { attempts }
            }
            TrackingError::Protocol(detail) => CourierError::TrackingProtocol(detail),
        }
    }
}

impl fmt::Display for TrackingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackingError::ResolutionTimeout { attempts } => {
                write!(f, "operation id not resolved after {} attempts", attempts)
            }
            TrackingError::Protocol(detail) => write!(f, "tracker protocol violation: {}", detail),
        }
    }
}

/// Observable state of one tracking session
#[derive(Debug, Clone, Serialize)]
pub struct TrackingSnapshot {
    pub operation_id: Option<OperationId>,
    pub status: TrackingStatus,
    pub error: Option<TrackingError>,
    pub attempt: u32,
    pub active: bool,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackingSnapshot {
    fn new() -> Self {
        let now = Utc::now();
        Self {
            operation_id: None,
            status: TrackingStatus::Unknown,
            error: None,
            attempt: 0,
            active: true,
            started_at: now,
            updated_at: now,
        }
    }
}

/// Cooperative cancellation token.
///
/// Clones share the same cancellation state. In-flight requests are not
/// force-aborted; they are abandoned at the next suspension point.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-side handle to a tracking session
pub struct TrackingHandle {
    key: String,
    cancel: CancelToken,
    updates: watch::Receiver<TrackingSnapshot>,
}

impl TrackingHandle {
    /// Correlation key of the linker being tracked
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn snapshot(&self) -> TrackingSnapshot {
        self.updates.borrow().clone()
    }

    /// Subscribe to snapshot updates
    pub fn subscribe(&self) -> watch::Receiver<TrackingSnapshot> {
        self.updates.clone()
    }

    /// Whether the session may be closed: never while actively polling a
    /// pending status, always after a terminal status or a tracking error.
    pub fn closeable(&self) -> bool {
        let snapshot = self.updates.borrow();
        !(snapshot.active && snapshot.status == TrackingStatus::Pending)
    }

    /// Close the session. Refused (returns false) while closing is not
    /// permitted; see [`TrackingHandle::closeable`].
    pub fn close(&self) -> bool {
        if !self.closeable() {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Unconditional teardown for owner shutdown paths
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the session to finish and return the final snapshot
    pub async fn completed(&self) -> TrackingSnapshot {
        let mut rx = self.updates.clone();
        loop {
            {
                let snapshot = rx.borrow();
                if !snapshot.active {
                    return snapshot.clone();
                }
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}

struct SessionEntry {
    id: Uuid,
    cancel: CancelToken,
    updates: watch::Receiver<TrackingSnapshot>,
}

/// Tracks transaction lifecycles, at most one active session per linker
pub struct StatusTracker {
    api: Arc<dyn TrackerApi>,
    config: TrackerConfig,
    sessions: Arc<DashMap<String, SessionEntry>>,
}

impl StatusTracker {
    pub fn new(api: Arc<dyn TrackerApi>, config: TrackerConfig) -> Self {
        Self {
            api,
            config,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Start tracking a linker. Re-tracking a linker that already has an
    /// active session cancels and replaces the prior session; two pollers
    /// never run against the same linker concurrently.
    pub fn track(&self, linker: TransactionLinker) -> TrackingHandle {
        let key = linker.correlation_key();
        let id = Uuid::new_v4();
        let cancel = CancelToken::new();
        let (state_tx, state_rx) = watch::channel(TrackingSnapshot::new());

        if let Some(previous) = self.sessions.insert(
            key.clone(),
            SessionEntry {
                id,
                cancel: cancel.clone(),
                updates: state_rx.clone(),
            },
        ) {
            previous.cancel.cancel();
            debug!("Replaced active tracking session for linker");
        }

        metrics::record_tracking_started();
        metrics::set_tracking_sessions(self.sessions.len() as i64);

        let worker = SessionWorker {
            api: self.api.clone(),
            config: self.config.clone(),
            linker,
            cancel: cancel.clone(),
            state: state_tx,
        };

        let sessions = self.sessions.clone();
        let worker_key = key.clone();
        tokio::spawn(async move {
            worker.run().await;
            // A replaced session must not evict its successor
            sessions.remove_if(&worker_key, |_, entry| entry.id == id);
            metrics::set_tracking_sessions(sessions.len() as i64);
        });

        TrackingHandle {
            key,
            cancel,
            updates: state_rx,
        }
    }

    /// Snapshot of one session by linker key
    pub fn session(&self, key: &str) -> Option<TrackingSnapshot> {
        self.sessions.get(key).map(|e| e.updates.borrow().clone())
    }

    /// Snapshots of all registered sessions
    pub fn active_sessions(&self) -> Vec<(String, TrackingSnapshot)> {
        self.sessions
            .iter()
            .map(|e| (e.key().clone(), e.value().updates.borrow().clone()))
            .collect()
    }

    /// Cancel every session; used on shutdown
    pub fn cancel_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().cancel.cancel();
        }
    }
}

/// One tracking session's state machine, running on its own task
struct SessionWorker {
    api: Arc<dyn TrackerApi>,
    config: TrackerConfig,
    linker: TransactionLinker,
    cancel: CancelToken,
    state: watch::Sender<TrackingSnapshot>,
}

impl SessionWorker {
    async fn run(self) {
        let outcome = self.run_inner().await;

        match outcome {
            Outcome::Cancelled => {
                debug!("Tracking session cancelled");
            }
            Outcome::Finished => {
                // Deactivate only when not cancelled: nothing mutates the
                // snapshot after cancellation.
                if !self.cancel.is_cancelled() {
                    self.state.send_modify(|s| {
                        s.active = false;
                        s.updated_at = Utc::now();
                    });
                }
            }
        }
    }

    async fn run_inner(&self) -> Outcome {
        let operation_id = match self.resolve_operation_id().await {
            Resolved::Id(id) => id,
            Resolved::TimedOut => return Outcome::Finished,
            Resolved::Cancelled => return Outcome::Cancelled,
        };

        info!(operation_id = %operation_id, "Operation id resolved, polling status");
        self.mutate(|s| {
            debug_assert!(s.operation_id.is_none());
            s.operation_id = Some(operation_id.clone());
        });

        self.poll_status().await
    }

    /// Phase 1: bounded operation-id resolution
    async fn resolve_operation_id(&self) -> Resolved {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.mutate(|s| s.attempt = attempt);

            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Resolved::Cancelled,
                r = self.api.get_operation_id(&self.linker) => r,
            };
            metrics::record_resolve_attempt();

            match result {
                Ok(Some(id)) => return Resolved::Id(id),
                Ok(None) => {
                    debug!(attempt, "Operation id not yet available");
                }
                Err(e) => {
                    warn!(attempt, "Operation id resolution attempt failed: {}", e);
                }
            }

            if attempt >= self.config.resolve_max_attempts {
                warn!(
                    attempts = attempt,
                    "Giving up on operation id resolution"
                );
                self.mutate(|s| {
                    s.error = Some(TrackingError::ResolutionTimeout { attempts: attempt });
                });
                metrics::record_tracking_terminal("resolution_timeout");
                return Resolved::TimedOut;
            }

            // Next attempt is armed only after this one resolved
            tokio::select! {
                _ = self.cancel.cancelled() => return Resolved::Cancelled,
                _ = tokio::time::sleep(self.config.resolve_interval) => {}
            }
        }
    }

    /// Phase 2: unbounded status polling while pending
    async fn poll_status(&self) -> Outcome {
        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                r = self.api.get_simplified_status(&self.linker) => r,
            };
            metrics::record_poll();

            match result {
                Ok(Some(status)) => {
                    let status = TrackingStatus::from(status);
                    self.mutate(|s| s.status = status);

                    if status.is_terminal() {
                        info!(?status, "Tracking reached terminal status");
                        metrics::record_tracking_terminal(terminal_label(status));
                        return Outcome::Finished;
                    }
                }
                Ok(None) => {
                    // The remote returned no status at all; this is a
                    // protocol violation, not a failed transaction.
                    warn!("Tracker returned an empty status payload, halting");
                    self.mutate(|s| {
                        s.error = Some(TrackingError::Protocol(
                            "tracker returned no status".to_string(),
                        ));
                    });
                    metrics::record_tracking_terminal("protocol_error");
                    return Outcome::Finished;
                }
                Err(e) => {
                    // Last known status is preserved alongside the error
                    warn!("Status poll failed, halting: {}", e);
                    self.mutate(|s| {
                        s.error = Some(TrackingError::Protocol(e.to_string()));
                    });
                    metrics::record_tracking_terminal("protocol_error");
                    return Outcome::Finished;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Outcome::Cancelled,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }

    /// Apply a state mutation unless the session was cancelled
    fn mutate<F: FnOnce(&mut TrackingSnapshot)>(&self, f: F) {
        if self.cancel.is_cancelled() {
            return;
        }
        self.state.send_modify(|s| {
            f(s);
            s.updated_at = Utc::now();
        });
    }
}

enum Outcome {
    Finished,
    Cancelled,
}

enum Resolved {
    Id(OperationId),
    TimedOut,
    Cancelled,
}

fn terminal_label(status: TrackingStatus) -> &'static str {
    match status {
        TrackingStatus::Successful => "successful",
        TrackingStatus::Failed => "failed",
        TrackingStatus::OperationIdNotFound => "operation_id_not_found",
        TrackingStatus::Unknown | TrackingStatus::Pending => "unreachable",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::MockTrackerApi;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config() -> TrackerConfig {
        TrackerConfig {
            resolve_interval: Duration::from_secs(5),
            resolve_max_attempts: 12,
            poll_interval: Duration::from_secs(5),
        }
    }

    fn linker() -> TransactionLinker {
        TransactionLinker::new(serde_json::json!({"shardsKey": "1", "caller": "EQA"}))
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_succeeds_on_last_attempt() {
        let resolve_calls = Arc::new(AtomicUsize::new(0));
        let calls = resolve_calls.clone();

        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 11 {
                Ok(None)
            } else {
                Ok(Some(OperationId("op-1".to_string())))
            }
        });
        api.expect_get_simplified_status()
            .returning(|_| Ok(Some(SimplifiedStatus::Successful)));

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;

        assert_eq!(resolve_calls.load(Ordering::SeqCst), 12);
        assert_eq!(final_state.attempt, 12);
        assert_eq!(final_state.operation_id, Some(OperationId("op-1".to_string())));
        assert_eq!(final_state.status, TrackingStatus::Successful);
        assert!(final_state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_exhaustion_never_polls() {
        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id().times(12).returning(|_| Ok(None));
        api.expect_get_simplified_status().times(0);

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;

        assert_eq!(
            final_state.error,
            Some(TrackingError::ResolutionTimeout { attempts: 12 })
        );
        assert_eq!(final_state.status, TrackingStatus::Unknown);
        assert!(final_state.operation_id.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_after_terminal_status() {
        let poll_calls = Arc::new(AtomicUsize::new(0));
        let calls = poll_calls.clone();

        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id()
            .returning(|_| Ok(Some(OperationId("op-2".to_string()))));
        api.expect_get_simplified_status().returning(move |_| {
            Ok(Some(match calls.fetch_add(1, Ordering::SeqCst) {
                0 | 1 => SimplifiedStatus::Pending,
                _ => SimplifiedStatus::Successful,
            }))
        });

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;

        assert_eq!(final_state.status, TrackingStatus::Successful);
        assert!(handle.closeable());
        assert_eq!(poll_calls.load(Ordering::SeqCst), 3);

        // No poll may be issued after the terminal status
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(poll_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let poll_calls = Arc::new(AtomicUsize::new(0));
        let calls = poll_calls.clone();

        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id()
            .returning(|_| Ok(Some(OperationId("op-3".to_string()))));
        api.expect_get_simplified_status().returning(move |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(SimplifiedStatus::Pending))
        });

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());

        tokio::time::sleep(Duration::from_secs(12)).await;
        let before = poll_calls.load(Ordering::SeqCst);
        assert!(before >= 1);
        assert_eq!(handle.snapshot().status, TrackingStatus::Pending);

        // Still pending: polite close is refused, teardown cancel is not
        assert!(!handle.close());
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(poll_calls.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_null_status_is_protocol_error_not_failure() {
        let poll_calls = Arc::new(AtomicUsize::new(0));
        let calls = poll_calls.clone();

        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id()
            .returning(|_| Ok(Some(OperationId("op-4".to_string()))));
        api.expect_get_simplified_status().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(SimplifiedStatus::Pending))
            } else {
                Ok(None)
            }
        });

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;

        // Last known status is preserved; the error is not a transaction state
        assert_eq!(final_state.status, TrackingStatus::Pending);
        assert!(matches!(
            final_state.error,
            Some(TrackingError::Protocol(_))
        ));
        assert_eq!(poll_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_fetch_is_protocol_error_preserving_status() {
        let poll_calls = Arc::new(AtomicUsize::new(0));
        let calls = poll_calls.clone();

        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id()
            .returning(|_| Ok(Some(OperationId("op-7".to_string()))));
        api.expect_get_simplified_status().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(SimplifiedStatus::Pending))
            } else {
                Err(CourierError::TrackingProtocol(
                    "status endpoint returned 502".to_string(),
                ))
            }
        });

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;

        // The fetch failure halts tracking as a protocol error; the last
        // known status survives and is not mistaken for FAILED
        assert_eq!(final_state.status, TrackingStatus::Pending);
        assert!(matches!(
            final_state.error,
            Some(TrackingError::Protocol(_))
        ));
        assert_eq!(poll_calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(poll_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_errors_are_retried_within_budget() {
        let resolve_calls = Arc::new(AtomicUsize::new(0));
        let calls = resolve_calls.clone();

        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id().returning(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                Err(CourierError::TrackingProtocol(
                    "operation-id endpoint returned 503".to_string(),
                ))
            } else {
                Ok(Some(OperationId("op-8".to_string())))
            }
        });
        api.expect_get_simplified_status()
            .returning(|_| Ok(Some(SimplifiedStatus::Successful)));

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;

        // Failed attempts count toward the budget but do not end the session
        assert_eq!(resolve_calls.load(Ordering::SeqCst), 4);
        assert_eq!(final_state.attempt, 4);
        assert_eq!(final_state.operation_id, Some(OperationId("op-8".to_string())));
        assert_eq!(final_state.status, TrackingStatus::Successful);
        assert!(final_state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_not_found_is_a_status_not_an_error() {
        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id()
            .returning(|_| Ok(Some(OperationId("op-5".to_string()))));
        api.expect_get_simplified_status()
            .returning(|_| Ok(Some(SimplifiedStatus::OperationIdNotFound)));

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;

        assert_eq!(final_state.status, TrackingStatus::OperationIdNotFound);
        assert!(final_state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retracking_replaces_prior_session() {
        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id().returning(|_| Ok(None));

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let first = tracker.track(linker());
        tokio::task::yield_now().await;

        let second = tracker.track(linker());
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert_eq!(tracker.active_sessions().len(), 1);

        second.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_deregisters_on_completion() {
        let mut api = MockTrackerApi::new();
        api.expect_get_operation_id()
            .returning(|_| Ok(Some(OperationId("op-6".to_string()))));
        api.expect_get_simplified_status()
            .returning(|_| Ok(Some(SimplifiedStatus::Failed)));

        let tracker = StatusTracker::new(Arc::new(api), fast_config());
        let handle = tracker.track(linker());
        let final_state = handle.completed().await;
        assert_eq!(final_state.status, TrackingStatus::Failed);

        tokio::task::yield_now().await;
        assert!(tracker.active_sessions().is_empty());
    }
}
