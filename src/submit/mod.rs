//! Submission client: initialize-once SDK lifecycle and the single
//! in-flight submission slot
//!
//! The SDK handle is the one shared resource in the process: created lazily
//! exactly once (concurrent `initialize` calls coalesce behind an async
//! lock), reused for every submission, and released once on teardown.

use crate::error::{CourierError, CourierResult};
use crate::metrics;
use crate::sdk::{AssetBridgingData, CrossChainSdk, EvmProxyMsg, SdkConnector, SdkParams, TransactionLinker};
use crate::session::SessionManager;

use std::sync::Arc;
use std::sync::Mutex;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{error, info};

/// Caller-visible submission state: a single in-flight slot
#[derive(Debug, Clone, Default)]
pub struct SubmissionState {
    pub is_loading: bool,
    pub error: Option<String>,
    pub transaction_linker: Option<TransactionLinker>,
}

/// Client for submitting proxy messages through the cross-chain SDK
pub struct SubmissionClient {
    connector: Arc<dyn SdkConnector>,
    params: SdkParams,
    session: Arc<SessionManager>,
    sdk: RwLock<Option<Arc<dyn CrossChainSdk>>>,
    init_lock: AsyncMutex<()>,
    state: Mutex<SubmissionState>,
}

impl SubmissionClient {
    pub fn new(
        connector: Arc<dyn SdkConnector>,
        params: SdkParams,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            connector,
            params,
            session,
            sdk: RwLock::new(None),
            init_lock: AsyncMutex::new(()),
            state: Mutex::new(SubmissionState::default()),
        }
    }

    /// Create the SDK handle if it does not exist yet.
    ///
    /// Concurrent calls coalesce: exactly one handle is ever created. A
    /// failed attempt is reported as `SdkInit` and retried only on the next
    /// explicit call.
    pub async fn initialize(&self) -> CourierResult<Arc<dyn CrossChainSdk>> {
        if let Some(handle) = self.sdk.read().await.clone() {
            return Ok(handle);
        }

        let _guard = self.init_lock.lock().await;

        // Another caller may have finished while we waited for the lock
        if let Some(handle) = self.sdk.read().await.clone() {
            return Ok(handle);
        }

        let handle = self.connector.create(&self.params).await.map_err(|e| {
            error!("SDK initialization failed: {}", e);
            match e {
                CourierError::SdkInit(_) => e,
                other => CourierError::SdkInit(other.to_string()),
            }
        })?;

        *self.sdk.write().await = Some(handle.clone());
        metrics::record_sdk_initialized();
        info!(network = %self.params.network, "Cross-chain SDK initialized");

        Ok(handle)
    }

    /// Whether the SDK handle exists
    pub async fn is_ready(&self) -> bool {
        self.sdk.read().await.is_some()
    }

    /// Submit a proxy message with optional asset transfers on behalf of the
    /// connected wallet.
    ///
    /// Requires a connected session and an initialized SDK; a submission
    /// already in flight is rejected rather than queued. `is_loading` is set
    /// for exactly the duration of the call and cleared on every exit path.
    pub async fn submit(
        &self,
        msg: &EvmProxyMsg,
        assets: &[AssetBridgingData],
    ) -> CourierResult<TransactionLinker> {
        let wallet = self
            .session
            .wallet()
            .await
            .ok_or(CourierError::NotConnected)?;

        let sdk = self
            .sdk
            .read()
            .await
            .clone()
            .ok_or(CourierError::NotInitialized)?;

        // Claim the in-flight slot
        {
            let mut state = self.state.lock().unwrap();
            if state.is_loading {
                return Err(CourierError::Submission(
                    "submission already in flight".to_string(),
                ));
            }
            state.is_loading = true;
            state.error = None;
            state.transaction_linker = None;
        }

        let result = sdk
            .send_cross_chain_transaction(msg, &wallet, assets)
            .await;

        match result {
            Ok(linker) => {
                let mut state = self.state.lock().unwrap();
                state.is_loading = false;
                state.transaction_linker = Some(linker.clone());
                drop(state);

                metrics::record_submission("ok");
                info!(
                    target = %msg.evm_target_address,
                    method = %msg.method_name,
                    "Cross-chain transaction submitted"
                );
                Ok(linker)
            }
            Err(e) => {
                let submission_err = match e {
                    CourierError::Submission(_) => e,
                    other => CourierError::Submission(other.to_string()),
                };

                let mut state = self.state.lock().unwrap();
                state.is_loading = false;
                state.error = Some(submission_err.to_string());
                drop(state);

                metrics::record_submission("error");
                error!("Cross-chain submission failed: {}", submission_err);
                Err(submission_err)
            }
        }
    }

    /// Snapshot of the in-flight slot
    pub fn state(&self) -> SubmissionState {
        self.state.lock().unwrap().clone()
    }

    /// Reset the in-flight slot after the caller has consumed its outcome
    pub fn clear_state(&self) {
        let mut state = self.state.lock().unwrap();
        if !state.is_loading {
            *state = SubmissionState::default();
        }
    }

    /// Release the SDK handle's network resources. Idempotent.
    pub async fn cleanup(&self) {
        if let Some(handle) = self.sdk.write().await.take() {
            handle.close_connections().await;
            info!("Cross-chain SDK handle released");
        }
    }
}
