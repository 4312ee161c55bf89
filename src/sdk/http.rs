//! HTTP implementations of the relay-service traits
//!
//! The relay service and its operation tracker are plain REST endpoints:
//! - `POST {endpoint}/transactions` submits a proxy message
//! - `GET {tracker}/operation-id?queryId=...` resolves an operation id
//! - `GET {tracker}/status?queryId=...` reports simplified status

use super::{
    AssetBridgingData, CrossChainSdk, EvmProxyMsg, Network, OperationId, SdkConnector, SdkParams,
    SimplifiedStatus, TrackerApi, TransactionLinker,
};
use crate::config::SdkConfig;
use crate::error::{CourierError, CourierResult};
use crate::session::WalletHandle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP-backed SDK handle
pub struct HttpSdk {
    http: reqwest::Client,
    endpoint: String,
    network: Network,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRequest<'a> {
    network: Network,
    sender: &'a str,
    proxy_msg: &'a EvmProxyMsg,
    assets: &'a [AssetBridgingData],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitResponse {
    transaction_linker: serde_json::Value,
}

#[async_trait]
impl CrossChainSdk for HttpSdk {
    async fn send_cross_chain_transaction(
        &self,
        msg: &EvmProxyMsg,
        sender: &WalletHandle,
        assets: &[AssetBridgingData],
    ) -> CourierResult<TransactionLinker> {
        let url = format!("{}/transactions", self.endpoint);
        let body = SubmitRequest {
            network: self.network,
            sender: &sender.address,
            proxy_msg: msg,
            assets,
        };

        debug!(target = %msg.evm_target_address, method = %msg.method_name, "Submitting proxy message");

        let res = self.http.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let detail = res.text().await.unwrap_or_default();
            return Err(CourierError::Submission(format!(
                "relay returned {}: {}",
                status, detail
            )));
        }

        let parsed: SubmitResponse = res
            .json()
            .await
            .map_err(|e| CourierError::Submission(format!("invalid relay response: {}", e)))?;

        Ok(TransactionLinker::new(parsed.transaction_linker))
    }

    async fn close_connections(&self) {
        // reqwest pools are released when the client drops; nothing to tear
        // down eagerly, but the lifecycle event is worth a log line.
        debug!("Closing relay service connections");
    }
}

/// Connector creating `HttpSdk` handles from configuration
pub struct HttpSdkConnector {
    config: SdkConfig,
}

impl HttpSdkConnector {
    pub fn new(config: SdkConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SdkConnector for HttpSdkConnector {
    async fn create(&self, params: &SdkParams) -> CourierResult<Arc<dyn CrossChainSdk>> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .build()
            .map_err(|e| CourierError::SdkInit(e.to_string()))?;

        debug!(network = %params.network, endpoint = %self.config.endpoint, "Created SDK handle");

        Ok(Arc::new(HttpSdk {
            http,
            endpoint: self.config.endpoint.trim_end_matches('/').to_string(),
            network: params.network,
        }))
    }
}

/// HTTP-backed operation tracker
pub struct HttpTracker {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTracker {
    pub fn new(config: &SdkConfig) -> CourierResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CourierError::SdkInit(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.tracker_endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationIdResponse {
    operation_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: Option<SimplifiedStatus>,
}

#[async_trait]
impl TrackerApi for HttpTracker {
    async fn get_operation_id(
        &self,
        linker: &TransactionLinker,
    ) -> CourierResult<Option<OperationId>> {
        let url = format!("{}/operation-id", self.endpoint);
        let res = self
            .http
            .get(&url)
            .query(&[("queryId", linker.correlation_key())])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(CourierError::TrackingProtocol(format!(
                "operation-id endpoint returned {}",
                res.status()
            )));
        }

        let parsed: OperationIdResponse = res
            .json()
            .await
            .map_err(|e| CourierError::TrackingProtocol(e.to_string()))?;

        Ok(parsed.operation_id.map(OperationId))
    }

    async fn get_simplified_status(
        &self,
        linker: &TransactionLinker,
    ) -> CourierResult<Option<SimplifiedStatus>> {
        let url = format!("{}/status", self.endpoint);
        let res = self
            .http
            .get(&url)
            .query(&[("queryId", linker.correlation_key())])
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(CourierError::TrackingProtocol(format!(
                "status endpoint returned {}",
                res.status()
            )));
        }

        let parsed: StatusResponse = res
            .json()
            .await
            .map_err(|e| CourierError::TrackingProtocol(e.to_string()))?;

        Ok(parsed.status)
    }
}
