//! Cross-chain SDK seam
//!
//! This module defines the narrow surface the courier consumes from the
//! external relay service:
//! - `CrossChainSdk` - submit a proxy message, returning a transaction linker
//! - `TrackerApi` - resolve an operation id and poll simplified status
//! - `SdkConnector` - create an SDK handle for a given network
//!
//! The relay's message encoding, bridging contracts and consensus are opaque
//! to this crate; everything behind these traits is remote.

pub mod http;

pub use http::{HttpSdk, HttpSdkConnector, HttpTracker};

use crate::error::CourierResult;
use crate::session::WalletHandle;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Target network for the relay service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Mainnet => write!(f, "mainnet"),
            Network::Testnet => write!(f, "testnet"),
        }
    }
}

/// Parameters for creating an SDK handle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkParams {
    pub network: Network,
}

/// EVM-bound proxy message, immutable per submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvmProxyMsg {
    pub evm_target_address: String,
    pub method_name: String,
    #[serde(with = "hex_bytes")]
    pub encoded_parameters: Vec<u8>,
}

/// Asset-bridging descriptor attached to a submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBridgingData {
    /// Jetton master address; native TON when absent
    pub address: Option<String>,
    pub raw_amount: u128,
}

/// Opaque correlation handle returned by a successful submission.
///
/// Never parsed, only passed through. The correlation key is derived by
/// serializing the whole token, not by reading fields out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionLinker(serde_json::Value);

impl TransactionLinker {
    pub fn new(raw: serde_json::Value) -> Self {
        Self(raw)
    }

    /// Stable key identifying this linker, used for tracker queries and the
    /// one-active-session-per-linker registry.
    pub fn correlation_key(&self) -> String {
        self.0.to_string()
    }
}

/// Operation identifier resolved from a transaction linker.
///
/// May not exist immediately after submission; once resolved it is stable
/// for the lifetime of the operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub String);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Simplified operation status reported by the tracker service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimplifiedStatus {
    Pending,
    Successful,
    Failed,
    OperationIdNotFound,
}

impl SimplifiedStatus {
    /// Terminal statuses stop polling
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SimplifiedStatus::Pending)
    }
}

/// Handle to the external cross-chain relay service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrossChainSdk: Send + Sync {
    /// Submit a proxy message on behalf of the given wallet, returning the
    /// transaction linker used for all subsequent tracking.
    async fn send_cross_chain_transaction(
        &self,
        msg: &EvmProxyMsg,
        sender: &WalletHandle,
        assets: &[AssetBridgingData],
    ) -> CourierResult<TransactionLinker>;

    /// Release the handle's network resources. Safe to call more than once.
    async fn close_connections(&self);
}

/// Operation tracker surface of the relay service.
///
/// `get_operation_id` returning `None` means the id has not propagated yet
/// and the caller should retry. `get_simplified_status` returning `None` is a
/// protocol violation: a live tracker always reports a status for a known
/// linker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackerApi: Send + Sync {
    async fn get_operation_id(
        &self,
        linker: &TransactionLinker,
    ) -> CourierResult<Option<OperationId>>;

    async fn get_simplified_status(
        &self,
        linker: &TransactionLinker,
    ) -> CourierResult<Option<SimplifiedStatus>>;
}

/// Factory creating SDK handles; the submission client calls this exactly
/// once per process lifetime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SdkConnector: Send + Sync {
    async fn create(&self, params: &SdkParams) -> CourierResult<Arc<dyn CrossChainSdk>>;
}

/// Hex (de)serialization for encoded call parameters, with optional 0x prefix
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        let s = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linker_key_is_stable() {
        let raw = serde_json::json!({
            "caller": "EQAbc",
            "shardsKey": "123",
            "timestamp": 1700000000,
        });
        let linker = TransactionLinker::new(raw.clone());
        assert_eq!(linker.correlation_key(), TransactionLinker::new(raw).correlation_key());
    }

    #[test]
    fn test_simplified_status_wire_format() {
        let s: SimplifiedStatus = serde_json::from_str("\"OPERATION_ID_NOT_FOUND\"").unwrap();
        assert_eq!(s, SimplifiedStatus::OperationIdNotFound);
        assert!(s.is_terminal());
        assert!(!SimplifiedStatus::Pending.is_terminal());
    }

    #[test]
    fn test_proxy_msg_hex_round_trip() {
        let msg = EvmProxyMsg {
            evm_target_address: "0xe3E475d7F7EA690875C65C30856547fcE3E28F20".to_string(),
            method_name: "forwardMessage(bytes,bytes)".to_string(),
            encoded_parameters: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"encodedParameters\":\"0xdeadbeef\""));
        let back: EvmProxyMsg = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
