//! Wallet session management
//!
//! Wraps an external wallet-connection capability behind the
//! `WalletConnector` trait and tracks connected state locally. The connection
//! handshake itself belongs to the wallet protocol, not to this crate.

use crate::error::{CourierError, CourierResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Handle to a connected TON wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletHandle {
    pub address: String,
}

/// External wallet-connection capability
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn connect(&self) -> CourierResult<WalletHandle>;
    async fn disconnect(&self) -> CourierResult<()>;
}

/// Connector for headless use: the wallet address is supplied through
/// configuration and connection is a formality. Interactive deployments plug
/// in a real wallet-protocol connector instead.
pub struct StaticWalletConnector {
    address: String,
}

impl StaticWalletConnector {
    pub fn new(address: String) -> Self {
        Self { address }
    }
}

#[async_trait]
impl WalletConnector for StaticWalletConnector {
    async fn connect(&self) -> CourierResult<WalletHandle> {
        if self.address.is_empty() {
            return Err(CourierError::Config(
                "no wallet address configured".to_string(),
            ));
        }
        Ok(WalletHandle {
            address: self.address.clone(),
        })
    }

    async fn disconnect(&self) -> CourierResult<()> {
        Ok(())
    }
}

/// Tracks the current wallet session
pub struct SessionManager {
    connector: Arc<dyn WalletConnector>,
    wallet: RwLock<Option<WalletHandle>>,
}

impl SessionManager {
    pub fn new(connector: Arc<dyn WalletConnector>) -> Self {
        Self {
            connector,
            wallet: RwLock::new(None),
        }
    }

    /// Connect the wallet. Idempotent: an already-connected session is
    /// returned as-is without re-triggering the handshake.
    pub async fn connect(&self) -> CourierResult<WalletHandle> {
        if let Some(existing) = self.wallet.read().await.clone() {
            return Ok(existing);
        }

        let handle = self.connector.connect().await.map_err(|e| {
            warn!("Wallet connection failed: {}", e);
            match e {
                CourierError::Connection(_) => e,
                other => CourierError::Connection(other.to_string()),
            }
        })?;

        info!(address = %mask_address(&handle.address), "Wallet connected");
        *self.wallet.write().await = Some(handle.clone());
        Ok(handle)
    }

    /// Disconnect the wallet. Local state is cleared only after the connector
    /// confirms teardown, so a failed disconnect never looks like success.
    pub async fn disconnect(&self) -> CourierResult<()> {
        if self.wallet.read().await.is_none() {
            return Ok(());
        }

        self.connector.disconnect().await.map_err(|e| {
            warn!("Wallet disconnection failed: {}", e);
            match e {
                CourierError::Disconnection(_) => e,
                other => CourierError::Disconnection(other.to_string()),
            }
        })?;

        *self.wallet.write().await = None;
        info!("Wallet disconnected");
        Ok(())
    }

    pub async fn connected(&self) -> bool {
        self.wallet.read().await.is_some()
    }

    pub async fn wallet(&self) -> Option<WalletHandle> {
        self.wallet.read().await.clone()
    }

    /// Masked form of the connected wallet address for display
    pub async fn display_address(&self) -> Option<String> {
        self.wallet
            .read()
            .await
            .as_ref()
            .map(|w| mask_address(&w.address))
    }
}

/// Mask an address as `first6...last6`. Applies to the full address only;
/// addresses short enough to show in full are returned unchanged.
pub fn mask_address(address: &str) -> String {
    if address.len() <= 12 {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 6..])
}
