//! Configuration management for the TAC Courier
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::sdk::Network;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub courier: CourierConfig,
    pub sdk: SdkConfig,
    pub wallet: WalletConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CourierConfig {
    /// Interval between operation-id resolution attempts
    pub resolve_interval_ms: u64,
    /// Maximum operation-id resolution attempts before giving up
    pub resolve_max_attempts: u32,
    /// Interval between status polls
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SdkConfig {
    pub network: Network,
    /// Base URL of the cross-chain relay service
    pub endpoint: String,
    /// Base URL of the operation tracker service
    pub tracker_endpoint: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// TON wallet address; usually injected via ${TAC_WALLET_ADDRESS}
    pub address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("TAC_COURIER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.courier.resolve_max_attempts == 0 {
            anyhow::bail!("courier.resolve_max_attempts must be at least 1");
        }
        if self.courier.resolve_interval_ms == 0 || self.courier.poll_interval_ms == 0 {
            anyhow::bail!("courier intervals must be non-zero");
        }
        if self.sdk.endpoint.is_empty() {
            anyhow::bail!("sdk.endpoint must be configured");
        }
        if self.sdk.tracker_endpoint.is_empty() {
            anyhow::bail!("sdk.tracker_endpoint must be configured");
        }
        if self.wallet.address.is_empty() {
            anyhow::bail!(
                "wallet.address must be configured (set TAC_WALLET_ADDRESS)"
            );
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR_RE: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    }

    let mut result = input.to_string();
    for cap in ENV_VAR_RE.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
