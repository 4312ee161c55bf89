//! Error types for the TAC Courier

use thiserror::Error;

/// Main error type for the courier
#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wallet connection error: {0}")]
    Connection(String),

    #[error("Wallet disconnection error: {0}")]
    Disconnection(String),

    #[error("Cross-chain SDK initialization failed: {0}")]
    SdkInit(String),

    #[error("TON wallet not connected")]
    NotConnected,

    #[error("Cross-chain SDK not initialized")]
    NotInitialized,

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Tracker protocol violation: {0}")]
    TrackingProtocol(String),

    #[error("Operation id not resolved after {attempts} attempts")]
    ResolutionTimeout { attempts: u32 },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CourierError::Transport(_) | CourierError::Connection(_)
        )
    }

    /// Check if error is a precondition violation rather than a runtime failure
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CourierError::NotConnected | CourierError::NotInitialized
        )
    }
}

/// Result type for courier operations
pub type CourierResult<T> = Result<T, CourierError>;
