//! Error types for the linkup orchestrator

use thiserror::Error;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum LinkupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error for chain {chain}: {message}")]
    ChainConnection { chain: String, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Deployment of {contract} failed on chain {chain}: {message}")]
    Deployment {
        chain: String,
        contract: String,
        message: String,
    },

    #[error("Linker registration failed on chain {chain}: {message}")]
    Registration { chain: String, message: String },

    #[error("Allowance approval failed on chain {chain}: {message}")]
    Allowance { chain: String, message: String },

    #[error("Transfer submission failed on chain {chain}: {message}")]
    Submission { chain: String, message: String },

    #[error("Transaction reverted on chain {chain}: {message}")]
    Reverted { chain: String, message: String },

    #[error("Gas estimation error: {0}")]
    GasEstimation(String),

    #[error("Invalid transfer: {0}")]
    InvalidTransfer(String),

    #[error("Chain {name} not found")]
    ChainNotFound { name: String },

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Settlement not observed after {polls} polls on chain {chain} (submission {submission})")]
    SettlementTimeout {
        chain: String,
        polls: u64,
        /// Submission outcome the watch ran under, so a timeout after an
        /// uncertain submission is distinguishable from one after a clean
        /// submit
        submission: &'static str,
    },

    #[error("Run cancelled during {phase}")]
    Cancelled { phase: String },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LinkupError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LinkupError::ChainConnection { .. } | LinkupError::Timeout { .. }
        )
    }

    /// Check if error means the run cannot continue
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkupError::Deployment { .. }
                | LinkupError::Registration { .. }
                | LinkupError::Allowance { .. }
                | LinkupError::Config(_)
                | LinkupError::Wallet(_)
        )
    }
}

/// Result type for orchestrator operations
pub type LinkupResult<T> = Result<T, LinkupError>;
