//! ============================================================================
//! Gate Errors - Failure taxonomy for the access gate
//! ============================================================================
//! Every failure the gate can observe maps to one of these variants. None of
//! them is fatal: the gate converts each into a banner, a silent fallback or
//! a diagnostic and always settles in a well-defined tier.
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Provider error code wallets use for "user declined the request"
pub const USER_REJECTED_CODE: i64 = 4001;

/// Error types for the gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum GateError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No Solana wallet detected")]
    WalletUnavailable,

    #[error("Wallet request was rejected")]
    UserRejected,

    #[error("Wallet connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Wallet does not support message signing")]
    SigningUnsupported,

    #[error("Ledger unreachable: {0}")]
    LedgerUnreachable(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    BalanceInsufficient { needed: String, available: String },

    #[error("Session unavailable: {0}")]
    SessionUnavailable(String),

    #[error("Action not allowed while {0}")]
    InvalidTransition(String),
}

impl GateError {
    /// Map a provider-level error code + message to the gate taxonomy
    pub fn from_provider_code(code: Option<i64>, message: &str) -> Self {
        match code {
            Some(USER_REJECTED_CODE) => GateError::UserRejected,
            _ => GateError::ConnectionFailed(message.to_string()),
        }
    }

    /// Whether this is a user decision rather than a fault
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, GateError::UserRejected)
    }
}
