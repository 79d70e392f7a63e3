//! ============================================================================
//! Wallet Module - Provider discovery, selection and connection
//! ============================================================================
//! Wallet providers come and go (browser extensions inject late, users
//! uninstall them), so the adapter re-runs discovery on every access attempt
//! and picks one provider by rank.
//! ============================================================================

mod adapter;
mod keypair;

pub use adapter::{select_provider, StaticDiscovery, WalletAdapter, WalletConnection, WalletDiscovery};
pub use keypair::KeypairWallet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::GateError;

/// Provider-level notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalletNotification {
    /// Active account switched (None when the wallet hides the new key)
    AccountChanged(Option<String>),
    Disconnected,
}

/// Uniform surface over a wallet implementation
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Implementation name used for ranked selection ("phantom", "keypair", ...)
    fn name(&self) -> &str;

    /// Connect and return the public key. With `trusted_only` the provider
    /// must not prompt and only resumes a session the user already approved.
    async fn connect(&self, trusted_only: bool) -> Result<String, GateError>;

    /// Sign arbitrary bytes with the connected key
    async fn sign_message(&self, _message: &[u8]) -> Result<Vec<u8>, GateError> {
        Err(GateError::SigningUnsupported)
    }

    /// Account-change and disconnect notifications
    fn subscribe(&self) -> broadcast::Receiver<WalletNotification>;
}
