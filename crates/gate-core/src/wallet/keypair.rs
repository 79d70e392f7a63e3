//! ============================================================================
//! Keypair Wallet - Local keypair file as a wallet provider
//! ============================================================================
//! Keys never leave the device: the file is read once and signing happens
//! in-process. A local key is always trusted, so trusted-only connects
//! succeed without a prompt.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_sdk::signature::{Keypair, Signer};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tracing::info;

use super::{WalletNotification, WalletProvider};
use crate::error::GateError;

const NOTIFICATION_CAPACITY: usize = 16;

pub struct KeypairWallet {
    keypair: Keypair,
    connected: AtomicBool,
    notifications: broadcast::Sender<WalletNotification>,
}

impl KeypairWallet {
    pub fn new(keypair: Keypair) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            keypair,
            connected: AtomicBool::new(false),
            notifications,
        }
    }

    /// Load a keypair file (JSON byte array, solana-keygen format)
    pub fn from_file(keypair_path: &str) -> Result<Self> {
        info!("Loading keypair from: {}", keypair_path);

        let keypair_data = std::fs::read_to_string(keypair_path)
            .map_err(|e| anyhow!("Failed to read keypair: {}", e))?;

        let bytes: Vec<u8> = serde_json::from_str(&keypair_data)
            .map_err(|e| anyhow!("Failed to parse keypair: {}", e))?;

        let keypair = Keypair::try_from(bytes.as_slice())
            .map_err(|e| anyhow!("Invalid keypair bytes: {}", e))?;

        info!("Loaded wallet: {}", keypair.pubkey());
        Ok(Self::new(keypair))
    }

    pub fn address(&self) -> String {
        self.keypair.pubkey().to_string()
    }

    /// Drop the connection and tell subscribers
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // No subscribers is fine
        let _ = self.notifications.send(WalletNotification::Disconnected);
    }
}

#[async_trait]
impl WalletProvider for KeypairWallet {
    fn name(&self) -> &str {
        "keypair"
    }

    async fn connect(&self, _trusted_only: bool) -> Result<String, GateError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(self.address())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, GateError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(GateError::ConnectionFailed("Wallet not connected".into()));
        }
        Ok(self.keypair.sign_message(message).as_ref().to_vec())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletNotification> {
        self.notifications.subscribe()
    }
}
