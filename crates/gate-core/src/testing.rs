//! In-memory ledger, wallet and display doubles shared by the unit tests

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::access::{ControlState, DisplaySurface};
use crate::error::GateError;
use crate::ledger::{AccountQuery, LedgerClient, TokenAccountRecord};
use crate::wallet::{WalletNotification, WalletProvider};

pub const MINT: &str = "6Q7EMLd1BL15TaJ5dmXa2xBoxEU4oj3MLRQd5sCpotuK";
pub const OWNER: &str = "7i5775tjSXaXut3KtahGmFTEuqY6TB3dS2BgDARdRYAd";
pub const OTHER_OWNER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";
pub const TOKEN_2022: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PH5BL8e3BZzwEmG";

pub fn record(address: &str, mint: &str, program: &str, amount: &str) -> TokenAccountRecord {
    TokenAccountRecord {
        address: address.into(),
        mint: mint.into(),
        program: program.into(),
        amount: amount.into(),
    }
}

// ============================================================================
// Ledger
// ============================================================================

pub struct MockLedger {
    decimals: Result<u8, String>,
    responses: HashMap<AccountQuery, Result<Vec<TokenAccountRecord>, String>>,
    default_response: Result<Vec<TokenAccountRecord>, String>,
    delay: Option<Duration>,
    pub mint_lookups: AtomicUsize,
    pub queries: AtomicUsize,
    pub resets: AtomicUsize,
}

impl MockLedger {
    /// Reachable ledger with no accounts
    pub fn with_decimals(decimals: u8) -> Self {
        Self {
            decimals: Ok(decimals),
            responses: HashMap::new(),
            default_response: Ok(Vec::new()),
            delay: None,
            mint_lookups: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        }
    }

    /// Every call fails
    pub fn unreachable() -> Self {
        Self {
            decimals: Err("connection refused".into()),
            default_response: Err("connection refused".into()),
            ..Self::with_decimals(0)
        }
    }

    pub fn respond(
        mut self,
        query: AccountQuery,
        response: Result<Vec<TokenAccountRecord>, String>,
    ) -> Self {
        self.responses.insert(query, response);
        self
    }

    /// Hold every account query for `delay`
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    fn endpoint(&self) -> &str {
        "mock://ledger"
    }

    async fn token_accounts_by_owner(
        &self,
        _owner: &str,
        _mint: &str,
        query: AccountQuery,
    ) -> Result<Vec<TokenAccountRecord>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(&query)
            .unwrap_or(&self.default_response)
            .clone()
            .map_err(|e| anyhow!(e))
    }

    async fn mint_decimals(&self, _mint: &str) -> Result<u8> {
        self.mint_lookups.fetch_add(1, Ordering::SeqCst);
        self.decimals.clone().map_err(|e| anyhow!(e))
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Wallet
// ============================================================================

pub struct MockWallet {
    name: String,
    identity: Mutex<String>,
    connect_error: Mutex<Option<GateError>>,
    trusted: AtomicBool,
    signing: bool,
    signed: Mutex<Vec<Vec<u8>>>,
    pub connects: AtomicUsize,
    notifications: broadcast::Sender<WalletNotification>,
}

impl MockWallet {
    pub fn new(name: &str, identity: &str) -> Self {
        let (notifications, _) = broadcast::channel(16);
        Self {
            name: name.into(),
            identity: Mutex::new(identity.into()),
            connect_error: Mutex::new(None),
            trusted: AtomicBool::new(true),
            signing: true,
            signed: Mutex::new(Vec::new()),
            connects: AtomicUsize::new(0),
            notifications,
        }
    }

    pub fn without_signing(mut self) -> Self {
        self.signing = false;
        self
    }

    /// Every connect fails with `error`
    pub fn failing(self, error: GateError) -> Self {
        *self.connect_error.lock().unwrap() = Some(error);
        self
    }

    /// No previously approved session: trusted-only connects are declined
    pub fn untrusted(self) -> Self {
        self.trusted.store(false, Ordering::SeqCst);
        self
    }

    /// Switch the active account and tell subscribers
    pub fn switch_account(&self, identity: &str) {
        *self.identity.lock().unwrap() = identity.into();
        self.notify(WalletNotification::AccountChanged(Some(identity.into())));
    }

    pub fn notify(&self, notification: WalletNotification) {
        let _ = self.notifications.send(notification);
    }

    pub fn signed_messages(&self) -> Vec<Vec<u8>> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self, trusted_only: bool) -> Result<String, GateError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.connect_error.lock().unwrap().clone() {
            return Err(error);
        }
        if trusted_only && !self.trusted.load(Ordering::SeqCst) {
            return Err(GateError::UserRejected);
        }
        Ok(self.identity.lock().unwrap().clone())
    }

    /// Echoes the message as its "signature"
    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, GateError> {
        if !self.signing {
            return Err(GateError::SigningUnsupported);
        }
        self.signed.lock().unwrap().push(message.to_vec());
        Ok(message.to_vec())
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletNotification> {
        self.notifications.subscribe()
    }
}

// ============================================================================
// Display
// ============================================================================

#[derive(Default)]
pub struct RecordingDisplay {
    pub statuses: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<Option<String>>>,
    pub loading: Mutex<Vec<bool>>,
    pub controls: Mutex<Vec<ControlState>>,
    pub network_labels: Mutex<Vec<String>>,
    pub confirmations: Mutex<Vec<String>>,
    /// Answer given to confirm_reduced_entry
    pub accept_reduced: AtomicBool,
}

impl RecordingDisplay {
    pub fn accepting() -> Self {
        let display = Self::default();
        display.accept_reduced.store(true, Ordering::SeqCst);
        display
    }

    pub fn last_status(&self) -> Option<String> {
        self.statuses.lock().unwrap().last().cloned()
    }

    /// Banners shown, ignoring clears
    pub fn banners(&self) -> Vec<String> {
        self.errors.lock().unwrap().iter().flatten().cloned().collect()
    }

    pub fn last_controls(&self) -> Option<ControlState> {
        self.controls.lock().unwrap().last().copied()
    }
}

impl DisplaySurface for RecordingDisplay {
    fn set_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.into());
    }

    fn show_error(&self, message: Option<&str>) {
        self.errors.lock().unwrap().push(message.map(str::to_string));
    }

    fn set_loading(&self, loading: bool) {
        self.loading.lock().unwrap().push(loading);
    }

    fn set_controls(&self, controls: ControlState) {
        self.controls.lock().unwrap().push(controls);
    }

    fn set_network_label(&self, label: &str) {
        self.network_labels.lock().unwrap().push(label.into());
    }

    fn confirm_reduced_entry(&self, message: &str) -> bool {
        self.confirmations.lock().unwrap().push(message.into());
        self.accept_reduced.load(Ordering::SeqCst)
    }
}
