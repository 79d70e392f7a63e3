//! ============================================================================
//! Gate Configuration - Options recognized by the access gate
//! ============================================================================
//! Loaded from a JSON object (camelCase keys, merged over defaults) or from
//! GATE_* environment variables. Economic parameters are carried through to
//! collaborators untouched apart from clamping; the gate decision only uses
//! the mint, the threshold and the ledger settings.
//! ============================================================================

use anyhow::{anyhow, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;
use tracing::warn;

use crate::error::GateError;

/// Default JSON-RPC endpoint
pub const DEFAULT_RPC_ENDPOINT: &str = "https://api.mainnet-beta.solana.com";

/// Default cluster label shown next to diagnostics
pub const DEFAULT_CLUSTER: &str = "mainnet-beta";

/// Default delay before probing for a trusted wallet session
pub const DEFAULT_AUTO_CONNECT_DELAY_MS: u64 = 500;

/// Default swap tax (3%)
pub const DEFAULT_SWAP_TAX_BPS: i64 = 300;

/// Marker left in template configs that were never filled in
pub const MINT_PLACEHOLDER: &str = "REPLACE_WITH";

/// Wallet implementations preferred over anything else, in rank order
pub const DEFAULT_RECOGNIZED_WALLETS: [&str; 4] = ["phantom", "solflare", "backpack", "keypair"];

/// Ledger commitment level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Commitment {
    Processed,
    #[default]
    Confirmed,
    Finalized,
}

impl Commitment {
    pub fn to_config(self) -> CommitmentConfig {
        match self {
            Commitment::Processed => CommitmentConfig::processed(),
            Commitment::Confirmed => CommitmentConfig::confirmed(),
            Commitment::Finalized => CommitmentConfig::finalized(),
        }
    }
}

impl FromStr for Commitment {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "processed" => Ok(Commitment::Processed),
            "confirmed" => Ok(Commitment::Confirmed),
            "finalized" => Ok(Commitment::Finalized),
            other => Err(anyhow!(
                "Unknown commitment '{}'. Valid values: processed, confirmed, finalized",
                other
            )),
        }
    }
}

/// Gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GateConfig {
    /// Token mint gating access (required)
    pub mint_address: String,
    pub rpc_endpoint: String,
    /// Human label for the network, used in diagnostics
    pub cluster: String,
    /// Minimum balance in whole tokens
    pub min_token_balance: Decimal,
    pub commitment: Commitment,
    /// Resume an already-trusted wallet session on load
    pub auto_connect_trusted: bool,
    pub auto_connect_delay_ms: u64,
    /// Base URL of the nonce/verify auth service. None disables sessions.
    pub auth_base_url: Option<String>,
    /// Provider names preferred during wallet selection, highest rank first
    pub recognized_wallets: Vec<String>,
    pub swap_tax_bps: i64,
    pub min_swap_amount: Decimal,
    pub treasury_address: Option<String>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            mint_address: String::new(),
            rpc_endpoint: DEFAULT_RPC_ENDPOINT.to_string(),
            cluster: DEFAULT_CLUSTER.to_string(),
            min_token_balance: Decimal::ONE,
            commitment: Commitment::default(),
            auto_connect_trusted: true,
            auto_connect_delay_ms: DEFAULT_AUTO_CONNECT_DELAY_MS,
            auth_base_url: None,
            recognized_wallets: DEFAULT_RECOGNIZED_WALLETS.iter().map(|s| s.to_string()).collect(),
            swap_tax_bps: DEFAULT_SWAP_TAX_BPS,
            min_swap_amount: Decimal::ONE,
            treasury_address: None,
        }
    }
}

/// Economic parameters forwarded to collaborators (swap widget, shop)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapConfig {
    pub mint_address: String,
    pub swap_tax_bps: u32,
    pub min_swap_amount: Decimal,
    pub treasury_address: Option<String>,
}

impl GateConfig {
    /// Parse a JSON config object; missing keys keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow!("Failed to parse gate config: {}", e))
    }

    /// Load from GATE_* environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup. Unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(mint) = lookup("GATE_MINT_ADDRESS") {
            config.mint_address = mint.trim().to_string();
        }
        if let Some(endpoint) = lookup("GATE_RPC_ENDPOINT") {
            config.rpc_endpoint = endpoint;
        }
        if let Some(cluster) = lookup("GATE_CLUSTER") {
            config.cluster = cluster;
        }
        if let Some(raw) = lookup("GATE_MIN_TOKEN_BALANCE") {
            match Decimal::from_str(raw.trim()) {
                Ok(value) => config.min_token_balance = value,
                Err(e) => warn!("Ignoring GATE_MIN_TOKEN_BALANCE={}: {}", raw, e),
            }
        }
        if let Some(raw) = lookup("GATE_COMMITMENT") {
            match Commitment::from_str(&raw) {
                Ok(value) => config.commitment = value,
                Err(e) => warn!("Ignoring GATE_COMMITMENT: {}", e),
            }
        }
        if let Some(raw) = lookup("GATE_AUTO_CONNECT_TRUSTED") {
            match raw.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => config.auto_connect_trusted = true,
                "0" | "false" | "no" | "off" => config.auto_connect_trusted = false,
                _ => warn!("Ignoring GATE_AUTO_CONNECT_TRUSTED={}", raw),
            }
        }
        if let Some(raw) = lookup("GATE_AUTO_CONNECT_DELAY_MS") {
            match raw.trim().parse::<u64>() {
                Ok(value) => config.auto_connect_delay_ms = value,
                Err(e) => warn!("Ignoring GATE_AUTO_CONNECT_DELAY_MS={}: {}", raw, e),
            }
        }
        if let Some(url) = lookup("GATE_AUTH_BASE_URL") {
            if !url.trim().is_empty() {
                config.auth_base_url = Some(url.trim().to_string());
            }
        }
        if let Some(raw) = lookup("GATE_RECOGNIZED_WALLETS") {
            config.recognized_wallets = raw
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(raw) = lookup("GATE_SWAP_TAX_BPS") {
            match raw.trim().parse::<i64>() {
                Ok(value) => config.swap_tax_bps = value,
                Err(e) => warn!("Ignoring GATE_SWAP_TAX_BPS={}: {}", raw, e),
            }
        }
        if let Some(raw) = lookup("GATE_MIN_SWAP_AMOUNT") {
            match Decimal::from_str(raw.trim()) {
                Ok(value) => config.min_swap_amount = value,
                Err(e) => warn!("Ignoring GATE_MIN_SWAP_AMOUNT={}: {}", raw, e),
            }
        }
        if let Some(treasury) = lookup("GATE_TREASURY_ADDRESS") {
            if !treasury.trim().is_empty() {
                config.treasury_address = Some(treasury.trim().to_string());
            }
        }

        config
    }

    /// Check that the gate can run at all. A missing or placeholder mint
    /// blocks connection outright.
    pub fn validate(&self) -> std::result::Result<(), GateError> {
        self.mint_pubkey().map(|_| ())
    }

    /// Parsed mint address
    pub fn mint_pubkey(&self) -> std::result::Result<Pubkey, GateError> {
        let mint = self.mint_address.trim();
        if mint.is_empty() || mint.contains(MINT_PLACEHOLDER) {
            return Err(GateError::Configuration(
                "Configure mintAddress with your token mint before going live.".into(),
            ));
        }
        Pubkey::from_str(mint)
            .map_err(|e| GateError::Configuration(format!("Invalid mintAddress '{}': {}", mint, e)))
    }

    /// Pass-through economic parameters, clamped to sane minimums
    pub fn swap_config(&self) -> SwapConfig {
        SwapConfig {
            mint_address: self.mint_address.clone(),
            swap_tax_bps: self.swap_tax_bps.clamp(0, u32::MAX as i64) as u32,
            min_swap_amount: self.min_swap_amount.max(Decimal::ONE),
            treasury_address: self.treasury_address.clone(),
        }
    }
}
