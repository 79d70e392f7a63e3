//! ============================================================================
//! GATE-CORE: Token-gated entry
//! ============================================================================
//! This crate handles all logic for the token gate:
//! - Wallet provider discovery, selection and connection
//! - Token balance aggregation across SPL Token and Token-2022 accounts
//! - Access tier lifecycle and entry grants
//! - Optional nonce/signature sessions against an auth service
//! - Typed event bus for decoupled observers
//! ============================================================================

pub mod access;
pub mod auth;
pub mod balance;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod ledger;
pub mod wallet;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types for convenience
pub use access::{AccessGate, AccessSession, AccessTier, DisplaySurface, EntryGrant};
pub use auth::SessionEstablisher;
pub use balance::{BalanceAggregator, BalanceSnapshot};
pub use config::{GateConfig, SwapConfig};
pub use context::GateContext;
pub use error::GateError;
pub use events::{EventBus, GateEvent, Subscription, Topic};
pub use ledger::{LedgerClient, RpcLedger};
pub use wallet::{KeypairWallet, StaticDiscovery, WalletAdapter, WalletProvider};
