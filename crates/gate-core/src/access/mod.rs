//! ============================================================================
//! Access Module - Wallet-token access gate
//! ============================================================================
//! Decides whether a visitor may enter the gated app, from a wallet identity
//! and an on-chain balance threshold.
//!
//! ## Tiers
//! - **Locked**: nothing verified yet
//! - **Connecting**: wallet connect + balance check in flight
//! - **Holder**: balance meets the configured minimum
//! - **Restricted**: below minimum (user accepted) or ledger unreachable
//! - **Trial**: unauthenticated entry
//! - **Disconnected**: transient, settles back to Locked
//!
//! ## Usage
//! ```rust,ignore
//! use gate_core::access::AccessGate;
//!
//! let gate = AccessGate::new(ctx, wallets, ledger, display, Box::new(|grant| start(grant)));
//! gate.initialize();
//! let tier = gate.connect().await?;
//! gate.enter()?;
//! ```
//! ============================================================================

mod display;
mod gate;
mod machine;
mod types;

// Re-export public types
pub use display::{bind, DisplaySurface};
pub use gate::{AccessGate, EntryCallback};
pub use machine::{transition, AccessEvent};
pub use types::{AccessSession, AccessTier, ControlState, EntryGrant};
