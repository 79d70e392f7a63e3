//! ============================================================================
//! Auth Module - Wallet-signature sessions
//! ============================================================================
//! Handles authentication against the remote auth service:
//! - Nonce challenge + wallet signature -> bearer token
//! ============================================================================

mod session;

pub use session::SessionEstablisher;
