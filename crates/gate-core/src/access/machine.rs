//! ============================================================================
//! Access State Machine - Pure tier transitions
//! ============================================================================
//! `(current, event) -> next` with no IO, so the whole lifecycle can be
//! checked without a wallet, a ledger or a display. Events that make no sense
//! for the current tier leave it unchanged.
//! ============================================================================

use serde::{Deserialize, Serialize};

use super::types::AccessTier;

/// Inputs that drive the access lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessEvent {
    /// User (or auto-reconnect) started a connect attempt
    ConnectRequested,
    /// Wallet prompt declined by the user
    ConnectRejected,
    /// Wallet connection failed for any other reason
    ConnectFailed,
    /// Trusted-session probe found nothing to resume
    AutoConnectDeclined,
    /// Balance meets the threshold
    BalanceVerified,
    /// Balance read fine but is below the threshold
    BelowThreshold { confirmed: bool },
    /// Balance check itself failed (ledger unreachable)
    BalanceCheckFailed,
    /// Unauthenticated entry selected
    TrialSelected,
    /// Wallet now reports a different identity
    IdentityChanged,
    /// Wallet reported a disconnect
    WalletDisconnected,
    /// Settle a transient tier
    Reset,
}

/// Next tier for `event` in `current`
pub fn transition(current: AccessTier, event: AccessEvent) -> AccessTier {
    use AccessEvent as E;
    use AccessTier as T;

    match (current, event) {
        (T::Locked, E::ConnectRequested) => T::Connecting,
        (T::Locked, E::TrialSelected) => T::Trial,

        (T::Connecting, E::ConnectRejected)
        | (T::Connecting, E::ConnectFailed)
        | (T::Connecting, E::AutoConnectDeclined) => T::Locked,
        (T::Connecting, E::BalanceVerified) => T::Holder,
        (T::Connecting, E::BelowThreshold { confirmed: true }) => T::Restricted,
        (T::Connecting, E::BelowThreshold { confirmed: false }) => T::Locked,
        (T::Connecting, E::BalanceCheckFailed) => T::Restricted,

        // No tier is trusted across an identity change
        (_, E::IdentityChanged) => T::Locked,

        (T::Locked, E::WalletDisconnected) => T::Locked,
        (_, E::WalletDisconnected) => T::Disconnected,

        (T::Disconnected, E::Reset) => T::Locked,

        (tier, _) => tier,
    }
}
