//! ============================================================================
//! Access Types - Tiers, session state and entry grants
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::balance::BalanceSnapshot;

/// Access tiers of the gate lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessTier {
    /// Initial state, wallet not verified
    #[default]
    Locked,
    /// Wallet connect + balance check in flight
    Connecting,
    /// Balance meets the configured threshold
    Holder,
    /// Reduced entry: below threshold (confirmed by user) or ledger unreachable
    Restricted,
    /// Unauthenticated entry, wallet bypassed
    Trial,
    /// Wallet went away; immediately resets to Locked
    Disconnected,
}

impl AccessTier {
    /// Whether the gated app may be entered from this tier
    pub fn grants_entry(&self) -> bool {
        matches!(self, AccessTier::Holder | AccessTier::Restricted | AccessTier::Trial)
    }

    /// Tiers reached through a verified wallet
    pub fn is_wallet_backed(&self) -> bool {
        matches!(self, AccessTier::Holder | AccessTier::Restricted)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AccessTier::Locked => "Locked",
            AccessTier::Connecting => "Connecting",
            AccessTier::Holder => "Holder",
            AccessTier::Restricted => "Restricted",
            AccessTier::Trial => "Trial",
            AccessTier::Disconnected => "Disconnected",
        }
    }
}

impl std::fmt::Display for AccessTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Live session of one visitor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSession {
    pub identity: Option<String>,
    pub tier: AccessTier,
    /// Bearer token from the auth service, only after a successful handshake
    pub credential: Option<String>,
    pub balance: Option<BalanceSnapshot>,
    /// Entry callback already fired for this session
    pub entered: bool,
}

impl AccessSession {
    /// Back to defaults (explicit disconnect or identity change)
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Handed to the gated app when entry is granted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryGrant {
    pub tier: AccessTier,
    pub identity: Option<String>,
    pub credential: Option<String>,
}

/// Visibility of the mutually exclusive action controls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlState {
    pub connect_visible: bool,
    pub connect_enabled: bool,
    pub enter_visible: bool,
    pub trial_visible: bool,
}

impl ControlState {
    /// Controls shown for a tier
    pub fn for_tier(tier: AccessTier) -> Self {
        match tier {
            AccessTier::Holder | AccessTier::Restricted => Self {
                connect_visible: false,
                connect_enabled: false,
                enter_visible: true,
                trial_visible: false,
            },
            AccessTier::Connecting => Self {
                connect_visible: true,
                connect_enabled: false,
                enter_visible: false,
                trial_visible: true,
            },
            AccessTier::Trial => Self {
                connect_visible: false,
                connect_enabled: false,
                enter_visible: false,
                trial_visible: false,
            },
            AccessTier::Locked | AccessTier::Disconnected => Self {
                connect_visible: true,
                connect_enabled: true,
                enter_visible: false,
                trial_visible: true,
            },
        }
    }
}
