//! ============================================================================
//! Event Bus - Typed publish/subscribe for gate notifications
//! ============================================================================
//! Decouples the access gate from everything that reacts to it (display
//! binding, the gated app, swap widgets). Delivery is synchronous and in
//! subscription order; a listener registered during a publish only sees the
//! next event.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::trace;

use crate::access::AccessTier;
use crate::balance::{BalanceSnapshot, QueryDiagnostic};
use crate::config::SwapConfig;

/// Event topics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    AccessUpdate,
    Connected,
    Disconnected,
    Session,
    BalanceUpdate,
    BalanceLedger,
    BalanceDiagnostics,
    SwapConfig,
    TrialStarted,
    CurrencyUpdate,
}

impl Topic {
    pub fn name(&self) -> &'static str {
        match self {
            Topic::AccessUpdate => "access-update",
            Topic::Connected => "connected",
            Topic::Disconnected => "disconnected",
            Topic::Session => "session",
            Topic::BalanceUpdate => "balance-update",
            Topic::BalanceLedger => "balance-ledger",
            Topic::BalanceDiagnostics => "balance-diagnostics",
            Topic::SwapConfig => "swap-config",
            Topic::TrialStarted => "trial-started",
            Topic::CurrencyUpdate => "currency-update",
        }
    }
}

/// Event payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "kebab-case")]
pub enum GateEvent {
    AccessUpdate {
        tier: AccessTier,
        identity: Option<String>,
    },
    Connected {
        identity: String,
        provider: String,
    },
    Disconnected {
        identity: Option<String>,
    },
    Session {
        identity: String,
        token: Option<String>,
    },
    BalanceUpdate(BalanceSnapshot),
    /// Raw ledger view of the balance: smallest-unit amount plus scale
    BalanceLedger {
        identity: String,
        mint: String,
        raw_amount: String,
        decimals: u8,
        programs: Vec<String>,
    },
    BalanceDiagnostics {
        identity: String,
        diagnostics: Vec<QueryDiagnostic>,
    },
    SwapConfig(SwapConfig),
    TrialStarted,
    /// Auxiliary in-app currency, published by collaborators
    CurrencyUpdate {
        symbol: String,
        amount: String,
    },
}

impl GateEvent {
    pub fn topic(&self) -> Topic {
        match self {
            GateEvent::AccessUpdate { .. } => Topic::AccessUpdate,
            GateEvent::Connected { .. } => Topic::Connected,
            GateEvent::Disconnected { .. } => Topic::Disconnected,
            GateEvent::Session { .. } => Topic::Session,
            GateEvent::BalanceUpdate(_) => Topic::BalanceUpdate,
            GateEvent::BalanceLedger { .. } => Topic::BalanceLedger,
            GateEvent::BalanceDiagnostics { .. } => Topic::BalanceDiagnostics,
            GateEvent::SwapConfig(_) => Topic::SwapConfig,
            GateEvent::TrialStarted => Topic::TrialStarted,
            GateEvent::CurrencyUpdate { .. } => Topic::CurrencyUpdate,
        }
    }
}

type Listener = Arc<dyn Fn(&GateEvent) + Send + Sync>;

struct Registration {
    id: u64,
    topic: Option<Topic>,
    listener: Listener,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    listeners: Vec<Registration>,
}

/// Synchronous publish/subscribe bus. Cloning shares the same registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Handle returned by `subscribe`; call `unsubscribe` to stop delivery.
/// Dropping the handle keeps the listener registered.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(registry) = self.registry.upgrade() {
            let mut registry = registry.lock().unwrap_or_else(PoisonError::into_inner);
            registry.listeners.retain(|r| r.id != self.id);
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn register(&self, topic: Option<Topic>, listener: Listener) -> Subscription {
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.listeners.push(Registration { id, topic, listener });
        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Listen to a single topic
    pub fn subscribe<F>(&self, topic: Topic, listener: F) -> Subscription
    where
        F: Fn(&GateEvent) + Send + Sync + 'static,
    {
        self.register(Some(topic), Arc::new(listener))
    }

    /// Listen to every topic
    pub fn subscribe_all<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&GateEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(listener))
    }

    /// Deliver an event to every listener registered right now.
    /// Listeners run outside the registry lock so they may publish or
    /// (un)subscribe themselves.
    pub fn publish(&self, event: GateEvent) {
        let topic = event.topic();
        let targets: Vec<Listener> = self
            .lock()
            .listeners
            .iter()
            .filter(|r| r.topic.map_or(true, |t| t == topic))
            .map(|r| Arc::clone(&r.listener))
            .collect();

        trace!(topic = topic.name(), listeners = targets.len(), "publishing gate event");

        for listener in targets {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }
}
