//! ============================================================================
//! Access Gate - Wallet connect, balance verification and entry
//! ============================================================================
//! Owns the live `AccessSession` and drives it through `transition`:
//!
//!   connect -> wallet adapter -> balance aggregator -> tier -> session
//!
//! Nothing here can be cancelled, so every attempt takes a generation number
//! and re-checks it after each await. Identity changes and disconnects bump
//! the generation, which turns any in-flight result stale.
//! ============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::display::{bind, DisplaySurface};
use super::machine::{transition, AccessEvent};
use super::types::{AccessSession, AccessTier, EntryGrant};
use crate::auth::SessionEstablisher;
use crate::balance::{BalanceAggregator, BalanceSnapshot};
use crate::context::GateContext;
use crate::error::GateError;
use crate::events::{GateEvent, Subscription};
use crate::ledger::LedgerClient;
use crate::wallet::{WalletAdapter, WalletConnection, WalletNotification, WalletProvider};

/// Called once per successful entry into the gated app
pub type EntryCallback = Box<dyn Fn(EntryGrant) + Send + Sync>;

/// Clears the loading flag however the attempt ends
struct LoadingGuard<'a> {
    gate: &'a AccessGate,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.gate.loading.store(false, Ordering::SeqCst);
        self.gate.display.set_loading(false);
    }
}

pub struct AccessGate {
    ctx: GateContext,
    wallets: WalletAdapter,
    balances: BalanceAggregator,
    sessions: SessionEstablisher,
    display: Arc<dyn DisplaySurface>,
    on_entry: EntryCallback,
    state: Mutex<AccessSession>,
    provider: Mutex<Option<Arc<dyn WalletProvider>>>,
    binding: Mutex<Option<Subscription>>,
    generation: AtomicU64,
    loading: AtomicBool,
}

impl AccessGate {
    pub fn new(
        ctx: GateContext,
        wallets: WalletAdapter,
        ledger: Arc<dyn LedgerClient>,
        display: Arc<dyn DisplaySurface>,
        on_entry: EntryCallback,
    ) -> Self {
        Self {
            balances: BalanceAggregator::new(ctx.clone(), ledger),
            sessions: SessionEstablisher::new(&ctx),
            ctx,
            wallets,
            display,
            on_entry,
            state: Mutex::new(AccessSession::default()),
            provider: Mutex::new(None),
            binding: Mutex::new(None),
            generation: AtomicU64::new(0),
            loading: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, AccessSession> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn provider_slot(&self) -> MutexGuard<'_, Option<Arc<dyn WalletProvider>>> {
        self.provider.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the live session
    pub fn session(&self) -> AccessSession {
        self.state().clone()
    }

    pub fn tier(&self) -> AccessTier {
        self.state().tier
    }

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    /// Notifications from the wallet that produced the current identity
    pub fn notifications(&self) -> Option<broadcast::Receiver<WalletNotification>> {
        self.provider_slot().as_ref().map(|p| p.subscribe())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Invalidate every in-flight attempt, returning the new generation
    fn bump_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn publish_tier(&self, tier: AccessTier, identity: Option<String>) {
        info!("Access tier -> {}", tier);
        self.ctx.bus.publish(GateEvent::AccessUpdate { tier, identity });
    }

    /// Apply `event` to the current tier; publishes only on change
    fn apply(&self, event: AccessEvent) -> AccessTier {
        let (previous, next, identity) = {
            let mut state = self.state();
            let previous = state.tier;
            state.tier = transition(previous, event);
            (previous, state.tier, state.identity.clone())
        };

        if previous != next {
            debug!("{:?}: {} -> {}", event, previous, next);
            self.publish_tier(next, identity);
        }
        next
    }

    fn prompt(&self) -> String {
        format!(
            "Connect a wallet holding at least {} tokens to enter",
            self.balances.threshold().normalize()
        )
    }

    /// Bind the display, announce network and economics, settle in Locked
    pub fn initialize(&self) {
        {
            let mut binding = self.binding.lock().unwrap_or_else(PoisonError::into_inner);
            if binding.is_none() {
                *binding = Some(bind(&self.ctx.bus, Arc::clone(&self.display)));
            }
        }

        let config = &self.ctx.config;
        self.display.set_network_label(&format!(
            "{} ({})",
            config.cluster,
            self.balances.endpoint()
        ));
        self.ctx.bus.publish(GateEvent::SwapConfig(config.swap_config()));

        let (tier, identity) = {
            let state = self.state();
            (state.tier, state.identity.clone())
        };
        self.publish_tier(tier, identity);

        match config.validate() {
            Ok(()) => self.display.set_status(&self.prompt()),
            Err(e) => {
                warn!("Gate misconfigured: {}", e);
                self.display.show_error(Some(&e.to_string()));
                self.display.set_status("Token gate is not configured");
            }
        }
    }

    /// User-initiated connect: prompts the wallet and reports every outcome
    pub async fn connect(&self) -> Result<AccessTier, GateError> {
        self.attempt(false).await
    }

    /// Resume a previously approved wallet session after the configured
    /// delay. Refusals and failures are silent.
    pub async fn auto_connect(&self) -> AccessTier {
        let config = &self.ctx.config;
        if !config.auto_connect_trusted || config.validate().is_err() {
            return self.tier();
        }

        tokio::time::sleep(Duration::from_millis(config.auto_connect_delay_ms)).await;

        if self.tier() != AccessTier::Locked || self.is_loading() {
            debug!("Skipping auto-connect in {}", self.tier());
            return self.tier();
        }

        match self.attempt(true).await {
            Ok(tier) => tier,
            Err(e) => {
                debug!("Auto-connect declined: {}", e);
                self.tier()
            }
        }
    }

    async fn attempt(&self, trusted_only: bool) -> Result<AccessTier, GateError> {
        if let Err(e) = self.ctx.config.validate() {
            if !trusted_only {
                self.display.show_error(Some(&e.to_string()));
            }
            return Err(e);
        }

        if self.loading.swap(true, Ordering::SeqCst) {
            return Err(GateError::InvalidTransition("a connect attempt is in progress".into()));
        }
        let loading = LoadingGuard { gate: self };

        if self.apply(AccessEvent::ConnectRequested) != AccessTier::Connecting {
            return Err(GateError::InvalidTransition(self.tier().display_name().into()));
        }

        let generation = self.bump_generation();
        self.display.set_loading(true);
        if !trusted_only {
            self.display.show_error(None);
        }
        self.display.set_status("Connecting wallet...");

        let connection = match self.wallets.connect(trusted_only).await {
            Ok(connection) => connection,
            Err(e) => {
                if self.is_current(generation) {
                    self.connect_failed(&e, trusted_only);
                }
                return Err(e);
            }
        };
        if !self.is_current(generation) {
            return Ok(self.tier());
        }

        let WalletConnection { provider, identity } = connection;
        info!("Wallet connected via {}: {}", provider.name(), identity);
        self.state().identity = Some(identity.clone());
        *self.provider_slot() = Some(Arc::clone(&provider));
        self.ctx.bus.publish(GateEvent::Connected {
            identity: identity.clone(),
            provider: provider.name().to_string(),
        });
        self.display.set_status("Checking token balance...");

        let snapshot = self.balances.snapshot(&identity).await;
        if !self.is_current(generation) {
            debug!("Discarding stale balance result for {}", identity);
            return Ok(self.tier());
        }

        self.state().balance = Some(snapshot.clone());
        self.ctx.bus.publish(GateEvent::BalanceUpdate(snapshot.clone()));

        let tier = self.settle(&snapshot)?;

        // Loading ends once the tier is decided
        drop(loading);

        if tier == AccessTier::Holder && self.sessions.is_enabled() {
            let token = self.sessions.establish(&identity, provider.as_ref()).await;
            if !self.is_current(generation) {
                return Ok(self.tier());
            }
            self.state().credential = token.clone();
            self.ctx.bus.publish(GateEvent::Session { identity, token });
        }

        Ok(self.tier())
    }

    fn connect_failed(&self, error: &GateError, trusted_only: bool) {
        if trusted_only {
            self.apply(AccessEvent::AutoConnectDeclined);
            self.display.set_status(&self.prompt());
            return;
        }

        match error {
            error if error.is_user_rejection() => {
                info!("Wallet connection rejected by user");
                self.apply(AccessEvent::ConnectRejected);
                self.display.set_status("Connection request was rejected");
            }
            GateError::WalletUnavailable => {
                self.apply(AccessEvent::ConnectFailed);
                self.display
                    .show_error(Some("No Solana wallet detected. Install a wallet to continue."));
                self.display.set_status(&self.prompt());
            }
            other => {
                warn!("Wallet connection failed: {}", other);
                self.apply(AccessEvent::ConnectFailed);
                self.display
                    .show_error(Some("Failed to connect wallet. Please try again."));
                self.display.set_status(&self.prompt());
            }
        }
    }

    /// Tier from a fresh snapshot. A declined shortfall is
    /// `BalanceInsufficient`.
    fn settle(&self, snapshot: &BalanceSnapshot) -> Result<AccessTier, GateError> {
        let cluster = &self.ctx.config.cluster;

        if snapshot.is_ledger_failure() {
            warn!("Balance check failed for {}: {:?}", snapshot.identity, snapshot.error);
            let tier = self.apply(AccessEvent::BalanceCheckFailed);
            self.display.show_error(Some(
                &snapshot.failure_report(cluster, self.balances.endpoint()),
            ));
            self.display
                .set_status("Balance could not be verified. Continuing with restricted access.");
            return Ok(tier);
        }

        let Some(shortfall) = snapshot.shortfall() else {
            let tier = self.apply(AccessEvent::BalanceVerified);
            self.display
                .set_status(&format!("Verified: {} tokens", snapshot.decimal_value));
            return Ok(tier);
        };

        info!("{} is short: {}", snapshot.identity, shortfall);
        let report = snapshot.shortfall_report(cluster);
        let confirmed = self.display.confirm_reduced_entry(&report);
        let tier = self.apply(AccessEvent::BelowThreshold { confirmed });

        if confirmed {
            self.display.set_status(&format!(
                "Restricted access: {} of {} tokens",
                snapshot.decimal_value, snapshot.threshold
            ));
            Ok(tier)
        } else {
            self.display.show_error(Some(&report));
            self.display.set_status(&self.prompt());
            Err(shortfall)
        }
    }

    /// Unauthenticated entry, bypassing the wallet
    pub fn enter_trial(&self) -> Result<EntryGrant, GateError> {
        if self.is_loading() {
            return Err(GateError::InvalidTransition("a connect attempt is in progress".into()));
        }
        let current = self.tier();
        if current != AccessTier::Locked || self.apply(AccessEvent::TrialSelected) != AccessTier::Trial {
            return Err(GateError::InvalidTransition(current.display_name().into()));
        }

        info!("Trial access started");
        self.ctx.bus.publish(GateEvent::TrialStarted);
        self.enter()
    }

    /// Hand the session to the gated app. Fires the entry callback once.
    pub fn enter(&self) -> Result<EntryGrant, GateError> {
        let grant = {
            let mut state = self.state();
            if !state.tier.grants_entry() {
                return Err(GateError::InvalidTransition(state.tier.display_name().into()));
            }
            if state.entered {
                return Err(GateError::InvalidTransition("already entered".into()));
            }
            state.entered = true;
            EntryGrant {
                tier: state.tier,
                identity: state.identity.clone(),
                credential: state.credential.clone(),
            }
        };

        info!("Entering as {}", grant.tier);
        (self.on_entry)(grant.clone());
        Ok(grant)
    }

    pub async fn handle_wallet_notification(&self, notification: WalletNotification) {
        match notification {
            WalletNotification::AccountChanged(next) => self.identity_changed(next).await,
            WalletNotification::Disconnected => self.disconnected().await,
        }
    }

    async fn identity_changed(&self, next: Option<String>) {
        let (previous, from) = {
            let state = self.state();
            (state.identity.clone(), state.tier)
        };

        if previous.is_none() && from == AccessTier::Locked {
            debug!("Account change with nothing to lock, ignoring");
            return;
        }
        if next.is_some() && next == previous {
            debug!("Account change to the same identity, ignoring");
            return;
        }

        self.bump_generation();
        info!("Wallet identity changed: {:?} -> {:?}", previous, next);

        let to = {
            let mut state = self.state();
            state.reset();
            state.tier = transition(from, AccessEvent::IdentityChanged);
            state.tier
        };
        if from != to {
            self.publish_tier(to, None);
        }
        self.display.show_error(None);
        self.display
            .set_status("Wallet account changed. Connect again to continue.");

        self.balances.invalidate().await;
    }

    async fn disconnected(&self) {
        self.bump_generation();

        let (previous, to) = {
            let mut state = self.state();
            let previous = state.identity.clone();
            let to = transition(state.tier, AccessEvent::WalletDisconnected);
            state.reset();
            state.tier = to;
            (previous, to)
        };
        *self.provider_slot() = None;

        info!("Wallet disconnected: {:?}", previous);
        self.ctx.bus.publish(GateEvent::Disconnected {
            identity: previous,
        });

        if to == AccessTier::Disconnected {
            self.publish_tier(to, None);
            self.apply(AccessEvent::Reset);
        }
        self.display.set_status("Wallet disconnected");

        self.balances.invalidate().await;
    }

    /// Feed provider notifications into the gate until the channel closes
    pub async fn watch(&self, mut notifications: broadcast::Receiver<WalletNotification>) {
        loop {
            match notifications.recv().await {
                Ok(notification) => self.handle_wallet_notification(notification).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} wallet notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Wallet notification channel closed");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::events::Topic;
    use crate::ledger::AccountQuery;
    use crate::testing::{
        record, MockLedger, MockWallet, RecordingDisplay, MINT, OTHER_OWNER, OWNER, TOKEN_PROGRAM,
    };
    use crate::wallet::StaticDiscovery;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Harness {
        gate: Arc<AccessGate>,
        wallet: Arc<MockWallet>,
        ledger: Arc<MockLedger>,
        display: Arc<RecordingDisplay>,
        entries: Arc<Mutex<Vec<EntryGrant>>>,
        events: Arc<Mutex<Vec<GateEvent>>>,
    }

    impl Harness {
        fn new(config: GateConfig, wallet: MockWallet, ledger: MockLedger, display: RecordingDisplay) -> Self {
            let ctx = GateContext::new(config);

            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            let _ = ctx.bus.subscribe_all(move |event| sink.lock().unwrap().push(event.clone()));

            let wallet = Arc::new(wallet);
            let provider: Arc<dyn WalletProvider> = wallet.clone();
            let discovery = Arc::new(StaticDiscovery::new(vec![provider]));
            let adapter = WalletAdapter::new(discovery, ctx.config.recognized_wallets.clone());

            let ledger = Arc::new(ledger);
            let display = Arc::new(display);
            let entries = Arc::new(Mutex::new(Vec::new()));
            let entered = Arc::clone(&entries);

            let gate = AccessGate::new(
                ctx,
                adapter,
                ledger.clone(),
                display.clone(),
                Box::new(move |grant| entered.lock().unwrap().push(grant)),
            );
            gate.initialize();

            Self {
                gate: Arc::new(gate),
                wallet,
                ledger,
                display,
                entries,
                events,
            }
        }

        fn tiers(&self) -> Vec<AccessTier> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e {
                    GateEvent::AccessUpdate { tier, .. } => Some(*tier),
                    _ => None,
                })
                .collect()
        }

        fn count(&self, topic: Topic) -> usize {
            self.events.lock().unwrap().iter().filter(|e| e.topic() == topic).count()
        }
    }

    fn config() -> GateConfig {
        GateConfig {
            mint_address: MINT.into(),
            ..Default::default()
        }
    }

    fn holding(raw: &str) -> MockLedger {
        MockLedger::with_decimals(9)
            .respond(AccountQuery::ByMint, Ok(vec![record("acct-1", MINT, TOKEN_PROGRAM, raw)]))
            .respond(AccountQuery::TokenProgram, Ok(vec![record("acct-1", MINT, TOKEN_PROGRAM, raw)]))
    }

    fn harness(ledger: MockLedger) -> Harness {
        Harness::new(config(), MockWallet::new("phantom", OWNER), ledger, RecordingDisplay::default())
    }

    #[tokio::test]
    async fn test_initialize_announces_network_and_economics() {
        let h = harness(holding("0"));

        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert_eq!(h.count(Topic::SwapConfig), 1);
        assert_eq!(h.tiers(), vec![AccessTier::Locked]);
        assert_eq!(
            h.display.network_labels.lock().unwrap().clone(),
            vec!["mainnet-beta (mock://ledger)".to_string()]
        );
        assert!(h.display.last_controls().unwrap().connect_visible);
        assert!(h.display.last_status().unwrap().contains("at least 1 tokens"));
    }

    #[tokio::test]
    async fn test_full_balance_grants_holder() {
        let h = harness(holding("1000000000"));

        let tier = h.gate.connect().await.unwrap();
        assert_eq!(tier, AccessTier::Holder);
        assert_eq!(h.tiers(), vec![AccessTier::Locked, AccessTier::Connecting, AccessTier::Holder]);

        let session = h.gate.session();
        assert_eq!(session.identity.as_deref(), Some(OWNER));
        assert_eq!(session.balance.unwrap().decimal_value, "1");
        assert!(session.credential.is_none());

        let controls = h.display.last_controls().unwrap();
        assert!(controls.enter_visible && !controls.connect_visible);
        assert!(!h.gate.is_loading());
        assert_eq!(h.display.loading.lock().unwrap().last(), Some(&false));
    }

    #[tokio::test]
    async fn test_half_balance_confirmed_is_restricted() {
        let h = Harness::new(
            config(),
            MockWallet::new("phantom", OWNER),
            holding("500000000"),
            RecordingDisplay::accepting(),
        );

        assert_eq!(h.gate.connect().await.unwrap(), AccessTier::Restricted);
        let confirmations = h.display.confirmations.lock().unwrap().clone();
        assert_eq!(confirmations.len(), 1);
        assert!(confirmations[0].contains("0.5"));
        assert!(h.display.banners().is_empty());
    }

    #[tokio::test]
    async fn test_half_balance_declined_locks_with_banner() {
        let h = harness(holding("500000000"));

        assert_eq!(
            h.gate.connect().await,
            Err(GateError::BalanceInsufficient {
                needed: "1".into(),
                available: "0.5".into(),
            })
        );
        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert!(!h.gate.is_loading());
        let banners = h.display.banners();
        assert_eq!(banners.len(), 1);
        assert!(banners[0].contains("below the required 1"));
        assert!(h.gate.enter().is_err());
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_restricted_with_diagnostics() {
        let h = harness(MockLedger::unreachable());

        assert_eq!(h.gate.connect().await.unwrap(), AccessTier::Restricted);
        let banners = h.display.banners();
        assert!(banners[0].contains("Unable to verify token holdings on mainnet-beta"));
        assert!(banners[0].contains("Token-2022 Program: connection refused"));
        assert!(h.display.confirmations.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_user_rejection_has_no_banner() {
        let h = Harness::new(
            config(),
            MockWallet::new("phantom", OWNER).failing(GateError::from_provider_code(Some(4001), "User rejected")),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        assert_eq!(h.gate.connect().await, Err(GateError::UserRejected));
        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert!(h.display.banners().is_empty());
        assert_eq!(h.display.last_status().unwrap(), "Connection request was rejected");
        assert_eq!(h.ledger.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_connection_failure_shows_banner() {
        let h = Harness::new(
            config(),
            MockWallet::new("phantom", OWNER).failing(GateError::ConnectionFailed("timeout".into())),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        assert!(h.gate.connect().await.is_err());
        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert_eq!(h.display.banners(), vec!["Failed to connect wallet. Please try again.".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_mint_blocks_connect() {
        let h = Harness::new(
            GateConfig::default(),
            MockWallet::new("phantom", OWNER),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        assert!(matches!(h.gate.connect().await, Err(GateError::Configuration(_))));
        assert_eq!(h.wallet.connects.load(Ordering::SeqCst), 0);
        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert!(!h.display.banners().is_empty());
    }

    #[tokio::test]
    async fn test_session_established_for_holder() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/nonce"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nonce": "abc" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "bearer-1" })))
            .mount(&server)
            .await;

        let h = Harness::new(
            GateConfig {
                auth_base_url: Some(server.uri()),
                ..config()
            },
            MockWallet::new("phantom", OWNER),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        assert_eq!(h.gate.connect().await.unwrap(), AccessTier::Holder);
        assert_eq!(h.gate.session().credential.as_deref(), Some("bearer-1"));

        let grant = h.gate.enter().unwrap();
        assert_eq!(grant.credential.as_deref(), Some("bearer-1"));
        assert_eq!(h.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_verify_failure_keeps_holder_without_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/nonce"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nonce": "abc" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/verify"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let h = Harness::new(
            GateConfig {
                auth_base_url: Some(server.uri()),
                ..config()
            },
            MockWallet::new("phantom", OWNER),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        assert_eq!(h.gate.connect().await.unwrap(), AccessTier::Holder);
        assert!(h.gate.session().credential.is_none());

        let sessions: Vec<GateEvent> = h
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.topic() == Topic::Session)
            .cloned()
            .collect();
        assert!(matches!(&sessions[..], [GateEvent::Session { token: None, .. }]));
        assert!(h.display.banners().is_empty());
    }

    #[tokio::test]
    async fn test_loading_cleared_before_session_handshake() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/nonce"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "nonce": "abc" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/auth/verify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "bearer-1" })))
            .mount(&server)
            .await;

        let h = Harness::new(
            GateConfig {
                auth_base_url: Some(server.uri()),
                ..config()
            },
            MockWallet::new("phantom", OWNER),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        let display = Arc::clone(&h.display);
        let loading_at_session = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&loading_at_session);
        let _sub = h.gate.ctx.bus.subscribe(Topic::Session, move |_| {
            sink.lock().unwrap().push(display.loading.lock().unwrap().last().copied());
        });

        assert_eq!(h.gate.connect().await.unwrap(), AccessTier::Holder);
        assert_eq!(*loading_at_session.lock().unwrap(), vec![Some(false)]);
    }

    #[tokio::test]
    async fn test_enter_fires_once() {
        let h = harness(holding("1000000000"));
        h.gate.connect().await.unwrap();

        let grant = h.gate.enter().unwrap();
        assert_eq!(grant.tier, AccessTier::Holder);
        assert_eq!(grant.identity.as_deref(), Some(OWNER));
        assert!(h.gate.enter().is_err());
        assert_eq!(h.entries.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trial_entry() {
        let h = harness(holding("0"));

        let grant = h.gate.enter_trial().unwrap();
        assert_eq!(grant.tier, AccessTier::Trial);
        assert!(grant.identity.is_none());
        assert_eq!(h.count(Topic::TrialStarted), 1);
        assert_eq!(h.entries.lock().unwrap().clone(), vec![grant]);

        // Trial is terminal for this session
        assert!(h.gate.enter_trial().is_err());
        assert!(h.gate.connect().await.is_err());
    }

    #[tokio::test]
    async fn test_disconnect_clears_session() {
        let h = harness(holding("1000000000"));
        h.gate.connect().await.unwrap();

        h.gate
            .handle_wallet_notification(WalletNotification::Disconnected)
            .await;

        let session = h.gate.session();
        assert_eq!(session.tier, AccessTier::Locked);
        assert!(session.identity.is_none());
        assert!(session.credential.is_none());
        assert!(session.balance.is_none());
        assert!(h.gate.notifications().is_none());

        let tiers = h.tiers();
        assert_eq!(&tiers[tiers.len() - 2..], &[AccessTier::Disconnected, AccessTier::Locked]);
        assert_eq!(h.count(Topic::Disconnected), 1);
        assert!(h.display.last_controls().unwrap().connect_enabled);
        assert_eq!(h.ledger.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_change_locks_and_invalidates() {
        let h = harness(holding("1000000000"));
        h.gate.connect().await.unwrap();

        h.gate
            .handle_wallet_notification(WalletNotification::AccountChanged(Some(OTHER_OWNER.into())))
            .await;

        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert!(h.gate.session().identity.is_none());
        assert_eq!(h.ledger.resets.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_identity_change_ends_trial() {
        let h = harness(holding("0"));
        h.gate.enter_trial().unwrap();

        h.gate
            .handle_wallet_notification(WalletNotification::AccountChanged(Some(OTHER_OWNER.into())))
            .await;

        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert_eq!(h.tiers().last(), Some(&AccessTier::Locked));
        assert!(!h.gate.session().entered);
    }

    #[tokio::test]
    async fn test_identity_change_while_locked_without_wallet_ignored() {
        let h = harness(holding("0"));

        h.gate
            .handle_wallet_notification(WalletNotification::AccountChanged(Some(OTHER_OWNER.into())))
            .await;

        assert_eq!(h.tiers(), vec![AccessTier::Locked]);
        assert_eq!(h.ledger.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_same_identity_notification_ignored() {
        let h = harness(holding("1000000000"));
        h.gate.connect().await.unwrap();

        h.gate
            .handle_wallet_notification(WalletNotification::AccountChanged(Some(OWNER.into())))
            .await;

        assert_eq!(h.gate.tier(), AccessTier::Holder);
        assert_eq!(h.ledger.resets.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_balance_discarded_after_identity_change() {
        let h = harness(holding("1000000000").delayed(Duration::from_millis(100)));

        let gate = Arc::clone(&h.gate);
        let (result, _) = tokio::join!(h.gate.connect(), async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            gate.handle_wallet_notification(WalletNotification::AccountChanged(Some(OTHER_OWNER.into())))
                .await;
        });

        assert_eq!(result.unwrap(), AccessTier::Locked);
        let session = h.gate.session();
        assert!(session.balance.is_none());
        assert!(session.identity.is_none());
        assert_eq!(h.count(Topic::BalanceUpdate), 0);
        assert!(!h.tiers().contains(&AccessTier::Holder));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reentrant_connect_rejected() {
        let h = harness(holding("1000000000").delayed(Duration::from_millis(100)));

        let (first, second) = tokio::join!(h.gate.connect(), h.gate.connect());
        assert_eq!(first.unwrap(), AccessTier::Holder);
        assert!(matches!(second, Err(GateError::InvalidTransition(_))));
        assert_eq!(h.wallet.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_connect_resumes_trusted_wallet() {
        let h = harness(holding("1000000000"));

        assert_eq!(h.gate.auto_connect().await, AccessTier::Holder);
        assert_eq!(h.wallet.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_connect_declined_is_silent() {
        let h = Harness::new(
            config(),
            MockWallet::new("phantom", OWNER).untrusted(),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        assert_eq!(h.gate.auto_connect().await, AccessTier::Locked);
        assert!(h.display.banners().is_empty());
        assert!(h.display.last_status().unwrap().contains("Connect a wallet"));
    }

    #[tokio::test]
    async fn test_auto_connect_disabled() {
        let h = Harness::new(
            GateConfig {
                auto_connect_trusted: false,
                ..config()
            },
            MockWallet::new("phantom", OWNER),
            holding("1000000000"),
            RecordingDisplay::default(),
        );

        assert_eq!(h.gate.auto_connect().await, AccessTier::Locked);
        assert_eq!(h.wallet.connects.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_watch_drains_notifications() {
        let h = harness(holding("1000000000"));
        h.gate.connect().await.unwrap();

        let (tx, rx) = broadcast::channel(4);
        tx.send(WalletNotification::Disconnected).unwrap();
        drop(tx);

        h.gate.watch(rx).await;
        assert_eq!(h.gate.tier(), AccessTier::Locked);
        assert!(h.gate.session().identity.is_none());
    }

    #[tokio::test]
    async fn test_provider_notifications_available_after_connect() {
        let h = harness(holding("1000000000"));
        assert!(h.gate.notifications().is_none());

        h.gate.connect().await.unwrap();
        let mut rx = h.gate.notifications().unwrap();
        h.wallet.switch_account(OTHER_OWNER);
        assert_eq!(
            rx.recv().await.unwrap(),
            WalletNotification::AccountChanged(Some(OTHER_OWNER.into()))
        );
    }
}
