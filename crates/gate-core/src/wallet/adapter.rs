//! ============================================================================
//! Wallet Adapter - Ranked provider selection
//! ============================================================================

use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info};

use super::WalletProvider;
use crate::error::GateError;

/// Source of candidate providers, queried on every access attempt
pub trait WalletDiscovery: Send + Sync {
    fn discover(&self) -> Vec<Arc<dyn WalletProvider>>;
}

/// Discovery over an explicitly managed provider list
#[derive(Default)]
pub struct StaticDiscovery {
    providers: RwLock<Vec<Arc<dyn WalletProvider>>>,
}

impl StaticDiscovery {
    pub fn new(providers: Vec<Arc<dyn WalletProvider>>) -> Self {
        Self {
            providers: RwLock::new(providers),
        }
    }

    pub fn register(&self, provider: Arc<dyn WalletProvider>) {
        info!("Wallet provider registered: {}", provider.name());
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(provider);
    }

    /// Remove every provider with this name
    pub fn remove(&self, name: &str) {
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|p| p.name() != name);
    }
}

impl WalletDiscovery for StaticDiscovery {
    fn discover(&self) -> Vec<Arc<dyn WalletProvider>> {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Recognized implementations first (by rank in `recognized`), then
/// discovery order
pub fn select_provider(
    candidates: &[Arc<dyn WalletProvider>],
    recognized: &[String],
) -> Option<Arc<dyn WalletProvider>> {
    let rank = |name: &str| {
        recognized
            .iter()
            .position(|r| r.eq_ignore_ascii_case(name))
            .unwrap_or(usize::MAX)
    };

    candidates
        .iter()
        .enumerate()
        .min_by_key(|(index, provider)| (rank(provider.name()), *index))
        .map(|(_, provider)| Arc::clone(provider))
}

/// A connected provider and the identity it reported
#[derive(Clone)]
pub struct WalletConnection {
    pub provider: Arc<dyn WalletProvider>,
    pub identity: String,
}

impl std::fmt::Debug for WalletConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletConnection")
            .field("provider", &self.provider.name())
            .field("identity", &self.identity)
            .finish()
    }
}

/// Uniform connect surface over whatever providers are present
pub struct WalletAdapter {
    discovery: Arc<dyn WalletDiscovery>,
    recognized: Vec<String>,
}

impl WalletAdapter {
    pub fn new(discovery: Arc<dyn WalletDiscovery>, recognized: Vec<String>) -> Self {
        Self {
            discovery,
            recognized,
        }
    }

    /// Currently preferred provider, if any is present
    pub fn select(&self) -> Option<Arc<dyn WalletProvider>> {
        let candidates = self.discovery.discover();
        debug!("Discovered {} wallet providers", candidates.len());
        select_provider(&candidates, &self.recognized)
    }

    pub async fn connect(&self, trusted_only: bool) -> Result<WalletConnection, GateError> {
        let provider = self.select().ok_or(GateError::WalletUnavailable)?;

        debug!(
            "Connecting wallet provider {} (trusted_only: {})",
            provider.name(),
            trusted_only
        );

        let identity = provider.connect(trusted_only).await?;
        let identity = identity.trim().to_string();
        if identity.is_empty() {
            return Err(GateError::ConnectionFailed(
                "Wallet returned no public key".into(),
            ));
        }

        Ok(WalletConnection { provider, identity })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockWallet;

    fn names(recognized: &[&str]) -> Vec<String> {
        recognized.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_recognized_provider_wins() {
        let candidates: Vec<Arc<dyn WalletProvider>> = vec![
            Arc::new(MockWallet::new("unknown", "A")),
            Arc::new(MockWallet::new("Solflare", "B")),
            Arc::new(MockWallet::new("phantom", "C")),
        ];
        let selected = select_provider(&candidates, &names(&["phantom", "solflare"])).unwrap();
        assert_eq!(selected.name(), "phantom");
    }

    #[test]
    fn test_first_discovered_when_none_recognized() {
        let candidates: Vec<Arc<dyn WalletProvider>> = vec![
            Arc::new(MockWallet::new("first", "A")),
            Arc::new(MockWallet::new("second", "B")),
        ];
        let selected = select_provider(&candidates, &names(&["phantom"])).unwrap();
        assert_eq!(selected.name(), "first");
        assert!(select_provider(&[], &names(&["phantom"])).is_none());
    }

    #[tokio::test]
    async fn test_discovery_reevaluated_per_attempt() {
        let discovery = Arc::new(StaticDiscovery::default());
        let adapter = WalletAdapter::new(discovery.clone(), names(&["phantom"]));

        let err = adapter.connect(false).await.unwrap_err();
        assert_eq!(err, GateError::WalletUnavailable);

        discovery.register(Arc::new(MockWallet::new("phantom", "Owner111")));
        let connection = adapter.connect(false).await.unwrap();
        assert_eq!(connection.identity, "Owner111");

        discovery.remove("phantom");
        assert!(adapter.select().is_none());
    }

    #[tokio::test]
    async fn test_empty_identity_is_connection_failure() {
        let blank: Arc<dyn WalletProvider> = Arc::new(MockWallet::new("phantom", "  "));
        let discovery = Arc::new(StaticDiscovery::new(vec![blank]));
        let adapter = WalletAdapter::new(discovery, names(&["phantom"]));
        assert!(matches!(
            adapter.connect(false).await,
            Err(GateError::ConnectionFailed(_))
        ));
    }
}
