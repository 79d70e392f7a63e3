//! ============================================================================
//! Balance Aggregator - Token balance across account programs
//! ============================================================================
//! Issues the three owner queries concurrently, keeps only accounts for the
//! configured mint, counts each account address once and sums raw amounts
//! as integers. Never fails: a broken ledger yields a zero snapshot with the
//! error recorded.
//! ============================================================================

use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use spl_associated_token_account::get_associated_token_address;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::amount::{format_raw_amount, meets_threshold, parse_raw_amount};
use super::types::{BalanceSnapshot, MintDescriptor, QueryDiagnostic, DEFAULT_DECIMALS};
use crate::context::GateContext;
use crate::error::GateError;
use crate::events::GateEvent;
use crate::ledger::{AccountQuery, LedgerClient, TokenAccountRecord};

/// Mint cache key: decimals are only trusted for the endpoint that served them
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MintKey {
    endpoint: String,
    mint: String,
}

/// Result of folding the three query outcomes together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Aggregate {
    pub raw_amount: u128,
    pub accounts_found: usize,
    pub programs_seen: Vec<String>,
    pub diagnostics: Vec<QueryDiagnostic>,
}

impl Aggregate {
    /// Every query failed, nothing was read from the ledger
    pub fn all_failed(&self) -> bool {
        !self.diagnostics.is_empty() && self.diagnostics.iter().all(QueryDiagnostic::failed)
    }
}

/// Fold query outcomes: drop foreign mints, dedupe by address, sum exactly
pub fn aggregate(
    mint: &str,
    outcomes: Vec<(AccountQuery, Result<Vec<TokenAccountRecord>, String>)>,
) -> Aggregate {
    let mut counted: HashSet<String> = HashSet::new();
    let mut programs: BTreeSet<String> = BTreeSet::new();
    let mut raw_amount: u128 = 0;
    let mut diagnostics = Vec::with_capacity(outcomes.len());

    for (query, outcome) in outcomes {
        let mut diagnostic = QueryDiagnostic::new(query);

        match outcome {
            Ok(records) => {
                for record in records {
                    diagnostic.accounts_seen += 1;

                    if record.mint != mint {
                        diagnostic.mint_mismatches += 1;
                        continue;
                    }

                    let Some(amount) = parse_raw_amount(&record.amount) else {
                        warn!(
                            "Token account {} reported unparseable amount '{}'",
                            record.address, record.amount
                        );
                        continue;
                    };

                    diagnostic.accounts_matched += 1;
                    diagnostic.raw_subtotal = diagnostic.raw_subtotal.saturating_add(amount);

                    if counted.insert(record.address.clone()) {
                        raw_amount = raw_amount.checked_add(amount).unwrap_or_else(|| {
                            warn!("Raw balance overflowed u128, saturating");
                            u128::MAX
                        });
                        programs.insert(record.program);
                    }
                }
            }
            Err(error) => {
                warn!("{} query failed: {}", query.label(), error);
                diagnostic.error = Some(error);
            }
        }

        diagnostics.push(diagnostic);
    }

    Aggregate {
        raw_amount,
        accounts_found: counted.len(),
        programs_seen: programs.into_iter().collect(),
        diagnostics,
    }
}

/// Balance aggregator owning the ledger handle and the mint cache
pub struct BalanceAggregator {
    ctx: GateContext,
    ledger: Arc<dyn LedgerClient>,
    mints: RwLock<HashMap<MintKey, MintDescriptor>>,
}

impl BalanceAggregator {
    pub fn new(ctx: GateContext, ledger: Arc<dyn LedgerClient>) -> Self {
        Self {
            ctx,
            ledger,
            mints: RwLock::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> Decimal {
        self.ctx.config.min_token_balance
    }

    pub fn endpoint(&self) -> &str {
        self.ledger.endpoint()
    }

    fn mint_key(&self) -> MintKey {
        MintKey {
            endpoint: self.ledger.endpoint().to_string(),
            mint: self.ctx.config.mint_address.clone(),
        }
    }

    /// Decimals for the configured mint: cached, else fetched, else the
    /// default. Fallbacks are not cached so the next check retries.
    pub async fn mint_descriptor(&self) -> MintDescriptor {
        let key = self.mint_key();

        {
            let cache = self.mints.read().await;
            if let Some(descriptor) = cache.get(&key) {
                debug!("Mint cache hit for {}: {} decimals", key.mint, descriptor.decimals);
                return descriptor.clone();
            }
        }

        match self.ledger.mint_decimals(&key.mint).await {
            Ok(decimals) => {
                let descriptor = MintDescriptor {
                    mint: key.mint.clone(),
                    decimals,
                    fallback: false,
                };
                self.mints.write().await.insert(key, descriptor.clone());
                descriptor
            }
            Err(e) => {
                warn!(
                    "Failed to read decimals for mint {}: {} - assuming {}",
                    key.mint, e, DEFAULT_DECIMALS
                );
                MintDescriptor {
                    mint: key.mint,
                    decimals: DEFAULT_DECIMALS,
                    fallback: true,
                }
            }
        }
    }

    async fn run_query(
        &self,
        identity: &str,
        mint: &str,
        query: AccountQuery,
    ) -> (AccountQuery, Result<Vec<TokenAccountRecord>, String>) {
        let outcome = self
            .ledger
            .token_accounts_by_owner(identity, mint, query)
            .await
            .map_err(|e| e.to_string());
        (query, outcome)
    }

    /// Balance snapshot for `identity`. Publishes the raw ledger view and the
    /// per-query diagnostics on the bus.
    pub async fn snapshot(&self, identity: &str) -> BalanceSnapshot {
        let descriptor = self.mint_descriptor().await;
        let mint = descriptor.mint.as_str();

        let (by_mint, token, token_2022) = tokio::join!(
            self.run_query(identity, mint, AccountQuery::ByMint),
            self.run_query(identity, mint, AccountQuery::TokenProgram),
            self.run_query(identity, mint, AccountQuery::Token2022Program),
        );

        let totals = aggregate(mint, vec![by_mint, token, token_2022]);
        let threshold = self.threshold();

        let error = totals.all_failed().then(|| {
            GateError::LedgerUnreachable(format!(
                "All token account queries failed against {}",
                self.ledger.endpoint()
            ))
        });

        let raw_amount = totals.raw_amount;
        let meets_requirement =
            error.is_none() && meets_threshold(raw_amount, descriptor.decimals, threshold);

        let snapshot = BalanceSnapshot {
            identity: identity.to_string(),
            mint: descriptor.mint.clone(),
            raw_amount,
            decimals: descriptor.decimals,
            decimals_fallback: descriptor.fallback,
            decimal_value: format_raw_amount(raw_amount, descriptor.decimals),
            threshold: threshold.normalize().to_string(),
            meets_requirement,
            accounts_found: totals.accounts_found,
            programs_seen: totals.programs_seen,
            expected_account: expected_account(identity, mint),
            timestamp: chrono::Utc::now().timestamp(),
            diagnostics: totals.diagnostics,
            error,
        };

        info!(
            "Balance for {}: {} ({} raw, {} accounts, meets {}: {})",
            identity,
            snapshot.decimal_value,
            snapshot.raw_amount,
            snapshot.accounts_found,
            snapshot.threshold,
            snapshot.meets_requirement
        );

        self.ctx.bus.publish(GateEvent::BalanceLedger {
            identity: identity.to_string(),
            mint: snapshot.mint.clone(),
            raw_amount: snapshot.raw_amount.to_string(),
            decimals: snapshot.decimals,
            programs: snapshot.programs_seen.clone(),
        });
        self.ctx.bus.publish(GateEvent::BalanceDiagnostics {
            identity: identity.to_string(),
            diagnostics: snapshot.diagnostics.clone(),
        });

        snapshot
    }

    /// Forget cached mint data and rebuild the ledger handle
    pub async fn invalidate(&self) {
        let count = {
            let mut cache = self.mints.write().await;
            let count = cache.len();
            cache.clear();
            count
        };
        self.ledger.reset().await;
        info!("Invalidated {} cached mint entries", count);
    }
}

/// Associated token account for (owner, mint), when both parse
fn expected_account(identity: &str, mint: &str) -> Option<String> {
    let owner = Pubkey::from_str(identity).ok()?;
    let mint = Pubkey::from_str(mint).ok()?;
    Some(get_associated_token_address(&owner, &mint).to_string())
}
