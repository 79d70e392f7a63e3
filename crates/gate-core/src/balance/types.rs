//! ============================================================================
//! Balance Types - Snapshots, per-query diagnostics and mint descriptors
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::error::GateError;
use crate::ledger::AccountQuery;

/// Decimals used when the mint lookup fails
pub const DEFAULT_DECIMALS: u8 = 9;

/// Mint identity and scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintDescriptor {
    pub mint: String,
    pub decimals: u8,
    /// Decimals are DEFAULT_DECIMALS because the lookup failed
    pub fallback: bool,
}

/// What one owner query contributed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDiagnostic {
    pub query: AccountQuery,
    pub accounts_seen: usize,
    pub accounts_matched: usize,
    /// Accounts declaring another mint
    pub mint_mismatches: usize,
    /// Sum over matched accounts of this query, before deduplication
    #[serde(with = "raw_string")]
    pub raw_subtotal: u128,
    pub error: Option<String>,
}

impl QueryDiagnostic {
    pub fn new(query: AccountQuery) -> Self {
        Self {
            query,
            accounts_seen: 0,
            accounts_matched: 0,
            mint_mismatches: 0,
            raw_subtotal: 0,
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

/// Balance of one identity at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub identity: String,
    pub mint: String,
    /// Deduplicated sum in smallest units
    #[serde(with = "raw_string")]
    pub raw_amount: u128,
    pub decimals: u8,
    pub decimals_fallback: bool,
    /// Exact decimal rendering of raw_amount
    pub decimal_value: String,
    /// Configured minimum, as a decimal string
    pub threshold: String,
    pub meets_requirement: bool,
    /// Unique token accounts that contributed
    pub accounts_found: usize,
    /// Owner programs that contributed
    pub programs_seen: Vec<String>,
    /// Associated token account the wallet would normally use
    pub expected_account: Option<String>,
    pub timestamp: i64,
    pub diagnostics: Vec<QueryDiagnostic>,
    /// `LedgerUnreachable` when the ledger could not be read at all
    pub error: Option<GateError>,
}

impl BalanceSnapshot {
    /// Ledger unreachable, as opposed to a valid-but-low balance
    pub fn is_ledger_failure(&self) -> bool {
        matches!(self.error, Some(GateError::LedgerUnreachable(_)))
    }

    /// `BalanceInsufficient` for a readable balance below the threshold
    pub fn shortfall(&self) -> Option<GateError> {
        if self.meets_requirement || self.is_ledger_failure() {
            return None;
        }
        Some(GateError::BalanceInsufficient {
            needed: self.threshold.clone(),
            available: self.decimal_value.clone(),
        })
    }

    /// Banner text for a failed balance check
    pub fn failure_report(&self, cluster: &str, endpoint: &str) -> String {
        let details: Vec<String> = self
            .diagnostics
            .iter()
            .filter_map(|d| d.error.as_ref().map(|e| format!("{}: {}", d.query.label(), e)))
            .collect();

        let mut report = format!(
            "Unable to verify token holdings on {} ({}). Please try again later.",
            cluster, endpoint
        );
        if !details.is_empty() {
            report.push_str(&format!("<br><small>{}</small>", details.join("; ")));
        }
        report
    }

    /// Banner text for a balance below the threshold, naming where the
    /// accounts were found and which queries disagreed
    pub fn shortfall_report(&self, cluster: &str) -> String {
        let mut report = if self.accounts_found == 0 {
            format!("No tokens detected in this wallet on {}.", cluster)
        } else {
            format!(
                "Balance {} is below the required {} on {} ({} account{} via {}).",
                self.decimal_value,
                self.threshold,
                cluster,
                self.accounts_found,
                if self.accounts_found == 1 { "" } else { "s" },
                self.programs_seen.join(", ")
            )
        };

        for diagnostic in &self.diagnostics {
            if diagnostic.mint_mismatches > 0 {
                report.push_str(&format!(
                    " {} returned {} account{} for a different mint.",
                    diagnostic.query.label(),
                    diagnostic.mint_mismatches,
                    if diagnostic.mint_mismatches == 1 { "" } else { "s" }
                ));
            }
            if let Some(error) = &diagnostic.error {
                report.push_str(&format!(" {} query failed: {}.", diagnostic.query.label(), error));
            }
        }

        if self.accounts_found == 0 {
            if let Some(account) = &self.expected_account {
                report.push_str(&format!(" Expected token account: {}.", account));
            }
        }

        if self.decimals_fallback {
            report.push_str(&format!(
                " Mint decimals could not be read; assumed {}.",
                self.decimals
            ));
        }
        report
    }
}

/// u128 amounts as decimal strings
mod raw_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>().map_err(D::Error::custom)
    }
}
