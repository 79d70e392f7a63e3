//! ============================================================================
//! Balance Module - Exact token balance aggregation
//! ============================================================================
//! Reads a wallet's balance of the gating mint across the SPL Token and
//! Token-2022 programs and decides whether it meets the configured minimum.
//!
//! ## Usage
//! ```rust,ignore
//! use gate_core::balance::BalanceAggregator;
//! use gate_core::ledger::RpcLedger;
//!
//! let ledger = Arc::new(RpcLedger::from_config(&ctx.config));
//! let aggregator = BalanceAggregator::new(ctx.clone(), ledger);
//! let snapshot = aggregator.snapshot(&wallet).await;
//! ```
//! ============================================================================

mod aggregator;
mod amount;
mod types;

pub use aggregator::{aggregate, Aggregate, BalanceAggregator};
pub use amount::{format_raw_amount, meets_threshold, parse_raw_amount, threshold_to_raw};
pub use types::{BalanceSnapshot, MintDescriptor, QueryDiagnostic, DEFAULT_DECIMALS};
