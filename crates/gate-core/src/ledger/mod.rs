//! ============================================================================
//! Ledger Module - Abstract token-account queries
//! ============================================================================
//! The gate never speaks the ledger wire protocol itself; it goes through
//! `LedgerClient`. `RpcLedger` is the Solana JSON-RPC implementation.
//!
//! Token accounts live under two incompatible programs (SPL Token and
//! Token-2022), so a holder's balance may be split across both.
//! ============================================================================

mod rpc;

pub use rpc::{decode_mint_decimals, parse_token_account_json, RpcLedger};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Token-2022 program id
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// One of the three owner queries issued per balance check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountQuery {
    /// Filtered directly by mint
    ByMint,
    /// Filtered by the SPL Token program
    TokenProgram,
    /// Filtered by the Token-2022 program
    Token2022Program,
}

impl AccountQuery {
    pub const ALL: [AccountQuery; 3] = [
        AccountQuery::ByMint,
        AccountQuery::TokenProgram,
        AccountQuery::Token2022Program,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AccountQuery::ByMint => "mint filter",
            AccountQuery::TokenProgram => "Token Program",
            AccountQuery::Token2022Program => "Token-2022 Program",
        }
    }

    /// Program filter, None for the mint query
    pub fn program_id(&self) -> Option<Pubkey> {
        match self {
            AccountQuery::ByMint => None,
            AccountQuery::TokenProgram => Some(spl_token::id()),
            AccountQuery::Token2022Program => Some(TOKEN_2022_PROGRAM_ID),
        }
    }
}

/// Parsed token account as returned by an owner query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccountRecord {
    /// Token account address
    pub address: String,
    /// Mint the account declares
    pub mint: String,
    /// Owning program (SPL Token or Token-2022)
    pub program: String,
    /// Balance in smallest units, as the ledger reports it
    pub amount: String,
}

/// Ledger query capability
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Endpoint label, used for cache keys and diagnostics
    fn endpoint(&self) -> &str;

    /// Token accounts owned by `owner`, filtered per `query`
    async fn token_accounts_by_owner(
        &self,
        owner: &str,
        mint: &str,
        query: AccountQuery,
    ) -> Result<Vec<TokenAccountRecord>>;

    /// Decimals declared by the mint account
    async fn mint_decimals(&self, mint: &str) -> Result<u8>;

    /// Drop and rebuild any cached connection handle
    async fn reset(&self) {}
}
