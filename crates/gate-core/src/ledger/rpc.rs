//! ============================================================================
//! RPC Ledger - Solana JSON-RPC implementation of LedgerClient
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_client::rpc_response::RpcKeyedAccount;
use solana_sdk::{commitment_config::CommitmentConfig, pubkey::Pubkey};
use spl_token::solana_program::program_pack::Pack;
use spl_token::state::Mint;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::{AccountQuery, LedgerClient, TokenAccountRecord, TOKEN_2022_PROGRAM_ID};
use crate::config::GateConfig;

/// Ledger client over a nonblocking RpcClient. The handle is rebuilt on `reset`.
pub struct RpcLedger {
    endpoint: String,
    commitment: CommitmentConfig,
    client: RwLock<Arc<RpcClient>>,
}

impl RpcLedger {
    pub fn new(endpoint: &str, commitment: CommitmentConfig) -> Self {
        info!("Initializing RpcLedger for {}", endpoint);

        Self {
            endpoint: endpoint.to_string(),
            commitment,
            client: RwLock::new(Arc::new(Self::build_client(endpoint, commitment))),
        }
    }

    pub fn from_config(config: &GateConfig) -> Self {
        Self::new(&config.rpc_endpoint, config.commitment.to_config())
    }

    fn build_client(endpoint: &str, commitment: CommitmentConfig) -> RpcClient {
        RpcClient::new_with_commitment(endpoint.to_string(), commitment)
    }

    async fn client(&self) -> Arc<RpcClient> {
        Arc::clone(&*self.client.read().await)
    }
}

#[async_trait]
impl LedgerClient for RpcLedger {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn token_accounts_by_owner(
        &self,
        owner: &str,
        mint: &str,
        query: AccountQuery,
    ) -> Result<Vec<TokenAccountRecord>> {
        let owner_key =
            Pubkey::from_str(owner).map_err(|e| anyhow!("Invalid owner address {}: {}", owner, e))?;

        let filter = match query {
            AccountQuery::ByMint => TokenAccountsFilter::Mint(
                Pubkey::from_str(mint).map_err(|e| anyhow!("Invalid mint address {}: {}", mint, e))?,
            ),
            AccountQuery::TokenProgram => TokenAccountsFilter::ProgramId(spl_token::id()),
            AccountQuery::Token2022Program => TokenAccountsFilter::ProgramId(TOKEN_2022_PROGRAM_ID),
        };

        let response = self
            .client()
            .await
            .get_token_accounts_by_owner_with_commitment(&owner_key, filter, self.commitment)
            .await
            .map_err(|e| anyhow!("getTokenAccountsByOwner ({}) failed: {}", query.label(), e))?;

        debug!(
            "{} returned {} accounts for {}",
            query.label(),
            response.value.len(),
            owner
        );

        let mut records = Vec::with_capacity(response.value.len());
        for keyed in &response.value {
            match parse_keyed_account(keyed) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping unparseable token account {}: {}", keyed.pubkey, e),
            }
        }
        Ok(records)
    }

    async fn mint_decimals(&self, mint: &str) -> Result<u8> {
        let mint_key =
            Pubkey::from_str(mint).map_err(|e| anyhow!("Invalid mint address {}: {}", mint, e))?;

        let account = self
            .client()
            .await
            .get_account_with_commitment(&mint_key, self.commitment)
            .await
            .map_err(|e| anyhow!("Failed to fetch mint {}: {}", mint, e))?
            .value
            .ok_or_else(|| anyhow!("Mint account {} not found", mint))?;

        decode_mint_decimals(&account.data)
    }

    async fn reset(&self) {
        *self.client.write().await = Arc::new(Self::build_client(&self.endpoint, self.commitment));
        debug!("Rebuilt RPC client for {}", self.endpoint);
    }
}

fn parse_keyed_account(keyed: &RpcKeyedAccount) -> Result<TokenAccountRecord> {
    let data = serde_json::to_value(&keyed.account.data)
        .map_err(|e| anyhow!("Failed to read account data: {}", e))?;
    parse_token_account_json(&keyed.pubkey, &keyed.account.owner, &data)
}

/// Extract mint + raw amount from a `jsonParsed` token account payload
pub fn parse_token_account_json(address: &str, program: &str, data: &Value) -> Result<TokenAccountRecord> {
    let info = data
        .pointer("/parsed/info")
        .ok_or_else(|| anyhow!("Account data is not jsonParsed token data"))?;

    let mint = info
        .get("mint")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Token account has no mint"))?;

    let amount = info
        .pointer("/tokenAmount/amount")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("Token account has no tokenAmount.amount"))?;

    Ok(TokenAccountRecord {
        address: address.to_string(),
        mint: mint.to_string(),
        program: program.to_string(),
        amount: amount.to_string(),
    })
}

/// Decimals from raw mint account data. Token-2022 mints share the base
/// layout and append extensions after it.
pub fn decode_mint_decimals(data: &[u8]) -> Result<u8> {
    if data.len() < Mint::LEN {
        return Err(anyhow!(
            "Mint account data too short: {} bytes, expected at least {}",
            data.len(),
            Mint::LEN
        ));
    }
    let mint = Mint::unpack_from_slice(&data[..Mint::LEN])
        .map_err(|e| anyhow!("Failed to decode mint: {}", e))?;
    Ok(mint.decimals)
}
