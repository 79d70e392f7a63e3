//! ============================================================================
//! Session Establisher - Nonce / signature handshake with the auth service
//! ============================================================================
//! Flow:
//!   1. POST /auth/nonce  {publicKey}             -> {nonce, message?}
//!   2. sign the challenge locally with the wallet (key never leaves it)
//!   3. POST /auth/verify {publicKey, signature}  -> {token}
//!
//! The token is an enhancement for other collaborators (score submission,
//! purchases). It never gates entry, so every failure collapses to None.
//! ============================================================================

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::context::GateContext;
use crate::error::GateError;
use crate::wallet::WalletProvider;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NonceRequest<'a> {
    public_key: &'a str,
}

#[derive(Debug, Deserialize)]
struct NonceResponse {
    nonce: String,
    /// Exact text the service will verify, when it wraps the nonce
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest<'a> {
    public_key: &'a str,
    signature: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    token: String,
}

/// Client for the auth service handshake
pub struct SessionEstablisher {
    client: Client,
    base_url: Option<Url>,
}

impl SessionEstablisher {
    pub fn new(ctx: &GateContext) -> Self {
        let base_url = ctx.config.auth_base_url.as_deref().and_then(|raw| {
            // Trailing slash so join() appends instead of replacing the last segment
            let normalized = if raw.ends_with('/') {
                raw.to_string()
            } else {
                format!("{}/", raw)
            };
            match Url::parse(&normalized) {
                Ok(url) => Some(url),
                Err(e) => {
                    warn!("Invalid auth service URL {}: {} - sessions disabled", raw, e);
                    None
                }
            }
        });

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self { client, base_url }
    }

    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }

    /// Run the handshake; None on any failure
    pub async fn establish(&self, identity: &str, signer: &dyn WalletProvider) -> Option<String> {
        match self.handshake(identity, signer).await {
            Ok(token) => {
                info!("Session established for {}", identity);
                Some(token)
            }
            Err(e) => {
                warn!("Continuing without session for {}: {}", identity, e);
                None
            }
        }
    }

    async fn handshake(&self, identity: &str, signer: &dyn WalletProvider) -> Result<String, GateError> {
        let base = self
            .base_url
            .as_ref()
            .ok_or_else(|| GateError::SessionUnavailable("no auth service configured".into()))?;

        let challenge: NonceResponse = self
            .post(base, "auth/nonce", &NonceRequest { public_key: identity })
            .await?;
        debug!("Received nonce for {}", identity);

        let message = challenge.message.unwrap_or(challenge.nonce);
        let signature = signer.sign_message(message.as_bytes()).await?;

        let verified: VerifyResponse = self
            .post(
                base,
                "auth/verify",
                &VerifyRequest {
                    public_key: identity,
                    signature,
                },
            )
            .await?;

        if verified.token.trim().is_empty() {
            return Err(GateError::SessionUnavailable("empty token".into()));
        }
        Ok(verified.token)
    }

    async fn post<B, R>(&self, base: &Url, path: &str, body: &B) -> Result<R, GateError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = base
            .join(path)
            .map_err(|e| GateError::SessionUnavailable(format!("bad URL for {}: {}", path, e)))?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| GateError::SessionUnavailable(format!("{} request failed: {}", path, e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GateError::SessionUnavailable(format!(
                "{} returned {}: {}",
                path, status, text
            )));
        }

        response
            .json::<R>()
            .await
            .map_err(|e| GateError::SessionUnavailable(format!("{} returned malformed body: {}", path, e)))
    }
}
