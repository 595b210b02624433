//! OAuth2 token refresh and token storage
//!
//! The interactive consent flow happens outside this crate. Here we only
//! exchange a stored refresh token for a new access token and keep tokens in
//! the system keyring.
//!
//! ## Components
//!
//! - [`OAuth2Config`] - Client id and token endpoint
//! - [`TokenRefresher`] - Port for refresh-token exchanges
//! - [`RefreshClient`] - `oauth2`-based refresher
//! - [`KeyringTokenStorage`] - Secure token storage using the system keyring

use anyhow::Context;
use chrono::{Duration, Utc};
use daybook_core::config::DriveConfig;
use daybook_core::ports::{ITokenStore, Tokens};
use oauth2::basic::{BasicClient, BasicErrorResponseType};
use oauth2::{
    ClientId, EndpointNotSet, EndpointSet, RefreshToken, RequestTokenError, TokenResponse,
    TokenUrl,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Default OAuth2 token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Keyring service name for storing tokens
const KEYRING_SERVICE: &str = "daybook";

/// Keyring account used when no profile name is supplied
const DEFAULT_KEYRING_ACCOUNT: &str = "backup";

// ============================================================================
// OAuth2Config
// ============================================================================

/// Configuration for token refresh
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Config {
    /// Application (client) id registered with the provider
    pub client_id: String,
    /// Token endpoint URL
    pub token_url: String,
}

impl OAuth2Config {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Builds the config from the `drive` section, if a client id is set
    pub fn from_drive_config(config: &DriveConfig) -> Option<Self> {
        config
            .client_id
            .as_ref()
            .map(|id| Self::new(id.clone()).with_token_url(config.token_url.clone()))
    }
}

// ============================================================================
// TokenRefresher
// ============================================================================

/// Why a refresh-token exchange failed
#[derive(Debug, Error)]
pub enum RefreshError {
    /// The grant was revoked or expired; only interactive sign-in can fix it
    #[error("refresh token rejected: {0}")]
    ResolutionRequired(String),

    /// Any other failure (network, malformed response, server error)
    #[error("token refresh failed: {0}")]
    Failed(String),
}

/// Exchanges a refresh token for fresh tokens
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, RefreshError>;
}

/// Token refresher backed by the `oauth2` crate
pub struct RefreshClient {
    client: BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    http: reqwest::Client,
}

impl RefreshClient {
    pub fn new(config: &OAuth2Config) -> anyhow::Result<Self> {
        let client = BasicClient::new(ClientId::new(config.client_id.clone()))
            .set_token_uri(TokenUrl::new(config.token_url.clone()).context("Invalid token URL")?);

        // Token endpoints must not be followed through redirects
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("Failed to build token HTTP client")?;

        Ok(Self { client, http })
    }
}

#[async_trait::async_trait]
impl TokenRefresher for RefreshClient {
    async fn refresh(&self, refresh_token: &str) -> Result<Tokens, RefreshError> {
        info!("Refreshing access token");

        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&self.http)
            .await
            .map_err(|e| match e {
                RequestTokenError::ServerResponse(resp)
                    if *resp.error() == BasicErrorResponseType::InvalidGrant =>
                {
                    RefreshError::ResolutionRequired(resp.to_string())
                }
                other => RefreshError::Failed(other.to_string()),
            })?;

        let expires_at = response
            .expires_in()
            .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
            .unwrap_or_else(|| Utc::now() + Duration::hours(1));

        let tokens = Tokens {
            access_token: response.access_token().secret().to_string(),
            // Providers usually omit the refresh token on refresh; keep ours
            refresh_token: response
                .refresh_token()
                .map(|t| t.secret().to_string())
                .or_else(|| Some(refresh_token.to_string())),
            expires_at,
        };

        info!(expires_at = %tokens.expires_at, "Refreshed access token");
        Ok(tokens)
    }
}

// ============================================================================
// KeyringTokenStorage
// ============================================================================

/// Stores tokens as JSON in the OS credential store
///
/// Keyring calls block on D-Bus, so every operation runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringTokenStorage {
    account: String,
}

impl Default for KeyringTokenStorage {
    fn default() -> Self {
        Self::new(DEFAULT_KEYRING_ACCOUNT)
    }
}

impl KeyringTokenStorage {
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
        }
    }

    fn entry(account: &str) -> anyhow::Result<keyring::Entry> {
        keyring::Entry::new(KEYRING_SERVICE, account).context("Failed to create keyring entry")
    }

    fn store_blocking(account: &str, tokens: &Tokens) -> anyhow::Result<()> {
        let json = serde_json::to_string(tokens).context("Failed to serialize tokens")?;
        Self::entry(account)?
            .set_password(&json)
            .context("Failed to store tokens in keyring")?;
        debug!(account, "Stored tokens in keyring");
        Ok(())
    }

    fn load_blocking(account: &str) -> anyhow::Result<Option<Tokens>> {
        match Self::entry(account)?.get_password() {
            Ok(json) => {
                let tokens = serde_json::from_str(&json)
                    .context("Failed to deserialize tokens from keyring")?;
                Ok(Some(tokens))
            }
            Err(keyring::Error::NoEntry) => {
                debug!(account, "No tokens found in keyring");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
        }
    }

    fn clear_blocking(account: &str) -> anyhow::Result<()> {
        match Self::entry(account)?.delete_credential() {
            Ok(()) => {
                info!(account, "Cleared tokens from keyring");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
        }
    }
}

#[async_trait::async_trait]
impl ITokenStore for KeyringTokenStorage {
    async fn load(&self) -> anyhow::Result<Option<Tokens>> {
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || Self::load_blocking(&account))
            .await
            .context("Keyring task panicked")?
    }

    async fn store(&self, tokens: &Tokens) -> anyhow::Result<()> {
        let account = self.account.clone();
        let tokens = tokens.clone();
        tokio::task::spawn_blocking(move || Self::store_blocking(&account, &tokens))
            .await
            .context("Keyring task panicked")?
    }

    async fn clear(&self) -> anyhow::Result<()> {
        let account = self.account.clone();
        tokio::task::spawn_blocking(move || Self::clear_blocking(&account))
            .await
            .context("Keyring task panicked")?
            .inspect_err(|e| warn!(error = %e, "Keyring clear failed"))
    }
}
