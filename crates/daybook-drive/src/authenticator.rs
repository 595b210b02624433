//! Request authentication with bounded re-authorization
//!
//! Every outgoing request carries the stored access token. When the server
//! answers 401 the [`TokenAuthenticator`] is asked for a replacement. It
//! refreshes at most once per logical request: a request whose response
//! chain already holds [`MAX_AUTH_RESPONSES`] unauthorized responses is given
//! up on.
//!
//! Refreshes are serialized. A caller that waited on the lock while another
//! caller refreshed reuses the new token instead of refreshing again.

use std::sync::Arc;

use daybook_core::ports::{IPreferenceStore, ITokenStore};
use reqwest::{RequestBuilder, Response, StatusCode};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::auth::{RefreshError, TokenRefresher};
use crate::DriveError;

/// Number of unauthorized responses after which a request is abandoned
pub const MAX_AUTH_RESPONSES: usize = 2;

// ============================================================================
// ResponseChain
// ============================================================================

/// Statuses received so far for one logical request, oldest first
#[derive(Debug, Clone, Default)]
pub struct ResponseChain {
    statuses: Vec<StatusCode>,
}

impl ResponseChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, status: StatusCode) {
        self.statuses.push(status);
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

// ============================================================================
// TokenAuthenticator
// ============================================================================

/// Supplies bearer tokens and replaces them after a 401
pub struct TokenAuthenticator {
    tokens: Arc<dyn ITokenStore>,
    preferences: Arc<dyn IPreferenceStore>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_lock: Mutex<()>,
}

impl TokenAuthenticator {
    pub fn new(
        tokens: Arc<dyn ITokenStore>,
        preferences: Arc<dyn IPreferenceStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            tokens,
            preferences,
            refresher,
            refresh_lock: Mutex::new(()),
        }
    }

    /// The stored access token
    ///
    /// A storage failure is logged and yields `None`; the request then goes
    /// out unauthenticated and the server decides.
    pub async fn current_token(&self) -> Option<String> {
        match self.tokens.load().await {
            Ok(tokens) => tokens.map(|t| t.access_token),
            Err(e) => {
                warn!(error = %e, "Failed to read access token");
                None
            }
        }
    }

    /// Returns a token to retry with, or `None` to give up
    ///
    /// `failed_token` is the token the rejected request was sent with.
    pub async fn authenticate(
        &self,
        chain: &ResponseChain,
        failed_token: Option<&str>,
    ) -> Option<String> {
        if chain.len() >= MAX_AUTH_RESPONSES {
            debug!(responses = chain.len(), "Giving up on re-authorization");
            return None;
        }

        let _guard = self.refresh_lock.lock().await;

        let stored = match self.tokens.load().await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => {
                debug!("No stored tokens; cannot re-authorize");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read tokens for re-authorization");
                return None;
            }
        };

        if failed_token != Some(stored.access_token.as_str()) {
            debug!("Token already replaced by a concurrent refresh");
            return Some(stored.access_token);
        }

        let Some(refresh_token) = stored.refresh_token.as_deref() else {
            warn!("No refresh token stored; cannot re-authorize");
            return None;
        };

        match self.refresher.refresh(refresh_token).await {
            Ok(fresh) => {
                if let Err(e) = self.tokens.store(&fresh).await {
                    warn!(error = %e, "Failed to persist refreshed tokens");
                }
                Some(fresh.access_token)
            }
            Err(RefreshError::ResolutionRequired(reason)) => {
                warn!(%reason, "Refresh token rejected, signing out");
                self.sign_out().await;
                None
            }
            Err(RefreshError::Failed(reason)) => {
                warn!(%reason, "Token refresh failed");
                None
            }
        }
    }

    async fn sign_out(&self) {
        if let Err(e) = self.tokens.clear().await {
            warn!(error = %e, "Failed to clear stored tokens");
        }
        if let Err(e) = self.preferences.clear_backup_profile().await {
            warn!(error = %e, "Failed to clear backup profile");
        }
        info!("Cleared credentials after revoked grant");
    }
}

// ============================================================================
// AuthorizedHttp
// ============================================================================

/// HTTP client that attaches bearer tokens and retries once after a 401
#[derive(Clone)]
pub struct AuthorizedHttp {
    client: reqwest::Client,
    authenticator: Arc<TokenAuthenticator>,
}

impl AuthorizedHttp {
    pub fn new(client: reqwest::Client, authenticator: Arc<TokenAuthenticator>) -> Self {
        Self {
            client,
            authenticator,
        }
    }

    /// Sends the request produced by `build`, rebuilding it for each retry
    ///
    /// The final response is returned whatever its status; a 401 that could
    /// not be recovered from is handed back to the caller unchanged.
    pub async fn execute<F>(&self, build: F) -> Result<Response, DriveError>
    where
        F: Fn(&reqwest::Client) -> Result<RequestBuilder, DriveError>,
    {
        let mut chain = ResponseChain::new();
        let mut token = self.authenticator.current_token().await;

        loop {
            let mut request = build(&self.client)?;
            if let Some(token) = &token {
                request = request.bearer_auth(token);
            }

            let response = request.send().await?;
            if response.status() != StatusCode::UNAUTHORIZED {
                return Ok(response);
            }

            chain.push(response.status());
            match self
                .authenticator
                .authenticate(&chain, token.as_deref())
                .await
            {
                Some(next) => token = Some(next),
                None => return Ok(response),
            }
        }
    }
}
