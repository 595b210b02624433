//! Backup profile sign-in and sign-out
//!
//! Signing in stores the tokens obtained from the consent flow, resolves the
//! account email and records it as the backup profile. Signing out removes
//! both. A half-finished sign-in never leaves tokens behind without a
//! profile.

use std::sync::Arc;

use daybook_core::domain::{BackupProfile, Email};
use daybook_core::ports::{IPreferenceStore, ITokenStore, Tokens};
use tracing::{info, warn};

use crate::auth::{RefreshError, TokenRefresher};
use crate::client::DriveClient;
use crate::{AuthError, DriveError};

/// Owns the link between stored tokens and the backup profile
pub struct ProfileManager {
    client: DriveClient,
    tokens: Arc<dyn ITokenStore>,
    preferences: Arc<dyn IPreferenceStore>,
    refresher: Arc<dyn TokenRefresher>,
}

impl ProfileManager {
    pub fn new(
        client: DriveClient,
        tokens: Arc<dyn ITokenStore>,
        preferences: Arc<dyn IPreferenceStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> Self {
        Self {
            client,
            tokens,
            preferences,
            refresher,
        }
    }

    /// The signed-in profile, if any
    pub async fn profile(&self) -> Result<Option<BackupProfile>, AuthError> {
        self.preferences
            .backup_profile()
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))
    }

    /// Stores `tokens` and records the account they belong to
    pub async fn sign_in(&self, tokens: Tokens) -> Result<BackupProfile, AuthError> {
        self.tokens
            .store(&tokens)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;

        match self.resolve_profile().await {
            Ok(profile) => {
                info!(email = %profile.email, "Signed in backup profile");
                Ok(profile)
            }
            Err(e) => {
                warn!(error = %e, "Sign-in failed, discarding tokens");
                if let Err(clear) = self.tokens.clear().await {
                    warn!(error = %clear, "Failed to discard tokens after failed sign-in");
                }
                Err(e)
            }
        }
    }

    async fn resolve_profile(&self) -> Result<BackupProfile, AuthError> {
        let email = self.client.fetch_profile_email().await.map_err(|e| match e {
            DriveError::Network(e) => AuthError::Network(e.to_string()),
            DriveError::Unauthorized(body) => AuthError::InvalidToken(body),
            other => AuthError::EmailFetch(other.to_string()),
        })?;
        let email = Email::new(email).map_err(|e| AuthError::EmailFetch(e.to_string()))?;

        let profile = BackupProfile::new(email);
        self.preferences
            .set_backup_profile(&profile)
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        Ok(profile)
    }

    /// Removes tokens and the backup profile
    pub async fn sign_out(&self) -> Result<(), AuthError> {
        self.tokens
            .clear()
            .await
            .map_err(|e| AuthError::CredentialClear(e.to_string()))?;
        self.preferences
            .clear_backup_profile()
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?;
        info!("Signed out backup profile");
        Ok(())
    }

    /// Refreshes the access token ahead of use
    ///
    /// A revoked grant signs the profile out and reports
    /// [`AuthError::ResolutionRequired`].
    pub async fn refresh_session(&self) -> Result<Tokens, AuthError> {
        let stored = self
            .tokens
            .load()
            .await
            .map_err(|e| AuthError::Storage(e.to_string()))?
            .ok_or_else(|| AuthError::InvalidToken("No stored tokens".to_string()))?;
        let refresh_token = stored
            .refresh_token
            .ok_or_else(|| AuthError::InvalidToken("No refresh token stored".to_string()))?;

        match self.refresher.refresh(&refresh_token).await {
            Ok(fresh) => {
                self.tokens
                    .store(&fresh)
                    .await
                    .map_err(|e| AuthError::Storage(e.to_string()))?;
                Ok(fresh)
            }
            Err(RefreshError::ResolutionRequired(reason)) => {
                self.sign_out().await?;
                Err(AuthError::ResolutionRequired(reason))
            }
            Err(RefreshError::Failed(reason)) => Err(AuthError::Network(reason)),
        }
    }
}
