//! Preference and token storage ports
//!
//! [`IPreferenceStore`] is a plain string key/value store. Adapters only
//! implement `get`, `set` and `remove`; the typed accessors are provided
//! methods so every adapter parses values the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BackupPeriod, BackupProfile, Email};

/// Preference keys
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const TOKEN_EXPIRES_AT: &str = "token_expires_at";
    pub const PROFILE_EMAIL: &str = "profile_email";
    pub const AUTO_BACKUP: &str = "auto_backup";
    pub const BACKUP_PERIOD: &str = "backup_period_days";
    pub const PIN_HASH: &str = "pin_hash";
    pub const BIOMETRIC_ENABLED: &str = "biometric_enabled";
    pub const RECOVERY_EMAIL: &str = "recovery_email";
    pub const LAUNCH_COUNT: &str = "launch_count";
    pub const ONBOARDING_COMPLETE: &str = "onboarding_complete";
}

fn parse_bool(value: Option<String>, default: bool) -> bool {
    match value.as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

/// Port trait for user preferences
#[async_trait::async_trait]
pub trait IPreferenceStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;

    async fn remove(&self, key: &str) -> anyhow::Result<()>;

    // --- backup profile ---

    /// The signed-in backup account, if any
    async fn backup_profile(&self) -> anyhow::Result<Option<BackupProfile>> {
        match self.get(keys::PROFILE_EMAIL).await? {
            Some(raw) => Ok(Some(BackupProfile::new(Email::new(raw)?))),
            None => Ok(None),
        }
    }

    async fn set_backup_profile(&self, profile: &BackupProfile) -> anyhow::Result<()> {
        self.set(keys::PROFILE_EMAIL, profile.email.as_str()).await
    }

    async fn clear_backup_profile(&self) -> anyhow::Result<()> {
        self.remove(keys::PROFILE_EMAIL).await
    }

    // --- auto backup ---

    async fn auto_backup_enabled(&self, default: bool) -> anyhow::Result<bool> {
        Ok(parse_bool(self.get(keys::AUTO_BACKUP).await?, default))
    }

    async fn set_auto_backup_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.set(keys::AUTO_BACKUP, if enabled { "true" } else { "false" })
            .await
    }

    /// Stored auto-backup period; unparseable values yield `default`
    async fn backup_period(&self, default: BackupPeriod) -> anyhow::Result<BackupPeriod> {
        let period = self
            .get(keys::BACKUP_PERIOD)
            .await?
            .and_then(|raw| raw.parse::<u32>().ok())
            .and_then(|days| BackupPeriod::from_days(days).ok())
            .unwrap_or(default);
        Ok(period)
    }

    async fn set_backup_period(&self, period: BackupPeriod) -> anyhow::Result<()> {
        self.set(keys::BACKUP_PERIOD, &period.days().to_string())
            .await
    }

    // --- lock ---

    async fn pin_hash(&self) -> anyhow::Result<Option<String>> {
        self.get(keys::PIN_HASH).await
    }

    async fn set_pin_hash(&self, hash: &str) -> anyhow::Result<()> {
        self.set(keys::PIN_HASH, hash).await
    }

    async fn clear_pin_hash(&self) -> anyhow::Result<()> {
        self.remove(keys::PIN_HASH).await
    }

    async fn biometric_enabled(&self) -> anyhow::Result<bool> {
        Ok(parse_bool(self.get(keys::BIOMETRIC_ENABLED).await?, false))
    }

    async fn set_biometric_enabled(&self, enabled: bool) -> anyhow::Result<()> {
        self.set(
            keys::BIOMETRIC_ENABLED,
            if enabled { "true" } else { "false" },
        )
        .await
    }

    async fn recovery_email(&self) -> anyhow::Result<Option<Email>> {
        match self.get(keys::RECOVERY_EMAIL).await? {
            Some(raw) => Ok(Some(Email::new(raw)?)),
            None => Ok(None),
        }
    }

    async fn set_recovery_email(&self, email: &Email) -> anyhow::Result<()> {
        self.set(keys::RECOVERY_EMAIL, email.as_str()).await
    }

    // --- app lifecycle ---

    /// Bumps the launch counter and returns the new value
    async fn increment_launch_count(&self) -> anyhow::Result<u64> {
        let count = self
            .get(keys::LAUNCH_COUNT)
            .await?
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        self.set(keys::LAUNCH_COUNT, &count.to_string()).await?;
        Ok(count)
    }

    async fn onboarding_complete(&self) -> anyhow::Result<bool> {
        Ok(parse_bool(self.get(keys::ONBOARDING_COMPLETE).await?, false))
    }

    async fn set_onboarding_complete(&self) -> anyhow::Result<()> {
        self.set(keys::ONBOARDING_COMPLETE, "true").await
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens for the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for obtaining new access tokens without user interaction
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

/// Port trait for token persistence
#[async_trait::async_trait]
pub trait ITokenStore: Send + Sync {
    /// Loads stored tokens; `None` when signed out
    async fn load(&self) -> anyhow::Result<Option<Tokens>>;

    async fn store(&self, tokens: &Tokens) -> anyhow::Result<()>;

    /// Removes stored tokens. Clearing an empty store succeeds.
    async fn clear(&self) -> anyhow::Result<()>;
}
