//! Backup/restore state, signed-in profile and auto-backup period

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::Email;

/// Observable state of a backup or restore run
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Starting,
    Progress { synced: u32, total: u32 },
    Success,
    Failure { reason: String },
}

impl SyncState {
    /// True while a run is in flight
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Starting | Self::Progress { .. })
    }

    /// True once a run has ended, successfully or not
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Success | Self::Failure { .. })
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Progress { synced, total } => write!(f, "progress {synced}/{total}"),
            Self::Success => write!(f, "success"),
            Self::Failure { reason } => write!(f, "failure: {reason}"),
        }
    }
}

/// The signed-in account that owns the remote backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupProfile {
    pub email: Email,
}

impl BackupProfile {
    #[must_use]
    pub fn new(email: Email) -> Self {
        Self { email }
    }
}

/// Interval between automatic backups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BackupPeriod {
    Daily,
    EveryThreeDays,
    #[default]
    Weekly,
    EveryTwoWeeks,
    Monthly,
}

impl BackupPeriod {
    pub const ALL: [Self; 5] = [
        Self::Daily,
        Self::EveryThreeDays,
        Self::Weekly,
        Self::EveryTwoWeeks,
        Self::Monthly,
    ];

    /// Parses a day count
    ///
    /// # Errors
    /// Returns error for anything other than 1, 3, 7, 14 or 30
    pub fn from_days(days: u32) -> Result<Self, DomainError> {
        match days {
            1 => Ok(Self::Daily),
            3 => Ok(Self::EveryThreeDays),
            7 => Ok(Self::Weekly),
            14 => Ok(Self::EveryTwoWeeks),
            30 => Ok(Self::Monthly),
            other => Err(DomainError::InvalidBackupPeriod(other)),
        }
    }

    #[must_use]
    pub const fn days(&self) -> u32 {
        match self {
            Self::Daily => 1,
            Self::EveryThreeDays => 3,
            Self::Weekly => 7,
            Self::EveryTwoWeeks => 14,
            Self::Monthly => 30,
        }
    }

    #[must_use]
    pub const fn as_duration(&self) -> Duration {
        Duration::from_secs(self.days() as u64 * 24 * 60 * 60)
    }
}

impl TryFrom<u32> for BackupPeriod {
    type Error = DomainError;

    fn try_from(days: u32) -> Result<Self, Self::Error> {
        Self::from_days(days)
    }
}

impl From<BackupPeriod> for u32 {
    fn from(period: BackupPeriod) -> Self {
        period.days()
    }
}
