//! Daybook Sync - Backup/restore, background jobs and app lock
//!
//! Provides:
//! - Backup and restore of notes and attachments to the remote app folder
//! - Periodic background jobs with device constraints and backoff
//! - The PIN/biometric lock session
//!
//! ## Modules
//!
//! - [`coordinator`] - Backup/restore state machine
//! - [`jobs`] - Periodic job runner and the auto-backup, cleanup and media jobs
//! - [`lock`] - Lock session with delayed re-lock

pub mod coordinator;
pub mod jobs;
pub mod lock;
mod media;
mod retry;

use thiserror::Error;

/// Errors that can occur during backup or restore
#[derive(Debug, Error)]
pub enum SyncError {
    /// No backup profile is signed in
    #[error("Not signed in to a backup account")]
    NotSignedIn,

    /// Another backup or restore run holds the coordinator
    #[error("A backup or restore is already running")]
    AlreadyRunning,

    /// The remote store failed
    #[error("Remote store error: {0:#}")]
    Remote(anyhow::Error),

    /// The local database or media directory failed
    #[error("Local store error: {0:#}")]
    Local(anyhow::Error),

    /// A downloaded note payload could not be read
    #[error("Invalid note payload '{name}': {reason}")]
    InvalidPayload {
        /// Remote file name
        name: String,
        /// Parse failure
        reason: String,
    },
}
