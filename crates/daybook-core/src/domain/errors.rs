//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and malformed identifiers.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid email address format
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid remote file ID
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Backup period outside the supported set of day counts
    #[error("Unsupported backup period: {0} days")]
    InvalidBackupPeriod(u32),

    /// Unknown enum discriminant read from storage or the wire
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// Name of the enum being parsed
        kind: &'static str,
        /// The offending value
        value: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
