//! Daybook Drive - Remote file store client
//!
//! Provides async client for:
//! - OAuth2 token refresh and token storage (keyring)
//! - Request authentication with a bounded re-authorization rule
//! - App-folder file operations against a Drive-v3-style REST API
//! - Sign-in/sign-out of the backup profile
//!
//! ## Modules
//!
//! - [`auth`] - Token endpoint client and keyring token storage
//! - [`authenticator`] - Bearer header injection and 401 handling
//! - [`client`] - File list/upload/download/delete
//! - [`provider`] - `IRemoteFileStore` adapter
//! - [`profile`] - Backup profile sign-in/sign-out

pub mod auth;
pub mod authenticator;
pub mod client;
pub mod profile;
pub mod provider;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Default retry-after duration when the header is missing
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Errors that can occur when talking to the remote file store
#[derive(Debug, Error)]
pub enum DriveError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error: {0}")]
    ServerError(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be parsed or had an unexpected status
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Writing downloaded content to disk failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DriveError {
    /// Maps a non-success HTTP status and its body to an error
    pub fn from_status(status: StatusCode, retry_after: Option<Duration>, body: String) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => Self::Unauthorized(body),
            StatusCode::FORBIDDEN => Self::Forbidden(body),
            StatusCode::NOT_FOUND => Self::NotFound(body),
            StatusCode::TOO_MANY_REQUESTS => Self::TooManyRequests {
                retry_after: retry_after.unwrap_or(DEFAULT_RETRY_AFTER),
            },
            s if s.is_server_error() => Self::ServerError(format!("{s}: {body}")),
            s => Self::InvalidResponse(format!("HTTP {s}: {body}")),
        }
    }

    /// Whether retrying later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TooManyRequests { .. } | Self::ServerError(_) | Self::Network(_)
        )
    }
}

/// Sign-in failures, surfaced to the user as "could not sign in"
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token endpoint or the store could not be reached
    #[error("Network error during sign-in: {0}")]
    Network(String),

    /// The stored or supplied token was rejected
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The user has to grant consent again interactively
    #[error("Sign-in required: {0}")]
    ResolutionRequired(String),

    /// Stored credentials could not be removed
    #[error("Failed to clear credentials: {0}")]
    CredentialClear(String),

    /// The account email could not be resolved
    #[error("Failed to fetch account email: {0}")]
    EmailFetch(String),

    /// Tokens or the profile could not be persisted
    #[error("Storage error: {0}")]
    Storage(String),
}
