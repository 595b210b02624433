//! Retry of transient remote failures within a single backup run

use std::future::Future;
use std::time::Duration;

use daybook_drive::DriveError;
use tracing::{info, warn};

/// Maximum retries for one remote operation
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (in seconds)
const BASE_DELAY_SECS: u64 = 1;

/// Upper bound on a server-requested wait
const MAX_RETRY_AFTER: Duration = Duration::from_secs(300);

/// How a failed remote operation should be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryDecision {
    /// Permanent failure
    Stop,
    /// Transient failure; wait with exponential backoff
    Backoff,
    /// The server asked for this wait before retrying
    After(Duration),
}

/// Classifies a port error
///
/// Drive errors keep their type through the `anyhow` chain and are
/// classified by variant. Anything else falls back to the message.
pub(crate) fn classify(err: &anyhow::Error) -> RetryDecision {
    if let Some(drive) = err.downcast_ref::<DriveError>() {
        return match drive {
            DriveError::TooManyRequests { retry_after } => {
                RetryDecision::After((*retry_after).min(MAX_RETRY_AFTER))
            }
            e if e.is_transient() => RetryDecision::Backoff,
            _ => RetryDecision::Stop,
        };
    }
    if is_transient_error(err) {
        RetryDecision::Backoff
    } else {
        RetryDecision::Stop
    }
}

/// Message-based fallback for errors without a typed classification
///
/// Status codes only count as whole words, so ids or bodies that merely
/// contain the digits do not match.
pub(crate) fn is_transient_error(err: &anyhow::Error) -> bool {
    let msg = format!("{err:#}").to_lowercase();

    let phrases = [
        "network error",
        "connection refused",
        "connection reset",
        "reset by peer",
        "timed out",
        "timeout",
        "too many requests",
        "rate limit",
        "server error",
    ];
    let codes = ["429", "500", "502", "503", "504"];

    phrases.iter().any(|needle| msg.contains(needle))
        || msg
            .split(|c: char| !c.is_ascii_alphanumeric())
            .any(|word| codes.contains(&word))
}

/// Runs `f`, retrying transient failures
///
/// Rate-limited calls wait for the server's `Retry-After`; other transient
/// failures back off exponentially.
pub(crate) async fn with_retry<F, Fut, T>(operation: &str, f: F) -> anyhow::Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match f().await {
            Ok(value) => {
                if attempt > 0 {
                    info!(operation, attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        let delay = match classify(&err) {
            _ if attempt >= MAX_RETRIES => return Err(err),
            RetryDecision::Stop => return Err(err),
            RetryDecision::Backoff => Duration::from_secs(BASE_DELAY_SECS * 2u64.pow(attempt)),
            RetryDecision::After(wait) => wait,
        };
        warn!(
            operation,
            attempt,
            delay_secs = delay.as_secs(),
            error = %err,
            "Transient error, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
