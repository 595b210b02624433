//! App lock session
//!
//! Tracks whether the user is authorized to see their notes. With a PIN
//! configured, moving the app to the background starts a re-lock timer; if
//! the app does not return to the foreground before it fires, authorization
//! is revoked. Without a PIN the session is always authorized.
//!
//! The PIN is stored as `salt:sha256(salt || pin)` in hex under the
//! `pin_hash` preference.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use daybook_core::domain::DomainError;
use daybook_core::ports::IPreferenceStore;
use sha2::{Digest, Sha256};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Accepted PIN lengths (digits)
const PIN_LENGTH: std::ops::RangeInclusive<usize> = 4..=8;

struct Inner {
    preferences: Arc<dyn IPreferenceStore>,
    relock_delay: Duration,
    authorized: watch::Sender<bool>,
    pin_configured: watch::Sender<bool>,
    /// Present between `start` and `stop`
    session: Mutex<Option<CancellationToken>>,
    /// Pending re-lock timer
    timer: Mutex<Option<CancellationToken>>,
}

/// Authorization gate with delayed re-lock
#[derive(Clone)]
pub struct LockSession {
    inner: Arc<Inner>,
}

impl LockSession {
    pub fn new(preferences: Arc<dyn IPreferenceStore>, relock_delay: Duration) -> Self {
        let (authorized, _) = watch::channel(false);
        let (pin_configured, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                preferences,
                relock_delay,
                authorized,
                pin_configured,
                session: Mutex::new(None),
                timer: Mutex::new(None),
            }),
        }
    }

    /// Begins a session; locked if a PIN is configured
    pub async fn start(&self) -> anyhow::Result<()> {
        let has_pin = self.inner.preferences.pin_hash().await?.is_some();
        self.inner.pin_configured.send_replace(has_pin);
        self.inner.authorized.send_replace(!has_pin);

        let previous = lock(&self.inner.session).replace(CancellationToken::new());
        if let Some(previous) = previous {
            previous.cancel();
        }
        info!(locked = has_pin, "Lock session started");
        Ok(())
    }

    /// Ends the session and cancels any pending re-lock
    pub fn stop(&self) {
        if let Some(session) = lock(&self.inner.session).take() {
            session.cancel();
        }
        self.cancel_timer();
        info!("Lock session stopped");
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner.session).is_some()
    }

    pub fn is_authorized(&self) -> bool {
        !*self.inner.pin_configured.borrow() || *self.inner.authorized.borrow()
    }

    /// Follows authorization changes
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.authorized.subscribe()
    }

    /// App moved to the background; arms the re-lock timer
    pub fn on_background(&self) {
        let Some(session) = lock(&self.inner.session).clone() else {
            debug!("Lock session not running, ignoring background");
            return;
        };
        if !*self.inner.pin_configured.borrow() {
            return;
        }

        let timer = session.child_token();
        if let Some(previous) = lock(&self.inner.timer).replace(timer.clone()) {
            previous.cancel();
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = timer.cancelled() => {}
                _ = tokio::time::sleep(inner.relock_delay) => {
                    if *inner.pin_configured.borrow() {
                        inner.authorized.send_replace(false);
                        info!(delay_secs = inner.relock_delay.as_secs(), "Re-lock delay elapsed, locked");
                    }
                }
            }
        });
        debug!("Re-lock timer armed");
    }

    /// App returned to the foreground; disarms a pending re-lock
    pub fn on_foreground(&self) {
        self.cancel_timer();
    }

    fn cancel_timer(&self) {
        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.cancel();
            debug!("Re-lock timer cancelled");
        }
    }

    /// Unlocks if `pin` matches the stored hash
    pub async fn unlock_with_pin(&self, pin: &str) -> anyhow::Result<bool> {
        let Some(stored) = self.inner.preferences.pin_hash().await? else {
            self.inner.pin_configured.send_replace(false);
            self.grant();
            return Ok(true);
        };

        if verify_pin(pin, &stored)? {
            self.grant();
            Ok(true)
        } else {
            warn!("PIN unlock rejected");
            Ok(false)
        }
    }

    /// Unlocks if biometric unlock is enabled
    ///
    /// The platform prompt happens outside this crate; this is called once
    /// it succeeded.
    pub async fn unlock_with_biometric(&self) -> anyhow::Result<bool> {
        if self.inner.preferences.biometric_enabled().await? {
            self.grant();
            Ok(true)
        } else {
            debug!("Biometric unlock not enabled");
            Ok(false)
        }
    }

    /// Stores a new PIN; the current session stays authorized
    pub async fn set_pin(&self, pin: &str) -> anyhow::Result<()> {
        validate_pin(pin)?;
        let encoded = hash_pin(pin, &Uuid::new_v4().simple().to_string());
        self.inner.preferences.set_pin_hash(&encoded).await?;
        self.inner.pin_configured.send_replace(true);
        self.grant();
        info!("PIN set");
        Ok(())
    }

    /// Removes the PIN; the session becomes permanently authorized
    pub async fn clear_pin(&self) -> anyhow::Result<()> {
        self.inner.preferences.clear_pin_hash().await?;
        self.inner.pin_configured.send_replace(false);
        self.cancel_timer();
        self.grant();
        info!("PIN cleared");
        Ok(())
    }

    fn grant(&self) {
        self.cancel_timer();
        self.inner.authorized.send_replace(true);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(mut session) = self.session.lock() {
            if let Some(session) = session.take() {
                session.cancel();
            }
        }
    }
}

/// Locks a std mutex, recovering the data if a holder panicked
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn validate_pin(pin: &str) -> Result<(), DomainError> {
    if !PIN_LENGTH.contains(&pin.len()) || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(DomainError::ValidationFailed(format!(
            "PIN must be {} to {} digits",
            PIN_LENGTH.start(),
            PIN_LENGTH.end()
        )));
    }
    Ok(())
}

fn digest_hex(salt: &str, pin: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(pin.as_bytes());
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn hash_pin(pin: &str, salt: &str) -> String {
    format!("{salt}:{}", digest_hex(salt, pin))
}

fn verify_pin(pin: &str, stored: &str) -> anyhow::Result<bool> {
    let (salt, expected) = stored
        .split_once(':')
        .context("Stored PIN hash is malformed")?;
    let actual = digest_hex(salt, pin);
    // Compare every byte so timing does not depend on the mismatch position
    let matches = actual.len() == expected.len()
        && actual
            .bytes()
            .zip(expected.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0;
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let stored = hash_pin("1234", "salt");
        assert!(stored.starts_with("salt:"));
        assert_eq!(stored.len(), "salt:".len() + 64);
        assert!(verify_pin("1234", &stored).unwrap());
        assert!(!verify_pin("4321", &stored).unwrap());
    }

    #[test]
    fn test_salt_changes_hash() {
        assert_ne!(hash_pin("1234", "a"), hash_pin("1234", "b"));
    }

    #[test]
    fn test_malformed_hash_is_error() {
        assert!(verify_pin("1234", "no-separator").is_err());
    }

    #[test]
    fn test_pin_validation() {
        assert!(validate_pin("1234").is_ok());
        assert!(validate_pin("12345678").is_ok());
        assert!(validate_pin("123").is_err());
        assert!(validate_pin("123456789").is_err());
        assert!(validate_pin("12a4").is_err());
    }
}
