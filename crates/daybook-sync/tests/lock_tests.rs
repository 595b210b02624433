//! Integration tests for LockSession
//!
//! Timers run on paused tokio time.

mod common;

use std::sync::Arc;
use std::time::Duration;

use daybook_core::ports::IPreferenceStore;
use daybook_sync::lock::LockSession;

use common::MemoryPrefs;

const DELAY: Duration = Duration::from_secs(30);

/// Lets spawned timer tasks observe elapsed time
async fn settle() {
    for _ in 0..3 {
        tokio::task::yield_now().await;
    }
}

async fn session_with_pin(pin: &str) -> (LockSession, Arc<MemoryPrefs>) {
    let prefs = Arc::new(MemoryPrefs::default());
    let session = LockSession::new(prefs.clone(), DELAY);
    session.set_pin(pin).await.unwrap();
    session.start().await.unwrap();
    (session, prefs)
}

#[tokio::test(start_paused = true)]
async fn test_without_pin_always_authorized() {
    let session = LockSession::new(Arc::new(MemoryPrefs::default()), DELAY);
    session.start().await.unwrap();
    assert!(session.is_authorized());

    session.on_background();
    tokio::time::sleep(DELAY * 3).await;
    settle().await;
    assert!(session.is_authorized());
}

#[tokio::test(start_paused = true)]
async fn test_start_with_pin_is_locked() {
    let (session, _) = session_with_pin("2468").await;
    assert!(session.is_running());
    assert!(!session.is_authorized());

    assert!(!session.unlock_with_pin("1111").await.unwrap());
    assert!(!session.is_authorized());

    assert!(session.unlock_with_pin("2468").await.unwrap());
    assert!(session.is_authorized());
}

#[tokio::test(start_paused = true)]
async fn test_background_longer_than_delay_locks() {
    let (session, _) = session_with_pin("2468").await;
    session.unlock_with_pin("2468").await.unwrap();
    let mut changes = session.subscribe();

    session.on_background();
    tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
    settle().await;
    session.on_foreground();

    assert!(!session.is_authorized());
    assert!(changes.has_changed().unwrap());
    assert!(!*changes.borrow_and_update());
}

#[tokio::test(start_paused = true)]
async fn test_background_shorter_than_delay_stays_unlocked() {
    let (session, _) = session_with_pin("2468").await;
    session.unlock_with_pin("2468").await.unwrap();

    session.on_background();
    tokio::time::sleep(DELAY / 2).await;
    session.on_foreground();

    tokio::time::sleep(DELAY * 2).await;
    settle().await;
    assert!(session.is_authorized());
}

#[tokio::test(start_paused = true)]
async fn test_repeated_background_restarts_timer() {
    let (session, _) = session_with_pin("2468").await;
    session.unlock_with_pin("2468").await.unwrap();

    session.on_background();
    tokio::time::sleep(DELAY - Duration::from_secs(5)).await;
    // A second background event replaces the first timer
    session.on_background();
    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert!(session.is_authorized());

    tokio::time::sleep(DELAY).await;
    settle().await;
    assert!(!session.is_authorized());
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_pending_relock() {
    let (session, _) = session_with_pin("2468").await;
    session.unlock_with_pin("2468").await.unwrap();

    session.on_background();
    session.stop();
    assert!(!session.is_running());

    tokio::time::sleep(DELAY * 2).await;
    settle().await;
    assert!(session.is_authorized());

    // Background events outside a session are ignored
    session.on_background();
    tokio::time::sleep(DELAY * 2).await;
    settle().await;
    assert!(session.is_authorized());
}

#[tokio::test(start_paused = true)]
async fn test_biometric_requires_opt_in() {
    let (session, prefs) = session_with_pin("2468").await;

    assert!(!session.unlock_with_biometric().await.unwrap());
    assert!(!session.is_authorized());

    prefs.set_biometric_enabled(true).await.unwrap();
    assert!(session.unlock_with_biometric().await.unwrap());
    assert!(session.is_authorized());
}

#[tokio::test(start_paused = true)]
async fn test_clear_pin_unlocks_for_good() {
    let (session, prefs) = session_with_pin("2468").await;

    session.clear_pin().await.unwrap();
    assert!(prefs.pin_hash().await.unwrap().is_none());
    assert!(session.is_authorized());

    session.on_background();
    tokio::time::sleep(DELAY * 2).await;
    settle().await;
    assert!(session.is_authorized());
}

#[tokio::test(start_paused = true)]
async fn test_pin_stored_salted() {
    let (session, prefs) = session_with_pin("2468").await;
    let first = prefs.pin_hash().await.unwrap().unwrap();
    assert!(!first.contains("2468"));

    session.set_pin("2468").await.unwrap();
    let second = prefs.pin_hash().await.unwrap().unwrap();
    assert_ne!(first, second);

    assert!(session.set_pin("12").await.is_err());
    assert_eq!(prefs.pin_hash().await.unwrap(), Some(second));
}
