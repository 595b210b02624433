//! Integration tests for backup profile sign-in and sign-out

use chrono::{Duration, Utc};
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use daybook_core::ports::{IPreferenceStore, Tokens};
use daybook_drive::AuthError;

use crate::common::{self, MemoryTokenStore, NEW_TOKEN};

fn fresh_tokens() -> Tokens {
    Tokens {
        access_token: "consent-token".into(),
        refresh_token: Some("consent-refresh".into()),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

#[tokio::test]
async fn test_sign_in_records_profile() {
    let h = common::setup_with_tokens(MemoryTokenStore::default()).await;
    common::mount_about(&h.server, "Writer@Example.com").await;

    let profile = h.profile_manager().sign_in(fresh_tokens()).await.unwrap();

    assert_eq!(profile.email.as_str(), "writer@example.com");
    assert_eq!(h.prefs.backup_profile().await.unwrap(), Some(profile));
    assert_eq!(h.tokens.current().unwrap().access_token, "consent-token");
}

#[tokio::test]
async fn test_failed_email_fetch_discards_tokens() {
    let h = common::setup_with_tokens(MemoryTokenStore::default()).await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/about"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    let err = h.profile_manager().sign_in(fresh_tokens()).await.unwrap_err();

    assert!(matches!(err, AuthError::EmailFetch(_)), "got {err:?}");
    assert!(h.tokens.current().is_none());
    assert!(h.prefs.backup_profile().await.unwrap().is_none());
}

#[tokio::test]
async fn test_rejected_token_is_invalid_token() {
    let h = common::setup_with_tokens(MemoryTokenStore::default()).await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/about"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&h.server)
        .await;
    common::mount_token_server_error(&h.server).await;

    let err = h.profile_manager().sign_in(fresh_tokens()).await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)), "got {err:?}");
}

#[tokio::test]
async fn test_sign_out_clears_everything() {
    let h = common::setup_drive_mock().await;
    common::mount_about(&h.server, "user@example.com").await;
    let manager = h.profile_manager();
    manager.sign_in(fresh_tokens()).await.unwrap();

    manager.sign_out().await.unwrap();

    assert!(h.tokens.current().is_none());
    assert!(manager.profile().await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_session_stores_new_token() {
    let h = common::setup_drive_mock().await;
    common::mount_token_refresh(&h.server, 1).await;

    let tokens = h.profile_manager().refresh_session().await.unwrap();
    assert_eq!(tokens.access_token, NEW_TOKEN);
    assert_eq!(h.tokens.current().unwrap().access_token, NEW_TOKEN);
}

#[tokio::test]
async fn test_refresh_session_revoked_grant_requires_resolution() {
    let h = common::setup_drive_mock().await;
    common::mount_about(&h.server, "user@example.com").await;
    common::mount_token_invalid_grant(&h.server).await;
    let manager = h.profile_manager();
    h.prefs
        .set(daybook_core::ports::keys::PROFILE_EMAIL, "user@example.com")
        .await
        .unwrap();

    let err = manager.refresh_session().await.unwrap_err();

    assert!(matches!(err, AuthError::ResolutionRequired(_)));
    assert!(h.tokens.current().is_none());
    assert!(manager.profile().await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_session_without_tokens() {
    let h = common::setup_with_tokens(MemoryTokenStore::default()).await;
    let err = h.profile_manager().refresh_session().await.unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken(_)));
}
