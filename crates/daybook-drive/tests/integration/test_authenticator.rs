//! Integration tests for bearer tokens and 401 handling

use reqwest::StatusCode;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use daybook_core::domain::{BackupProfile, Email};
use daybook_core::ports::IPreferenceStore;
use daybook_drive::authenticator::{ResponseChain, MAX_AUTH_RESPONSES};
use daybook_drive::DriveError;

use crate::common::{self, MemoryTokenStore, NEW_TOKEN, OLD_TOKEN, REFRESH_TOKEN};

fn empty_listing() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({ "files": [] }))
}

#[tokio::test]
async fn test_request_carries_stored_token() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", format!("Bearer {OLD_TOKEN}").as_str()))
        .respond_with(empty_listing())
        .expect(1)
        .mount(&h.server)
        .await;
    common::mount_token_refresh(&h.server, 0).await;

    let files = h.client.list_all_files().await.unwrap();
    assert!(files.is_empty());
}

#[tokio::test]
async fn test_single_refresh_then_retry() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", format!("Bearer {OLD_TOKEN}").as_str()))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(header("authorization", format!("Bearer {NEW_TOKEN}").as_str()))
        .respond_with(empty_listing())
        .expect(1)
        .mount(&h.server)
        .await;
    common::mount_token_refresh(&h.server, 1).await;

    h.client.list_all_files().await.unwrap();

    let stored = h.tokens.current().unwrap();
    assert_eq!(stored.access_token, NEW_TOKEN);
    // The endpoint returned no refresh token, so the old one is kept
    assert_eq!(stored.refresh_token.as_deref(), Some(REFRESH_TOKEN));
}

#[tokio::test]
async fn test_persistent_unauthorized_refreshes_once() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401).set_body_string("denied"))
        .expect(2)
        .mount(&h.server)
        .await;
    common::mount_token_refresh(&h.server, 1).await;

    let err = h.client.list_all_files().await.unwrap_err();
    assert!(matches!(err, DriveError::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn test_long_chain_gives_up_without_refresh() {
    let h = common::setup_drive_mock().await;
    common::mount_token_refresh(&h.server, 0).await;

    let mut chain = ResponseChain::new();
    for _ in 0..3 {
        chain.push(StatusCode::UNAUTHORIZED);
    }
    assert!(chain.len() > MAX_AUTH_RESPONSES);
    assert!(h
        .authenticator
        .authenticate(&chain, Some(OLD_TOKEN))
        .await
        .is_none());

    // Exactly at the limit also gives up
    let mut chain = ResponseChain::new();
    chain.push(StatusCode::UNAUTHORIZED);
    chain.push(StatusCode::UNAUTHORIZED);
    assert!(h
        .authenticator
        .authenticate(&chain, Some(OLD_TOKEN))
        .await
        .is_none());
    assert_eq!(h.tokens.current().unwrap().access_token, OLD_TOKEN);
}

#[tokio::test]
async fn test_token_already_replaced_is_reused() {
    let h = common::setup_drive_mock().await;
    common::mount_token_refresh(&h.server, 0).await;

    let mut chain = ResponseChain::new();
    chain.push(StatusCode::UNAUTHORIZED);

    // The request failed with a token that has since been replaced
    let token = h
        .authenticator
        .authenticate(&chain, Some("some-older-token"))
        .await;
    assert_eq!(token.as_deref(), Some(OLD_TOKEN));
}

#[tokio::test]
async fn test_concurrent_unauthorized_share_one_refresh() {
    let h = common::setup_drive_mock().await;
    common::mount_token_refresh(&h.server, 1).await;

    let mut chain = ResponseChain::new();
    chain.push(StatusCode::UNAUTHORIZED);

    let (a, b) = tokio::join!(
        h.authenticator.authenticate(&chain, Some(OLD_TOKEN)),
        h.authenticator.authenticate(&chain, Some(OLD_TOKEN)),
    );
    assert_eq!(a.as_deref(), Some(NEW_TOKEN));
    assert_eq!(b.as_deref(), Some(NEW_TOKEN));
}

#[tokio::test]
async fn test_invalid_grant_signs_out() {
    let h = common::setup_drive_mock().await;
    h.prefs
        .set_backup_profile(&BackupProfile::new(
            Email::new("user@example.com".into()).unwrap(),
        ))
        .await
        .unwrap();

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    common::mount_token_invalid_grant(&h.server).await;

    let err = h.client.list_all_files().await.unwrap_err();
    assert!(matches!(err, DriveError::Unauthorized(_)));
    assert!(h.tokens.current().is_none());
    assert!(h.prefs.backup_profile().await.unwrap().is_none());
}

#[tokio::test]
async fn test_refresh_server_error_keeps_credentials() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    common::mount_token_server_error(&h.server).await;

    let err = h.client.list_all_files().await.unwrap_err();
    assert!(matches!(err, DriveError::Unauthorized(_)));
    assert_eq!(h.tokens.current().unwrap().access_token, OLD_TOKEN);
}

#[tokio::test]
async fn test_token_read_failure_sends_unauthenticated() {
    let store = MemoryTokenStore::with_tokens(common::stored_tokens());
    store.fail_loads();
    let h = common::setup_with_tokens(store).await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(empty_listing())
        .expect(1)
        .mount(&h.server)
        .await;

    h.client.list_all_files().await.unwrap();

    let requests = h.server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}
