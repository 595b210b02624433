//! Integration tests for app-folder file operations

use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use daybook_core::domain::{RemoteFileId, RemoteFileKind};
use daybook_core::ports::IRemoteFileStore;
use daybook_drive::provider::DriveRemoteStore;
use daybook_drive::DriveError;

use crate::common;

fn rid(id: &str) -> RemoteFileId {
    RemoteFileId::new(id.to_string()).unwrap()
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_follows_page_tokens() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("spaces", "appDataFolder"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                { "id": "f3", "name": "memo.m4a", "mimeType": "audio/mp4" }
            ]
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .and(query_param("spaces", "appDataFolder"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextPageToken": "page-2",
            "files": [
                { "id": "f1", "name": "photo.jpg", "mimeType": "image/jpeg" },
                {
                    "id": "f2",
                    "name": "note-6f1c2d7e-8a9b-4c3d-9e0f-112233445566.json",
                    "mimeType": "application/json"
                }
            ]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let files = h.client.list_all_files().await.unwrap();
    let kinds: Vec<_> = files.iter().map(|f| f.kind).collect();
    assert_eq!(
        kinds,
        vec![
            RemoteFileKind::Image,
            RemoteFileKind::NotesData,
            RemoteFileKind::Voice
        ]
    );
    assert!(files[1].is_note_payload());
}

#[tokio::test]
async fn test_list_rejects_repeated_page_token() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "nextPageToken": "same",
            "files": []
        })))
        .mount(&h.server)
        .await;

    let err = h.client.list_all_files().await.unwrap_err();
    assert!(matches!(err, DriveError::InvalidResponse(_)));
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_multipart_upload_sends_metadata_and_content() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(query_param("uploadType", "multipart"))
        .and(body_string_contains("\"parents\":[\"appDataFolder\"]"))
        .and(body_string_contains("\"name\":\"photo.jpg\""))
        .and(body_string_contains("jpeg-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "new-file",
            "name": "photo.jpg",
            "mimeType": "image/jpeg"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let file = h
        .client
        .upload_file("photo.jpg", "image/jpeg", b"jpeg-bytes".to_vec())
        .await
        .unwrap();
    assert_eq!(file.id.as_str(), "new-file");
    assert_eq!(file.kind, RemoteFileKind::Image);
}

#[tokio::test]
async fn test_upload_retried_after_refresh_resends_body() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(wiremock::matchers::header(
            "authorization",
            format!("Bearer {}", common::OLD_TOKEN).as_str(),
        ))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/upload/drive/v3/files"))
        .and(body_string_contains("voice-bytes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "voice-1",
            "name": "memo.m4a"
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    common::mount_token_refresh(&h.server, 1).await;

    let file = h
        .client
        .upload_file("memo.m4a", "audio/mp4", b"voice-bytes".to_vec())
        .await
        .unwrap();
    assert_eq!(file.kind, RemoteFileKind::Voice);
}

#[tokio::test]
async fn test_update_patches_existing_file() {
    let h = common::setup_drive_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/upload/drive/v3/files/existing"))
        .and(query_param("uploadType", "multipart"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "existing",
            "name": "note-a.json",
            "mimeType": "application/json"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let store = DriveRemoteStore::new(h.client.clone());
    let file = store
        .update_file(&rid("existing"), "note-a.json", "application/json", b"{}".to_vec())
        .await
        .unwrap();
    assert_eq!(file.id.as_str(), "existing");
}

// ============================================================================
// Download
// ============================================================================

#[tokio::test]
async fn test_download_returns_content() {
    let h = common::setup_drive_mock().await;
    let content: Vec<u8> = (0..65_536).map(|i| (i % 251) as u8).collect();
    common::mount_download(&h.server, "blob", &content).await;

    let data = h.client.download(&rid("blob")).await.unwrap();
    assert_eq!(data, content);
}

#[tokio::test]
async fn test_download_to_writes_file() {
    let h = common::setup_drive_mock().await;
    common::mount_download(&h.server, "media-1", b"image-data").await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("media").join("photo.jpg");

    let store = DriveRemoteStore::new(h.client.clone());
    let written = store.download_to(&rid("media-1"), &dest).await.unwrap();

    assert_eq!(written, 10);
    assert_eq!(std::fs::read(&dest).unwrap(), b"image-data");
    assert!(!dir.path().join("media").join("photo.jpg.part").exists());
}

#[tokio::test]
async fn test_download_missing_file_leaves_no_partial() {
    let h = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("photo.jpg");

    let err = h.client.download_to(&rid("gone"), &dest).await.unwrap_err();
    assert!(matches!(err, DriveError::NotFound(_)));
    assert!(!dest.exists());
    assert!(!dir.path().join("photo.jpg.part").exists());
}

// ============================================================================
// Delete and errors
// ============================================================================

#[tokio::test]
async fn test_delete_file() {
    let h = common::setup_drive_mock().await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/old"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;

    h.client.delete_file(&rid("old")).await.unwrap();
}

#[tokio::test]
async fn test_delete_missing_file_succeeds() {
    let h = common::setup_drive_mock().await;
    Mock::given(method("DELETE"))
        .and(path("/drive/v3/files/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&h.server)
        .await;

    h.client.delete_file(&rid("missing")).await.unwrap();
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let h = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/drive/v3/files"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&h.server)
        .await;

    match h.client.list_all_files().await {
        Err(DriveError::TooManyRequests { retry_after }) => {
            assert_eq!(retry_after, Duration::from_secs(7))
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_fetch_profile_email() {
    let h = common::setup_drive_mock().await;
    common::mount_about(&h.server, "someone@example.com").await;

    let email = h.client.fetch_profile_email().await.unwrap();
    assert_eq!(email, "someone@example.com");
}
