//! Shared test helpers for drive integration tests
//!
//! Provides a wiremock server standing in for both the token endpoint and
//! the file API, plus in-memory token and preference stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use daybook_core::ports::{IPreferenceStore, ITokenStore, Tokens};
use daybook_drive::auth::{OAuth2Config, RefreshClient};
use daybook_drive::authenticator::{AuthorizedHttp, TokenAuthenticator};
use daybook_drive::client::DriveClient;
use daybook_drive::profile::ProfileManager;

// ============================================================================
// In-memory stores
// ============================================================================

#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<Tokens>>,
    fail_loads: AtomicBool,
}

impl MemoryTokenStore {
    pub fn with_tokens(tokens: Tokens) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
            fail_loads: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> Option<Tokens> {
        self.tokens.lock().unwrap().clone()
    }

    pub fn fail_loads(&self) {
        self.fail_loads.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ITokenStore for MemoryTokenStore {
    async fn load(&self) -> anyhow::Result<Option<Tokens>> {
        if self.fail_loads.load(Ordering::SeqCst) {
            anyhow::bail!("token store unavailable");
        }
        Ok(self.current())
    }

    async fn store(&self, tokens: &Tokens) -> anyhow::Result<()> {
        *self.tokens.lock().unwrap() = Some(tokens.clone());
        Ok(())
    }

    async fn clear(&self) -> anyhow::Result<()> {
        *self.tokens.lock().unwrap() = None;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPrefs {
    values: Mutex<HashMap<String, String>>,
}

#[async_trait::async_trait]
impl IPreferenceStore for MemoryPrefs {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.values.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.values.lock().unwrap().remove(key);
        Ok(())
    }
}

// ============================================================================
// Harness
// ============================================================================

pub const OLD_TOKEN: &str = "old-access-token";
pub const NEW_TOKEN: &str = "new-access-token";
pub const REFRESH_TOKEN: &str = "test-refresh-token";

pub fn stored_tokens() -> Tokens {
    Tokens {
        access_token: OLD_TOKEN.to_string(),
        refresh_token: Some(REFRESH_TOKEN.to_string()),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

pub struct DriveHarness {
    pub server: MockServer,
    pub client: DriveClient,
    pub authenticator: Arc<TokenAuthenticator>,
    pub tokens: Arc<MemoryTokenStore>,
    pub prefs: Arc<MemoryPrefs>,
    pub refresher: Arc<RefreshClient>,
}

impl DriveHarness {
    pub fn profile_manager(&self) -> ProfileManager {
        ProfileManager::new(
            self.client.clone(),
            self.tokens.clone(),
            self.prefs.clone(),
            self.refresher.clone(),
        )
    }
}

/// Starts a mock server and a client whose token store holds [`OLD_TOKEN`]
pub async fn setup_drive_mock() -> DriveHarness {
    setup_with_tokens(MemoryTokenStore::with_tokens(stored_tokens())).await
}

pub async fn setup_with_tokens(tokens: MemoryTokenStore) -> DriveHarness {
    let server = MockServer::start().await;

    let tokens = Arc::new(tokens);
    let prefs = Arc::new(MemoryPrefs::default());
    let config =
        OAuth2Config::new("test-client").with_token_url(format!("{}/token", server.uri()));
    let refresher = Arc::new(RefreshClient::new(&config).unwrap());

    let authenticator = Arc::new(TokenAuthenticator::new(
        tokens.clone(),
        prefs.clone(),
        refresher.clone(),
    ));
    let http = AuthorizedHttp::new(reqwest::Client::new(), authenticator.clone());
    let client = DriveClient::new(http, &server.uri()).unwrap();

    DriveHarness {
        server,
        client,
        authenticator,
        tokens,
        prefs,
        refresher,
    }
}

// ============================================================================
// Mounts
// ============================================================================

/// Token endpoint issuing [`NEW_TOKEN`], expected `times` times
pub async fn mount_token_refresh(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": NEW_TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// Token endpoint rejecting the grant
pub async fn mount_token_invalid_grant(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Token endpoint failing with a server error
#[allow(dead_code)]
pub async fn mount_token_server_error(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(server)
        .await;
}

/// About endpoint returning the account email
#[allow(dead_code)]
pub async fn mount_about(server: &MockServer, email: &str) {
    Mock::given(method("GET"))
        .and(path("/drive/v3/about"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user": { "emailAddress": email, "displayName": "Test User" }
        })))
        .mount(server)
        .await;
}

/// Media download for file `id`
#[allow(dead_code)]
pub async fn mount_download(server: &MockServer, id: &str, content: &[u8]) {
    Mock::given(method("GET"))
        .and(path(format!("/drive/v3/files/{id}")))
        .and(wiremock::matchers::query_param("alt", "media"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(server)
        .await;
}
