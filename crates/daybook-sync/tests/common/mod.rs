//! Shared fakes for daybook-sync integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use daybook_cache::{DatabasePool, SqliteNoteRepository, SqlitePreferenceStore};
use daybook_core::domain::{BackupProfile, Email, RemoteFile, RemoteFileId};
use daybook_core::ports::{IDeviceConditions, IPreferenceStore, IRemoteFileStore};

// ============================================================================
// Remote store
// ============================================================================

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub mime: String,
    pub data: Vec<u8>,
}

/// In-memory app folder recording every mutating call
#[derive(Default)]
pub struct MemoryRemote {
    files: Mutex<Vec<StoredFile>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<String>>,
    list_gate: Mutex<Option<Arc<Notify>>>,
}

impl MemoryRemote {
    pub fn files(&self) -> Vec<StoredFile> {
        self.files.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.files().into_iter().map(|f| f.name).collect();
        names.sort();
        names
    }

    pub fn file(&self, name: &str) -> Option<StoredFile> {
        self.files().into_iter().find(|f| f.name == name)
    }

    /// Mutating calls as `op:name`, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Uploads and updates of `name` fail with a permanent error
    pub fn fail_writes_of(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Makes `list_files` wait until the returned handle is notified
    pub fn gate_listing(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.list_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn insert(&self, name: &str, mime: &str, data: Vec<u8>) -> String {
        let id = format!("file-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.files.lock().unwrap().push(StoredFile {
            id: id.clone(),
            name: name.to_string(),
            mime: mime.to_string(),
            data,
        });
        id
    }

    fn record(&self, op: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{op}:{name}"));
    }

    fn check_writable(&self, name: &str) -> anyhow::Result<()> {
        if self.failing.lock().unwrap().contains(name) {
            anyhow::bail!("Forbidden: write of {name} rejected");
        }
        Ok(())
    }

    fn to_remote(file: &StoredFile) -> RemoteFile {
        RemoteFile::new(
            RemoteFileId::new(file.id.clone()).unwrap(),
            file.name.clone(),
            Some(&file.mime),
        )
    }

    fn find(&self, id: &RemoteFileId) -> anyhow::Result<StoredFile> {
        self.files()
            .into_iter()
            .find(|f| f.id == id.as_str())
            .ok_or_else(|| anyhow::anyhow!("Not found: {id}"))
    }
}

#[async_trait::async_trait]
impl IRemoteFileStore for MemoryRemote {
    async fn list_files(&self) -> anyhow::Result<Vec<RemoteFile>> {
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.files().iter().map(Self::to_remote).collect())
    }

    async fn upload_file(&self, name: &str, mime: &str, data: Vec<u8>) -> anyhow::Result<RemoteFile> {
        self.check_writable(name)?;
        self.record("upload", name);
        let id = self.insert(name, mime, data);
        Ok(Self::to_remote(&self.find(&RemoteFileId::new(id)?)?))
    }

    async fn update_file(
        &self,
        id: &RemoteFileId,
        name: &str,
        mime: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<RemoteFile> {
        self.check_writable(name)?;
        self.record("update", name);
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| f.id == id.as_str())
            .ok_or_else(|| anyhow::anyhow!("Not found: {id}"))?;
        file.name = name.to_string();
        file.mime = mime.to_string();
        file.data = data;
        Ok(Self::to_remote(file))
    }

    async fn download(&self, id: &RemoteFileId) -> anyhow::Result<Vec<u8>> {
        Ok(self.find(id)?.data)
    }

    async fn download_to(&self, id: &RemoteFileId, dest: &Path) -> anyhow::Result<u64> {
        let data = self.find(id)?.data;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &data).await?;
        Ok(data.len() as u64)
    }

    async fn delete_file(&self, id: &RemoteFileId) -> anyhow::Result<()> {
        let file = self.find(id)?;
        self.record("delete", &file.name);
        self.files.lock().unwrap().retain(|f| f.id != id.as_str());
        Ok(())
    }

    async fn fetch_profile_email(&self) -> anyhow::Result<String> {
        Ok("user@example.com".to_string())
    }
}

// ============================================================================
// Device conditions
// ============================================================================

pub struct FakeConditions {
    pub network: AtomicBool,
    pub idle: AtomicBool,
}

impl FakeConditions {
    pub fn new(network: bool, idle: bool) -> Self {
        Self {
            network: AtomicBool::new(network),
            idle: AtomicBool::new(idle),
        }
    }
}

#[async_trait::async_trait]
impl IDeviceConditions for FakeConditions {
    async fn is_network_connected(&self) -> bool {
        self.network.load(Ordering::SeqCst)
    }

    async fn is_device_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }
}

// ============================================================================
// Local stores
// ============================================================================

pub struct LocalStores {
    pub db: DatabasePool,
    pub notes: Arc<SqliteNoteRepository>,
    pub prefs: Arc<SqlitePreferenceStore>,
}

pub async fn local_stores() -> LocalStores {
    let db = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    let notes = Arc::new(SqliteNoteRepository::new(db.pool().clone()));
    let prefs = Arc::new(SqlitePreferenceStore::new(db.pool().clone()));
    LocalStores { db, notes, prefs }
}

pub async fn sign_in(prefs: &SqlitePreferenceStore) {
    prefs
        .set_backup_profile(&BackupProfile::new(
            Email::new("user@example.com".to_string()).unwrap(),
        ))
        .await
        .unwrap();
}

/// Preference store without a database, safe under paused time
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
