//! Remote file store port (driven/secondary port)
//!
//! Files live in a single app-private folder of the remote store. The
//! adapter handles authentication and pagination.

use std::path::Path;

use crate::domain::{RemoteFile, RemoteFileId};

/// Port trait for remote object store operations
#[async_trait::async_trait]
pub trait IRemoteFileStore: Send + Sync {
    /// Lists every file in the app folder, following continuation tokens
    async fn list_files(&self) -> anyhow::Result<Vec<RemoteFile>>;

    /// Uploads a new file
    async fn upload_file(&self, name: &str, mime_type: &str, data: Vec<u8>)
        -> anyhow::Result<RemoteFile>;

    /// Replaces the content of an existing file
    async fn update_file(
        &self,
        id: &RemoteFileId,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> anyhow::Result<RemoteFile>;

    /// Downloads a file into memory
    async fn download(&self, id: &RemoteFileId) -> anyhow::Result<Vec<u8>>;

    /// Streams a file to `dest`, returning the number of bytes written
    async fn download_to(&self, id: &RemoteFileId, dest: &Path) -> anyhow::Result<u64>;

    /// Deletes a file
    async fn delete_file(&self, id: &RemoteFileId) -> anyhow::Result<()>;

    /// Email of the account that owns the store
    async fn fetch_profile_email(&self) -> anyhow::Result<String>;
}
