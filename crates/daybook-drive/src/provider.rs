//! `IRemoteFileStore` adapter over [`DriveClient`]

use std::path::Path;

use anyhow::Result;
use daybook_core::domain::{RemoteFile, RemoteFileId};
use daybook_core::ports::IRemoteFileStore;

use crate::client::DriveClient;

/// Remote file store backed by the Drive app folder
#[derive(Clone)]
pub struct DriveRemoteStore {
    client: DriveClient,
}

impl DriveRemoteStore {
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &DriveClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl IRemoteFileStore for DriveRemoteStore {
    async fn list_files(&self) -> Result<Vec<RemoteFile>> {
        Ok(self.client.list_all_files().await?)
    }

    async fn upload_file(&self, name: &str, mime_type: &str, data: Vec<u8>) -> Result<RemoteFile> {
        Ok(self.client.upload_file(name, mime_type, data).await?)
    }

    async fn update_file(
        &self,
        id: &RemoteFileId,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<RemoteFile> {
        Ok(self.client.update_file(id, name, mime_type, data).await?)
    }

    async fn download(&self, id: &RemoteFileId) -> Result<Vec<u8>> {
        Ok(self.client.download(id).await?)
    }

    async fn download_to(&self, id: &RemoteFileId, dest: &Path) -> Result<u64> {
        Ok(self.client.download_to(id, dest).await?)
    }

    async fn delete_file(&self, id: &RemoteFileId) -> Result<()> {
        Ok(self.client.delete_file(id).await?)
    }

    async fn fetch_profile_email(&self) -> Result<String> {
        Ok(self.client.fetch_profile_email().await?)
    }
}
