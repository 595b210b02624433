//! App-folder file client
//!
//! Typed wrapper over the Drive v3 REST endpoints used for backups. All
//! files live in the application's private `appDataFolder` space; nothing
//! outside it is listed or touched.
//!
//! Requests go through [`AuthorizedHttp`], so bearer tokens and the single
//! re-authorization after a 401 are handled below this layer.

use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use daybook_core::domain::{RemoteFile, RemoteFileId};
use futures_util::{Stream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{header, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

use crate::authenticator::AuthorizedHttp;
use crate::DriveError;

/// Production API host
pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com";

/// Private per-application space
const APP_FOLDER: &str = "appDataFolder";

/// Fields requested for every file resource
const FILE_FIELDS: &str = "id,name,mimeType";

/// Files returned per list page
const PAGE_SIZE: u32 = 100;

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileResource {
    id: String,
    name: String,
    mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AboutResponse {
    user: Option<AboutUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AboutUser {
    email_address: Option<String>,
}

impl TryFrom<FileResource> for RemoteFile {
    type Error = DriveError;

    fn try_from(resource: FileResource) -> Result<Self, Self::Error> {
        let id = RemoteFileId::new(resource.id)
            .map_err(|e| DriveError::InvalidResponse(e.to_string()))?;
        Ok(RemoteFile::new(
            id,
            resource.name,
            resource.mime_type.as_deref(),
        ))
    }
}

/// One page of a file listing
#[derive(Debug, Clone)]
pub struct FileListPage {
    pub files: Vec<RemoteFile>,
    /// Token for the next page, `None` on the last page
    pub next_page_token: Option<String>,
}

// ============================================================================
// DriveClient
// ============================================================================

/// HTTP client for the app-folder file API
#[derive(Clone)]
pub struct DriveClient {
    http: AuthorizedHttp,
    base_url: String,
}

impl DriveClient {
    /// Creates a client rooted at `base_url` (scheme and host, no path)
    pub fn new(http: AuthorizedHttp, base_url: &str) -> Result<Self, DriveError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| DriveError::InvalidResponse(format!("Invalid base URL: {e}")))?;
        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn files_url(&self) -> String {
        format!("{}/drive/v3/files", self.base_url)
    }

    fn file_url(&self, id: &RemoteFileId) -> String {
        format!("{}/drive/v3/files/{}", self.base_url, id.as_str())
    }

    fn upload_url(&self) -> String {
        format!("{}/upload/drive/v3/files", self.base_url)
    }

    /// Lists one page of files in the app folder
    pub async fn list_files_page(
        &self,
        page_token: Option<&str>,
    ) -> Result<FileListPage, DriveError> {
        let url = self.files_url();
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let page_size = PAGE_SIZE.to_string();

        let response = self
            .http
            .execute(|client| {
                let mut request = client.get(&url).query(&[
                    ("spaces", APP_FOLDER),
                    ("fields", fields.as_str()),
                    ("pageSize", page_size.as_str()),
                ]);
                if let Some(token) = page_token {
                    request = request.query(&[("pageToken", token)]);
                }
                Ok(request)
            })
            .await?;

        let body: FileListResponse = check_status(response).await?.json().await?;
        let files = body
            .files
            .into_iter()
            .map(RemoteFile::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            count = files.len(),
            has_more = body.next_page_token.is_some(),
            "Listed file page"
        );
        Ok(FileListPage {
            files,
            next_page_token: body.next_page_token,
        })
    }

    /// Lists every file in the app folder, following page tokens
    pub async fn list_all_files(&self) -> Result<Vec<RemoteFile>, DriveError> {
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_files_page(page_token.as_deref()).await?;
            files.extend(page.files);
            match page.next_page_token {
                Some(next) if page_token.as_deref() != Some(next.as_str()) => {
                    page_token = Some(next)
                }
                Some(_) => {
                    return Err(DriveError::InvalidResponse(
                        "Server repeated the same page token".to_string(),
                    ))
                }
                None => break,
            }
        }

        info!(count = files.len(), "Listed remote files");
        Ok(files)
    }

    /// Creates a new file in the app folder
    pub async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<RemoteFile, DriveError> {
        let url = self.upload_url();
        let metadata = serde_json::json!({ "name": name, "parents": [APP_FOLDER] }).to_string();

        let response = self
            .http
            .execute(|client| {
                Ok(client
                    .post(&url)
                    .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                    .multipart(multipart_form(&metadata, mime_type, &data)?))
            })
            .await?;

        let resource: FileResource = check_status(response).await?.json().await?;
        let file = RemoteFile::try_from(resource)?;
        info!(name, id = %file.id, bytes = data.len(), "Uploaded file");
        Ok(file)
    }

    /// Replaces the content of an existing file
    pub async fn update_file(
        &self,
        id: &RemoteFileId,
        name: &str,
        mime_type: &str,
        data: Vec<u8>,
    ) -> Result<RemoteFile, DriveError> {
        let url = format!("{}/{}", self.upload_url(), id.as_str());
        let metadata = serde_json::json!({ "name": name }).to_string();

        let response = self
            .http
            .execute(|client| {
                Ok(client
                    .patch(&url)
                    .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
                    .multipart(multipart_form(&metadata, mime_type, &data)?))
            })
            .await?;

        let resource: FileResource = check_status(response).await?.json().await?;
        let file = RemoteFile::try_from(resource)?;
        info!(name, id = %file.id, bytes = data.len(), "Updated file");
        Ok(file)
    }

    /// Streams the content of a file
    pub async fn download_stream(
        &self,
        id: &RemoteFileId,
    ) -> Result<impl Stream<Item = Result<Bytes, DriveError>>, DriveError> {
        let url = self.file_url(id);
        let response = self
            .http
            .execute(|client| Ok(client.get(&url).query(&[("alt", "media")])))
            .await?;

        let response = check_status(response).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(DriveError::from)))
    }

    /// Downloads a file into memory
    pub async fn download(&self, id: &RemoteFileId) -> Result<Vec<u8>, DriveError> {
        let mut stream = Box::pin(self.download_stream(id).await?);
        let mut data = Vec::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk?);
        }
        debug!(id = %id, bytes = data.len(), "Downloaded file");
        Ok(data)
    }

    /// Downloads a file to `dest`, replacing it only once fully written
    pub async fn download_to(&self, id: &RemoteFileId, dest: &Path) -> Result<u64, DriveError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(dest);

        let result = async {
            let mut stream = Box::pin(self.download_stream(id).await?);
            let mut file = tokio::fs::File::create(&partial).await?;
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            file.sync_all().await?;
            Ok::<_, DriveError>(written)
        }
        .await;

        match result {
            Ok(written) => {
                tokio::fs::rename(&partial, dest).await?;
                debug!(id = %id, path = %dest.display(), bytes = written, "Downloaded file to disk");
                Ok(written)
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                Err(e)
            }
        }
    }

    /// Deletes a file; deleting a file that is already gone succeeds
    pub async fn delete_file(&self, id: &RemoteFileId) -> Result<(), DriveError> {
        let url = self.file_url(id);
        let response = self.http.execute(|client| Ok(client.delete(&url))).await?;

        match check_status(response).await {
            Ok(_) => {
                info!(id = %id, "Deleted remote file");
                Ok(())
            }
            Err(DriveError::NotFound(_)) => {
                debug!(id = %id, "Remote file already deleted");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Email address of the account the tokens belong to
    pub async fn fetch_profile_email(&self) -> Result<String, DriveError> {
        let url = format!("{}/drive/v3/about", self.base_url);
        let response = self
            .http
            .execute(|client| Ok(client.get(&url).query(&[("fields", "user")])))
            .await?;

        let about: AboutResponse = check_status(response).await?.json().await?;
        about
            .user
            .and_then(|u| u.email_address)
            .ok_or_else(|| DriveError::InvalidResponse("Account has no email address".to_string()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Metadata part followed by the file content
fn multipart_form(metadata: &str, mime_type: &str, data: &[u8]) -> Result<Form, DriveError> {
    let metadata = Part::text(metadata.to_string()).mime_str("application/json; charset=UTF-8")?;
    let content = Part::bytes(data.to_vec()).mime_str(mime_type)?;
    Ok(Form::new().part("metadata", metadata).part("file", content))
}

/// Passes successful responses through and maps the rest to [`DriveError`]
async fn check_status(response: Response) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await.unwrap_or_default();
    Err(DriveError::from_status(status, retry_after, body))
}

fn partial_path(dest: &Path) -> std::path::PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
