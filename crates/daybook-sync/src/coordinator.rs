//! Backup/restore coordinator
//!
//! Drives one backup or restore run at a time through
//! `Idle -> Starting -> Progress -> Success | Failure` and publishes every
//! transition on a `watch` channel. The coordinator is the only writer of
//! that state.
//!
//! ## Backup
//!
//! 1. List the app folder (all pages)
//! 2. Per note: upload attachments the remote side lacks, then create or
//!    replace `note-<id>.json`
//! 3. Delete remote files of notes deleted locally (tombstones)
//!
//! ## Restore
//!
//! Per remote note payload: download and parse it, fetch missing attachments
//! into the media directory, then create the note or reconcile the local copy
//! against it.
//!
//! Progress is reported after each note. A failure stops the run but keeps
//! what was already synced; rerunning is safe because every step is keyed by
//! note id or remote file name.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use daybook_core::domain::{
    Note, NoteId, NotePayload, RemoteFile, RemoteFileKind, SyncState,
};
use daybook_core::ports::{INoteRepository, IPreferenceStore, IRemoteFileStore};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::media::media_path;
use crate::retry::with_retry;
use crate::SyncError;

/// MIME type of note payload documents
const PAYLOAD_MIME: &str = "application/json";

/// Why an automatic backup did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotSignedIn,
    AutoBackupDisabled,
}

/// Result of [`BackupCoordinator::try_start_auto_backup`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupOutcome {
    /// The backup ran and synced this many notes
    Completed { synced: u32 },
    Skipped(SkipReason),
}

/// Orchestrates backup and restore runs
pub struct BackupCoordinator {
    notes: Arc<dyn INoteRepository>,
    remote: Arc<dyn IRemoteFileStore>,
    preferences: Arc<dyn IPreferenceStore>,
    media_dir: PathBuf,
    auto_backup_default: bool,
    state: watch::Sender<SyncState>,
    run_lock: Mutex<()>,
}

impl BackupCoordinator {
    pub fn new(
        notes: Arc<dyn INoteRepository>,
        remote: Arc<dyn IRemoteFileStore>,
        preferences: Arc<dyn IPreferenceStore>,
        media_dir: PathBuf,
    ) -> Self {
        let (state, _) = watch::channel(SyncState::Idle);
        Self {
            notes,
            remote,
            preferences,
            media_dir,
            auto_backup_default: true,
            state,
            run_lock: Mutex::new(()),
        }
    }

    /// Auto-backup setting assumed when the user never chose one
    pub fn with_auto_backup_default(mut self, enabled: bool) -> Self {
        self.auto_backup_default = enabled;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Returns a finished run to `Idle`; a running one is left alone
    pub fn reset(&self) {
        self.state.send_if_modified(|state| {
            if state.is_finished() {
                *state = SyncState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Periodic entry point; skips when signed out or auto-backup is off
    pub async fn try_start_auto_backup(&self) -> Result<BackupOutcome, SyncError> {
        let profile = self
            .preferences
            .backup_profile()
            .await
            .map_err(SyncError::Local)?;
        if profile.is_none() {
            debug!("Auto-backup skipped: not signed in");
            return Ok(BackupOutcome::Skipped(SkipReason::NotSignedIn));
        }

        let enabled = self
            .preferences
            .auto_backup_enabled(self.auto_backup_default)
            .await
            .map_err(SyncError::Local)?;
        if !enabled {
            debug!("Auto-backup skipped: disabled");
            return Ok(BackupOutcome::Skipped(SkipReason::AutoBackupDisabled));
        }

        let synced = self.backup_now().await?;
        Ok(BackupOutcome::Completed { synced })
    }

    /// Backs up every note; returns the number of notes synced
    pub async fn backup_now(&self) -> Result<u32, SyncError> {
        let _run = self.run_lock.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
        self.require_profile().await?;

        info!("Backup started");
        let guard = RunGuard::start(&self.state);
        let result = self.run_backup().await;
        guard.finish(&result);
        result
    }

    /// Restores every remote note; returns the number of notes restored
    pub async fn restore(&self) -> Result<u32, SyncError> {
        let _run = self.run_lock.try_lock().map_err(|_| SyncError::AlreadyRunning)?;
        self.require_profile().await?;

        info!("Restore started");
        let guard = RunGuard::start(&self.state);
        let result = self.run_restore().await;
        guard.finish(&result);
        result
    }

    async fn require_profile(&self) -> Result<(), SyncError> {
        match self.preferences.backup_profile().await {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(SyncError::NotSignedIn),
            Err(e) => Err(SyncError::Local(e)),
        }
    }

    fn progress(&self, synced: u32, total: u32) {
        self.state.send_replace(SyncState::Progress { synced, total });
    }

    // ========================================================================
    // Backup
    // ========================================================================

    async fn run_backup(&self) -> Result<u32, SyncError> {
        let mut remote_by_name = self.list_remote().await?;
        let notes = self.notes.list_notes().await.map_err(SyncError::Local)?;
        let total = notes.len() as u32;
        self.progress(0, total);

        for (index, note) in notes.iter().enumerate() {
            self.backup_note(note, &mut remote_by_name).await?;
            let synced = index as u32 + 1;
            self.progress(synced, total);
            debug!(note_id = %note.id, synced, total, "Note backed up");
        }

        self.delete_tombstoned(&remote_by_name).await?;

        info!(synced = total, "Backup finished");
        Ok(total)
    }

    async fn backup_note(
        &self,
        note: &Note,
        remote_by_name: &mut HashMap<String, RemoteFile>,
    ) -> Result<(), SyncError> {
        for name in note.attachment_names() {
            if remote_by_name.contains_key(name) {
                continue;
            }
            let Some(path) = media_path(&self.media_dir, name) else {
                warn!(note_id = %note.id, name, "Skipping attachment with unsafe name");
                continue;
            };
            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(note_id = %note.id, name, "Attachment missing locally, not uploaded");
                    continue;
                }
                Err(e) => return Err(SyncError::Local(e.into())),
            };

            let mime = RemoteFileKind::mime_for(name);
            let uploaded = with_retry("upload_attachment", || {
                self.remote.upload_file(name, mime, data.clone())
            })
            .await
            .map_err(SyncError::Remote)?;
            remote_by_name.insert(name.to_string(), uploaded);
        }

        let file_name = NotePayload::file_name(&note.id);
        let bytes = NotePayload::new(note.clone())
            .to_bytes()
            .map_err(|e| SyncError::Local(e.into()))?;

        let stored = match remote_by_name.get(&file_name) {
            Some(existing) => {
                let id = existing.id.clone();
                with_retry("update_note", || {
                    self.remote
                        .update_file(&id, &file_name, PAYLOAD_MIME, bytes.clone())
                })
                .await
            }
            None => {
                with_retry("upload_note", || {
                    self.remote.upload_file(&file_name, PAYLOAD_MIME, bytes.clone())
                })
                .await
            }
        }
        .map_err(SyncError::Remote)?;
        remote_by_name.insert(file_name, stored);
        Ok(())
    }

    async fn delete_tombstoned(
        &self,
        remote_by_name: &HashMap<String, RemoteFile>,
    ) -> Result<(), SyncError> {
        let tombstones = self.notes.take_tombstones().await.map_err(SyncError::Local)?;
        if tombstones.is_empty() {
            return Ok(());
        }

        // Attachments can be shared; only delete what no live note uses
        let in_use = self
            .notes
            .attachment_names()
            .await
            .map_err(SyncError::Local)?;

        let mut cleared: Vec<NoteId> = Vec::with_capacity(tombstones.len());
        for tombstone in &tombstones {
            let names = std::iter::once(NotePayload::file_name(&tombstone.note_id)).chain(
                tombstone
                    .attachment_names
                    .iter()
                    .filter(|name| !in_use.contains(name.as_str()))
                    .cloned(),
            );
            for name in names {
                if let Some(file) = remote_by_name.get(&name) {
                    with_retry("delete_file", || self.remote.delete_file(&file.id))
                        .await
                        .map_err(SyncError::Remote)?;
                    debug!(note_id = %tombstone.note_id, name, "Deleted remote file");
                }
            }
            cleared.push(tombstone.note_id);
        }

        self.notes
            .clear_tombstones(&cleared)
            .await
            .map_err(SyncError::Local)?;
        info!(count = cleared.len(), "Removed remote copies of deleted notes");
        Ok(())
    }

    // ========================================================================
    // Restore
    // ========================================================================

    async fn run_restore(&self) -> Result<u32, SyncError> {
        let remote_by_name = self.list_remote().await?;
        let mut payloads: Vec<&RemoteFile> = remote_by_name
            .values()
            .filter(|f| f.is_note_payload())
            .collect();
        payloads.sort_by(|a, b| a.name.cmp(&b.name));

        let total = payloads.len() as u32;
        self.progress(0, total);

        for (index, file) in payloads.into_iter().enumerate() {
            let note = self.download_payload(file).await?;
            self.restore_attachments(&note, &remote_by_name).await?;
            self.store_restored(&note).await?;

            let synced = index as u32 + 1;
            self.progress(synced, total);
            debug!(note_id = %note.id, synced, total, "Note restored");
        }

        info!(restored = total, "Restore finished");
        Ok(total)
    }

    async fn download_payload(&self, file: &RemoteFile) -> Result<Note, SyncError> {
        let data = with_retry("download_note", || self.remote.download(&file.id))
            .await
            .map_err(SyncError::Remote)?;
        let payload = NotePayload::from_bytes(&data).map_err(|e| SyncError::InvalidPayload {
            name: file.name.clone(),
            reason: e.to_string(),
        })?;

        if NotePayload::parse_file_name(&file.name) != Some(payload.note.id) {
            return Err(SyncError::InvalidPayload {
                name: file.name.clone(),
                reason: format!("payload holds note {}", payload.note.id),
            });
        }
        Ok(payload.note)
    }

    async fn restore_attachments(
        &self,
        note: &Note,
        remote_by_name: &HashMap<String, RemoteFile>,
    ) -> Result<(), SyncError> {
        for name in note.attachment_names() {
            let Some(dest) = media_path(&self.media_dir, name) else {
                warn!(note_id = %note.id, name, "Skipping attachment with unsafe name");
                continue;
            };
            if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
                continue;
            }
            let Some(file) = remote_by_name.get(name) else {
                warn!(note_id = %note.id, name, "Attachment missing remotely");
                continue;
            };
            with_retry("download_attachment", || self.remote.download_to(&file.id, &dest))
                .await
                .map_err(SyncError::Remote)?;
        }
        Ok(())
    }

    async fn store_restored(&self, note: &Note) -> Result<(), SyncError> {
        let existing = self.notes.get_note(&note.id).await.map_err(SyncError::Local)?;
        let report = match existing {
            Some(_) => self
                .notes
                .update_note_content(&note.id, note.to_update())
                .await
                .map_err(SyncError::Local)?,
            None => self.notes.create_note(note).await.map_err(SyncError::Local)?,
        };
        debug!(note_id = %note.id, changes = report.total_changes(), "Stored restored note");
        Ok(())
    }

    async fn list_remote(&self) -> Result<HashMap<String, RemoteFile>, SyncError> {
        let files = with_retry("list_files", || self.remote.list_files())
            .await
            .map_err(SyncError::Remote)?;
        let mut seen = HashSet::new();
        let mut by_name = HashMap::with_capacity(files.len());
        for file in files {
            if !seen.insert(file.name.clone()) {
                warn!(name = %file.name, id = %file.id, "Duplicate remote file name, keeping first");
                continue;
            }
            by_name.insert(file.name.clone(), file);
        }
        Ok(by_name)
    }
}

/// Publishes `Starting` on creation and the outcome on [`finish`](Self::finish)
///
/// A run dropped before finishing is published as failed.
struct RunGuard<'a> {
    state: &'a watch::Sender<SyncState>,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn start(state: &'a watch::Sender<SyncState>) -> Self {
        state.send_replace(SyncState::Starting);
        Self {
            state,
            finished: false,
        }
    }

    fn finish(mut self, result: &Result<u32, SyncError>) {
        self.finished = true;
        let next = match result {
            Ok(_) => SyncState::Success,
            Err(e) => {
                warn!(error = %e, "Sync run failed");
                SyncState::Failure {
                    reason: e.to_string(),
                }
            }
        };
        self.state.send_replace(next);
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.state.send_replace(SyncState::Failure {
                reason: "interrupted".to_string(),
            });
        }
    }
}
