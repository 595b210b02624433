//! Note repository port (driven/secondary port)
//!
//! Persistence for notes and everything hanging off them. All content edits
//! go through [`INoteRepository::update_note_content`], which applies a
//! [`ContentDelta`](crate::domain::ContentDelta) atomically.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific.
//! - Deleting a note leaves a [`Tombstone`] so the next backup can remove
//!   the note's remote files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::{Note, NoteContentUpdate, NoteId, ReconcileReport};

/// A tag together with the number of notes that use it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagSummary {
    pub title: String,
    pub note_count: u32,
}

/// Record of a deleted note whose remote copy still has to be removed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tombstone {
    pub note_id: NoteId,
    /// Attachment file names the note referenced when it was deleted
    pub attachment_names: Vec<String>,
    pub deleted_at: DateTime<Utc>,
}

/// Media file waiting to be copied into the media directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMedia {
    pub id: i64,
    pub source_path: PathBuf,
    pub file_name: String,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Port trait for note persistence
#[async_trait::async_trait]
pub trait INoteRepository: Send + Sync {
    /// Inserts a new note and its content in one transaction
    async fn create_note(&self, note: &Note) -> anyhow::Result<ReconcileReport>;

    /// Loads a note with its content, tags and stickers
    async fn get_note(&self, id: &NoteId) -> anyhow::Result<Option<Note>>;

    /// Lists every note, newest first
    async fn list_notes(&self) -> anyhow::Result<Vec<Note>>;

    /// Reconciles the stored note against `update`
    ///
    /// The write completes even if the returned future is dropped. On error
    /// nothing is written.
    async fn update_note_content(
        &self,
        id: &NoteId,
        update: NoteContentUpdate,
    ) -> anyhow::Result<ReconcileReport>;

    /// Deletes a note, purges tags it was the last user of and records a
    /// tombstone. Returns `false` when the note did not exist.
    async fn delete_note(&self, id: &NoteId) -> anyhow::Result<bool>;

    /// Lists tags with their usage counts, ordered by title
    async fn list_tags(&self) -> anyhow::Result<Vec<TagSummary>>;

    /// Removes tags no note references; returns how many were removed
    async fn purge_unreferenced_tags(&self) -> anyhow::Result<u64>;

    /// File names of every media and voice attachment referenced by any note
    async fn attachment_names(&self) -> anyhow::Result<HashSet<String>>;

    /// Tombstones not yet cleared, oldest first
    async fn take_tombstones(&self) -> anyhow::Result<Vec<Tombstone>>;

    /// Forgets tombstones whose remote files are gone
    async fn clear_tombstones(&self, ids: &[NoteId]) -> anyhow::Result<()>;

    /// Queues a media copy from `source` into the media directory
    async fn enqueue_pending_media(&self, source: &Path, file_name: &str) -> anyhow::Result<i64>;

    /// Queued media copies, oldest first
    async fn pending_media(&self) -> anyhow::Result<Vec<PendingMedia>>;

    /// Removes an entry from the media queue
    async fn complete_pending_media(&self, id: i64) -> anyhow::Result<()>;

    /// Records a failed copy attempt; returns the new attempt count
    async fn fail_pending_media(&self, id: i64, error: &str) -> anyhow::Result<u32>;
}
