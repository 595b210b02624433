//! In-memory cache of fully loaded notes
//!
//! Loading a note touches five tables; the cache keeps the assembled result
//! keyed by note id. Every write path invalidates the entry, so a miss is
//! always safe and the database stays the source of truth.
//!
//! Readers take an [`epoch`](NoteContentCache::epoch) before loading and
//! insert with [`insert_if_current`](NoteContentCache::insert_if_current), so
//! a load that raced with a write never caches the pre-write state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use daybook_core::domain::{Note, NoteId};

/// Concurrent note cache shared between the repository and its write tasks
#[derive(Debug, Clone, Default)]
pub struct NoteContentCache {
    entries: Arc<DashMap<NoteId, Note>>,
    epoch: Arc<AtomicU64>,
}

impl NoteContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &NoteId) -> Option<Note> {
        self.entries.get(id).map(|entry| entry.value().clone())
    }

    /// Current invalidation counter
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Caches `note` unless an invalidation happened since `epoch` was read
    pub fn insert_if_current(&self, note: Note, epoch: u64) -> bool {
        // The entry guard holds the shard lock, which orders this check
        // against the removal in `invalidate`.
        let entry = self.entries.entry(note.id);
        if self.epoch() != epoch {
            return false;
        }
        entry.insert(note);
        true
    }

    pub fn invalidate(&self, id: &NoteId) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if self.entries.remove(id).is_some() {
            tracing::trace!(note_id = %id, "Invalidated cached note");
        }
    }

    pub fn clear(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
