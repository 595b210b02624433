//! Pure diffing of persisted against desired note content
//!
//! [`ContentDelta::compute`] decides what a note edit must delete and what it
//! must write. It performs no I/O; the persistence adapter applies the delta
//! inside a single transaction and fills in a [`ReconcileReport`] with the
//! number of rows that actually changed.

use std::collections::{HashMap, HashSet};

use super::newtypes::{ContentId, StickerId};
use super::note::{ContentItem, MediaKind, NoteContentUpdate, Sticker};

/// Media row to write at a given content position
#[derive(Debug, Clone, PartialEq)]
pub struct MediaRow {
    pub position: u32,
    pub name: String,
    pub kind: MediaKind,
}

/// Voice row to write at a given content position
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceRow {
    pub position: u32,
    pub id: ContentId,
    pub file_name: String,
    pub duration_ms: u64,
}

/// Title text row to write at a given content position
#[derive(Debug, Clone, PartialEq)]
pub struct TitleRow {
    pub position: u32,
    pub id: ContentId,
    pub text: String,
}

/// Sticker changes, pairwise disjoint by id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StickerDiff {
    pub to_delete: Vec<StickerId>,
    pub to_update: Vec<Sticker>,
    pub to_insert: Vec<Sticker>,
}

impl StickerDiff {
    /// Compares stickers by id. Matching ids with differing fields are
    /// updates; identical stickers produce nothing.
    #[must_use]
    pub fn compute(persisted: &[Sticker], desired: &[Sticker]) -> Self {
        let existing: HashMap<StickerId, &Sticker> =
            persisted.iter().map(|s| (s.id, s)).collect();
        let mut seen = HashSet::new();
        let mut diff = Self::default();

        for sticker in desired {
            if !seen.insert(sticker.id) {
                continue;
            }
            match existing.get(&sticker.id) {
                Some(old) if *old == sticker => {}
                Some(_) => diff.to_update.push(sticker.clone()),
                None => diff.to_insert.push(sticker.clone()),
            }
        }

        diff.to_delete = persisted
            .iter()
            .map(|s| s.id)
            .filter(|id| !seen.contains(id))
            .collect();

        diff
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_empty() && self.to_insert.is_empty()
    }
}

/// Everything a note edit has to delete or write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentDelta {
    pub media_to_delete: Vec<String>,
    pub media_to_upsert: Vec<MediaRow>,
    pub voices_to_delete: Vec<ContentId>,
    pub voices_to_upsert: Vec<VoiceRow>,
    pub titles_to_delete: Vec<ContentId>,
    pub titles_to_upsert: Vec<TitleRow>,
    pub tags_to_unlink: Vec<String>,
    pub tags_to_link: Vec<String>,
    pub stickers: StickerDiff,
}

impl ContentDelta {
    /// Diffs the persisted state of a note against the desired state.
    ///
    /// Every item of the desired content is listed for upsert so positions
    /// stay in sync; the store skips rows whose values are unchanged.
    /// Duplicate keys in `desired` keep their first occurrence.
    #[must_use]
    pub fn compute(persisted: &NoteContentUpdate, desired: &NoteContentUpdate) -> Self {
        let mut delta = Self::default();

        let mut media_seen = HashSet::new();
        let mut voice_seen = HashSet::new();
        let mut title_seen = HashSet::new();

        for (position, item) in (0u32..).zip(desired.content.iter()) {
            match item {
                ContentItem::Media { name, kind } => {
                    if media_seen.insert(name.as_str()) {
                        delta.media_to_upsert.push(MediaRow {
                            position,
                            name: name.clone(),
                            kind: *kind,
                        });
                    }
                }
                ContentItem::Voice {
                    id,
                    file_name,
                    duration_ms,
                } => {
                    if voice_seen.insert(*id) {
                        delta.voices_to_upsert.push(VoiceRow {
                            position,
                            id: *id,
                            file_name: file_name.clone(),
                            duration_ms: *duration_ms,
                        });
                    }
                }
                ContentItem::Title { id, text } => {
                    if title_seen.insert(*id) {
                        delta.titles_to_upsert.push(TitleRow {
                            position,
                            id: *id,
                            text: text.clone(),
                        });
                    }
                }
            }
        }

        for item in &persisted.content {
            match item {
                ContentItem::Media { name, .. } if !media_seen.contains(name.as_str()) => {
                    delta.media_to_delete.push(name.clone());
                }
                ContentItem::Voice { id, .. } if !voice_seen.contains(id) => {
                    delta.voices_to_delete.push(*id);
                }
                ContentItem::Title { id, .. } if !title_seen.contains(id) => {
                    delta.titles_to_delete.push(*id);
                }
                _ => {}
            }
        }

        let mut tag_seen = HashSet::new();
        for tag in &desired.tags {
            if tag_seen.insert(tag.title.as_str()) {
                delta.tags_to_link.push(tag.title.clone());
            }
        }
        delta.tags_to_unlink = persisted
            .tags
            .iter()
            .filter(|t| !tag_seen.contains(t.title.as_str()))
            .map(|t| t.title.clone())
            .collect();

        delta.stickers = StickerDiff::compute(&persisted.stickers, &desired.stickers);

        delta
    }
}

/// Number of rows each step of a reconciliation changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub media_deleted: u64,
    pub media_upserted: u64,
    pub voices_deleted: u64,
    pub voices_upserted: u64,
    pub titles_deleted: u64,
    pub titles_upserted: u64,
    pub note_updated: bool,
    pub tags_unlinked: u64,
    pub tags_linked: u64,
    pub tags_purged: u64,
    pub stickers_deleted: u64,
    pub stickers_updated: u64,
    pub stickers_inserted: u64,
}

impl ReconcileReport {
    /// Total number of changed rows
    #[must_use]
    pub fn total_changes(&self) -> u64 {
        self.media_deleted
            + self.media_upserted
            + self.voices_deleted
            + self.voices_upserted
            + self.titles_deleted
            + self.titles_upserted
            + u64::from(self.note_updated)
            + self.tags_unlinked
            + self.tags_linked
            + self.tags_purged
            + self.stickers_deleted
            + self.stickers_updated
            + self.stickers_inserted
    }

    /// True when the edit was a no-op
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_changes() == 0
    }
}
