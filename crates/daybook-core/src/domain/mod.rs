//! Domain entities and business logic
//!
//! This module contains the core domain types for Daybook:
//! - Newtypes for type-safe identifiers and validated values
//! - Notes and their content items, tags, stickers and font settings
//! - Pure reconciliation (diffing) of note content
//! - Remote file classification
//! - Backup state, profile and period types
//! - Domain-specific error types

pub mod errors;
pub mod newtypes;
pub mod note;
pub mod reconcile;
pub mod remote_file;
pub mod sync_state;

// Re-export commonly used types
pub use errors::DomainError;
pub use newtypes::*;
pub use note::{
    ContentItem, FontSettings, MediaKind, Mood, Note, NoteContentUpdate, NotePayload, Sticker, Tag,
    validate_attachment_name,
};
pub use reconcile::{ContentDelta, ReconcileReport, StickerDiff};
pub use remote_file::{RemoteFile, RemoteFileKind};
pub use sync_state::{BackupPeriod, BackupProfile, SyncState};
