//! Journal notes and their content
//!
//! A [`Note`] owns an ordered list of [`ContentItem`]s (title text, media and
//! voice recordings), a set of [`Tag`]s, free-floating [`Sticker`]s, a
//! [`Mood`] and [`FontSettings`]. Position in `content` is the persisted order.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{ContentId, NoteId, StickerId};

/// Kind of a media attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Stable string stored in the database
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            other => Err(DomainError::UnknownVariant {
                kind: "media kind",
                value: other.to_string(),
            }),
        }
    }
}

/// A single ordered piece of note content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentItem {
    /// Block of text
    Title { id: ContentId, text: String },
    /// Image or video; `name` is the file name inside the media directory
    Media { name: String, kind: MediaKind },
    /// Voice recording
    Voice {
        id: ContentId,
        file_name: String,
        duration_ms: u64,
    },
}

impl ContentItem {
    /// Creates a new title item with a fresh id
    #[must_use]
    pub fn title(text: impl Into<String>) -> Self {
        Self::Title {
            id: ContentId::new(),
            text: text.into(),
        }
    }

    /// Creates a media item
    #[must_use]
    pub fn media(name: impl Into<String>, kind: MediaKind) -> Self {
        Self::Media {
            name: name.into(),
            kind,
        }
    }

    /// Creates a new voice item with a fresh id
    #[must_use]
    pub fn voice(file_name: impl Into<String>, duration_ms: u64) -> Self {
        Self::Voice {
            id: ContentId::new(),
            file_name: file_name.into(),
            duration_ms,
        }
    }

    /// Name of the file backing this item, if any
    #[must_use]
    pub fn attachment_name(&self) -> Option<&str> {
        match self {
            Self::Title { .. } => None,
            Self::Media { name, .. } => Some(name),
            Self::Voice { file_name, .. } => Some(file_name),
        }
    }
}

/// Title-keyed label attached to notes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag {
    pub title: String,
}

impl Tag {
    /// Creates a tag, trimming surrounding whitespace
    ///
    /// # Errors
    /// Returns error if the title is blank
    pub fn new(title: impl Into<String>) -> Result<Self, DomainError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(DomainError::ValidationFailed(
                "Tag title cannot be empty".to_string(),
            ));
        }
        Ok(Self { title })
    }
}

/// Sticker placed on a note canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: StickerId,
    pub asset: String,
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl Sticker {
    /// Creates a sticker at the given position with unit scale and no rotation
    #[must_use]
    pub fn new(asset: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: StickerId::new(),
            asset: asset.into(),
            x,
            y,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

/// Font used to render a note's text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSettings {
    pub family: String,
    pub size: f32,
    pub color: String,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            family: "default".to_string(),
            size: 16.0,
            color: "#000000".to_string(),
        }
    }
}

/// Mood picked for a note
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mood {
    Happy,
    Calm,
    Neutral,
    Sad,
    Angry,
}

impl Mood {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Calm => "calm",
            Self::Neutral => "neutral",
            Self::Sad => "sad",
            Self::Angry => "angry",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "happy" => Ok(Self::Happy),
            "calm" => Ok(Self::Calm),
            "neutral" => Ok(Self::Neutral),
            "sad" => Ok(Self::Sad),
            "angry" => Ok(Self::Angry),
            other => Err(DomainError::UnknownVariant {
                kind: "mood",
                value: other.to_string(),
            }),
        }
    }
}

/// A journal entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub mood: Option<Mood>,
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub stickers: Vec<Sticker>,
    #[serde(default)]
    pub font: FontSettings,
}

impl Note {
    /// Creates an empty note stamped with the current time
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NoteId::new(),
            created_at: Utc::now(),
            mood: None,
            content: Vec::new(),
            tags: Vec::new(),
            stickers: Vec::new(),
            font: FontSettings::default(),
        }
    }

    /// File names of every media and voice attachment, in content order
    pub fn attachment_names(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(ContentItem::attachment_name)
    }

    /// The editable part of this note
    #[must_use]
    pub fn to_update(&self) -> NoteContentUpdate {
        NoteContentUpdate {
            content: self.content.clone(),
            tags: self.tags.clone(),
            stickers: self.stickers.clone(),
            font: self.font.clone(),
            mood: self.mood,
        }
    }
}

impl Default for Note {
    fn default() -> Self {
        Self::new()
    }
}

/// Checks that `name` can be stored directly inside the media directory
///
/// Attachment names are plain file names: no separators, no parent
/// references and no leading dot.
///
/// # Errors
/// Returns `DomainError::ValidationFailed` for any other name
pub fn validate_attachment_name(name: &str) -> Result<(), DomainError> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0']);
    if plain {
        Ok(())
    } else {
        Err(DomainError::ValidationFailed(format!(
            "Attachment name is not a plain file name: {name:?}"
        )))
    }
}

/// Desired editable state of a note, handed to reconciliation
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NoteContentUpdate {
    pub content: Vec<ContentItem>,
    pub tags: Vec<Tag>,
    pub stickers: Vec<Sticker>,
    pub font: FontSettings,
    pub mood: Option<Mood>,
}

/// JSON document stored remotely for one note
///
/// Attachments are referenced by file name and uploaded as separate files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotePayload {
    pub version: u32,
    pub note: Note,
}

impl NotePayload {
    pub const CURRENT_VERSION: u32 = 1;
    const PREFIX: &'static str = "note-";
    const SUFFIX: &'static str = ".json";

    #[must_use]
    pub fn new(note: Note) -> Self {
        Self {
            version: Self::CURRENT_VERSION,
            note,
        }
    }

    /// Remote file name for a note payload (`note-<id>.json`)
    #[must_use]
    pub fn file_name(id: &NoteId) -> String {
        format!("{}{}{}", Self::PREFIX, id, Self::SUFFIX)
    }

    /// Extracts the note id from a payload file name
    #[must_use]
    pub fn parse_file_name(name: &str) -> Option<NoteId> {
        name.strip_prefix(Self::PREFIX)?
            .strip_suffix(Self::SUFFIX)?
            .parse()
            .ok()
    }

    /// Serializes the payload
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a payload, rejecting versions newer than this build understands
    ///
    /// # Errors
    /// Returns error if the bytes are not a valid payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DomainError> {
        let payload: Self = serde_json::from_slice(bytes)
            .map_err(|e| DomainError::ValidationFailed(format!("Malformed note payload: {e}")))?;
        if payload.version > Self::CURRENT_VERSION {
            return Err(DomainError::ValidationFailed(format!(
                "Unsupported note payload version {}",
                payload.version
            )));
        }
        Ok(payload)
    }
}
