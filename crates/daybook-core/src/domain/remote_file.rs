//! Files stored in the remote app folder

use serde::{Deserialize, Serialize};

use super::newtypes::RemoteFileId;
use super::note::NotePayload;

/// What a remote file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteFileKind {
    Image,
    Video,
    Voice,
    NotesData,
}

impl RemoteFileKind {
    /// Classifies a file by MIME type, falling back to the file extension
    /// when the MIME type is missing or generic.
    #[must_use]
    pub fn classify(name: &str, mime_type: Option<&str>) -> Self {
        match mime_type.map(|m| m.split(';').next().unwrap_or(m).trim()) {
            Some(m) if m.starts_with("image/") => return Self::Image,
            Some(m) if m.starts_with("video/") => return Self::Video,
            Some(m) if m.starts_with("audio/") => return Self::Voice,
            Some("application/json") => return Self::NotesData,
            _ => {}
        }

        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "heic" => Self::Image,
            "mp4" | "mov" | "webm" | "mkv" | "3gp" => Self::Video,
            "m4a" | "aac" | "mp3" | "ogg" | "wav" | "amr" => Self::Voice,
            _ => Self::NotesData,
        }
    }

    /// MIME type used when uploading a file of this kind
    #[must_use]
    pub fn mime_for(name: &str) -> &'static str {
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "heic" => "image/heic",
            "mp4" => "video/mp4",
            "mov" => "video/quicktime",
            "webm" => "video/webm",
            "m4a" => "audio/mp4",
            "mp3" => "audio/mpeg",
            "ogg" => "audio/ogg",
            "wav" => "audio/wav",
            "json" => "application/json",
            _ => "application/octet-stream",
        }
    }
}

/// A file in the remote app folder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub id: RemoteFileId,
    pub name: String,
    pub kind: RemoteFileKind,
}

impl RemoteFile {
    #[must_use]
    pub fn new(id: RemoteFileId, name: impl Into<String>, mime_type: Option<&str>) -> Self {
        let name = name.into();
        let kind = RemoteFileKind::classify(&name, mime_type);
        Self { id, name, kind }
    }

    /// True for note payload documents (`note-<id>.json`)
    #[must_use]
    pub fn is_note_payload(&self) -> bool {
        self.kind == RemoteFileKind::NotesData && NotePayload::parse_file_name(&self.name).is_some()
    }
}
