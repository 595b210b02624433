//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers and values.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// UUID-based ID types
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Create a new random ", $label)]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| DomainError::InvalidId(format!(concat!("Invalid ", $label, ": {}"), e)))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id!(
    /// Identifier for journal notes
    NoteId,
    "NoteId"
);

uuid_id!(
    /// Stable identifier for title and voice content items
    ContentId,
    "ContentId"
);

uuid_id!(
    /// Identifier for stickers placed on a note
    StickerId,
    "StickerId"
);

// ============================================================================
// Remote store types
// ============================================================================

/// Identifier assigned by the remote object store to an uploaded file
///
/// Opaque to Daybook; validated only to be non-empty and free of
/// whitespace and path separators so it can be embedded in a URL path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteFileId(String);

impl RemoteFileId {
    /// Create a new RemoteFileId
    ///
    /// # Errors
    /// Returns error if the ID is empty or contains forbidden characters
    pub fn new(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidRemoteId(
                "Remote ID cannot be empty".to_string(),
            ));
        }

        if id
            .chars()
            .any(|c| c.is_whitespace() || c == '/' || c == '?' || c == '#')
        {
            return Err(DomainError::InvalidRemoteId(format!(
                "Remote ID contains invalid characters: {id}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RemoteFileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RemoteFileId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for RemoteFileId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RemoteFileId> for String {
    fn from(id: RemoteFileId) -> Self {
        id.0
    }
}

// ============================================================================
// Email
// ============================================================================

/// Validated email address
///
/// Performs basic structural validation:
/// - Contains exactly one @
/// - Has non-empty local part
/// - Has non-empty domain with at least one dot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    /// Create a new validated Email
    ///
    /// # Errors
    /// Returns error if the email format is invalid
    pub fn new(email: String) -> Result<Self, DomainError> {
        let email = email.trim().to_string();
        Self::validate(&email)?;
        // Store in lowercase for consistency
        Ok(Self(email.to_lowercase()))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(email: &str) -> Result<(), DomainError> {
        if email.is_empty() {
            return Err(DomainError::InvalidEmail(
                "Email cannot be empty".to_string(),
            ));
        }

        let Some((local, domain)) = email.split_once('@') else {
            return Err(DomainError::InvalidEmail(format!(
                "Email must contain exactly one '@': {email}"
            )));
        };

        if domain.contains('@') {
            return Err(DomainError::InvalidEmail(format!(
                "Email must contain exactly one '@': {email}"
            )));
        }

        if local.is_empty() || local.len() > 64 {
            return Err(DomainError::InvalidEmail(format!(
                "Email local part must be 1..=64 chars: {email}"
            )));
        }

        if !local
            .chars()
            .all(|c| c.is_alphanumeric() || ".+-_".contains(c))
        {
            return Err(DomainError::InvalidEmail(format!(
                "Email local part contains invalid characters: {email}"
            )));
        }

        if domain.is_empty() || !domain.contains('.') {
            return Err(DomainError::InvalidEmail(format!(
                "Email domain must contain at least one dot: {email}"
            )));
        }

        if !domain
            .chars()
            .all(|c| c.is_alphanumeric() || ".-".contains(c))
        {
            return Err(DomainError::InvalidEmail(format!(
                "Email domain contains invalid characters: {email}"
            )));
        }

        if domain.starts_with('.') || domain.ends_with('.') {
            return Err(DomainError::InvalidEmail(format!(
                "Email domain cannot start or end with a dot: {email}"
            )));
        }

        Ok(())
    }
}

impl Display for Email {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Email {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_id_roundtrip_through_string() {
        let id = NoteId::new();
        let parsed: NoteId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_note_id_rejects_garbage() {
        let err = "not-a-uuid".parse::<NoteId>().unwrap_err();
        assert!(matches!(err, DomainError::InvalidId(_)));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(StickerId::new(), StickerId::new());
        assert_ne!(ContentId::new(), ContentId::new());
    }

    #[test]
    fn test_remote_file_id_validation() {
        assert!(RemoteFileId::new("1AbC-dEf_9".to_string()).is_ok());
        assert!(RemoteFileId::new(String::new()).is_err());
        assert!(RemoteFileId::new("a/b".to_string()).is_err());
        assert!(RemoteFileId::new("a b".to_string()).is_err());
    }

    #[test]
    fn test_remote_file_id_serde_rejects_empty() {
        let result: Result<RemoteFileId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_email_valid_and_lowercased() {
        let email = Email::new("  Writer@Example.COM ".to_string()).unwrap();
        assert_eq!(email.as_str(), "writer@example.com");
    }

    #[test]
    fn test_email_invalid() {
        for bad in ["", "nope", "a@b", "@example.com", "a@@example.com", "a@.com."] {
            assert!(Email::new(bad.to_string()).is_err(), "accepted {bad:?}");
        }
    }
}
