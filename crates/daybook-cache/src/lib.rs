//! Daybook Cache - Local note persistence
//!
//! SQLite-based store for:
//! - Notes with their ordered content (titles, media, voice recordings)
//! - Tags, stickers and font settings
//! - User preferences and OAuth tokens
//! - Tombstones of deleted notes and the pending-media queue
//!
//! ## Architecture
//!
//! This crate implements the `INoteRepository`, `IPreferenceStore` and
//! `ITokenStore` ports from `daybook-core` using SQLite as the storage
//! backend. It is a driven (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteNoteRepository`] - `INoteRepository` with transactional reconciliation
//! - [`SqlitePreferenceStore`] - `IPreferenceStore` + `ITokenStore`
//! - [`NoteContentCache`] - In-memory note cache, never a source of truth
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use daybook_cache::{DatabasePool, SqliteNoteRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/daybook/daybook.db")).await?;
//! let repo = SqliteNoteRepository::new(pool.pool().clone());
//! // Use repo as INoteRepository...
//! # Ok(())
//! # }
//! ```

pub mod content_cache;
pub mod pool;
pub mod preferences;
pub mod repository;

pub use content_cache::NoteContentCache;
pub use pool::DatabasePool;
pub use preferences::SqlitePreferenceStore;
pub use repository::SqliteNoteRepository;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A multi-table write was rolled back
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// The referenced note does not exist
    #[error("Note not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
