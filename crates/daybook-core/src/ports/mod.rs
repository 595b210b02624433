//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`INoteRepository`] - Note persistence and content reconciliation
//! - [`IRemoteFileStore`] - Remote app-folder file operations
//! - [`IPreferenceStore`] - Key/value user preferences with typed accessors
//! - [`ITokenStore`] - OAuth token persistence
//! - [`IDeviceConditions`] - Network/idle checks for background jobs

pub mod device;
pub mod note_repository;
pub mod preferences;
pub mod remote_store;

pub use device::IDeviceConditions;
pub use note_repository::{INoteRepository, PendingMedia, TagSummary, Tombstone};
pub use preferences::{keys, IPreferenceStore, ITokenStore, Tokens};
pub use remote_store::IRemoteFileStore;
