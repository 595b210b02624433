//! Daybook Core - Domain logic and business rules
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `Note`, `ContentItem`, `Tag`, `Sticker`, `SyncState`, `BackupProfile`
//! - **Reconciliation** - pure diffing of desired vs persisted note content
//! - **Port definitions** - Traits for adapters: `INoteRepository`, `IRemoteFileStore`,
//!   `IPreferenceStore`, `ITokenStore`, `IDeviceConditions`
//! - **Configuration** - typed YAML configuration with validation
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement
//! (`daybook-cache` for SQLite, `daybook-drive` for the remote store).

pub mod config;
pub mod domain;
pub mod ports;
