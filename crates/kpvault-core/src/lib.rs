//! Core vault logic for kpvault.
//!
//! This crate owns everything below the wire protocol: KeePass database
//! access, sessions and rate limiting, search and scoring, password
//! generation, backups, and the audit trail. The MCP frontend is a thin
//! shell over [`Vault`].

pub mod audit;
pub mod backup;
pub mod config;
pub mod database;
pub mod error;
pub mod generator;
pub mod models;
pub mod search;
pub mod session;
pub mod vault;

pub use config::{AccessMode, Config};
pub use database::{DeleteGroupPolicy, EntryPatch, GroupPatch, NewEntry};
pub use error::{Result, VaultError};
pub use generator::PasswordSpec;
pub use models::{EntryRecord, GroupRecord, ScoredEntry};
pub use search::{SearchField, SearchOptions};
pub use vault::Vault;
