//! Shared data types returned by vault operations.
//!
//! These are the JSON-serializable shapes the MCP layer hands to callers.
//! A password only appears in an `EntryRecord` when the caller explicitly
//! asked for it; everything else is metadata.

use std::collections::BTreeMap;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::config::AccessMode;

/// A credential entry as exposed over the API.
#[derive(Debug, Clone, Serialize)]
pub struct EntryRecord {
    /// Stable unique id, assigned at creation and immutable afterwards.
    pub id: String,
    pub title: String,
    pub username: String,
    /// Only populated on explicit request (`include_password`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub url: String,
    pub notes: String,
    pub tags: Vec<String>,
    pub custom_fields: BTreeMap<String, String>,
    /// Name of the owning group.
    pub group: String,
    pub group_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<usize>,
}

impl EntryRecord {
    /// Copy with the password stripped, for list/search responses.
    pub fn redacted(mut self) -> Self {
        self.password = None;
        self
    }
}

/// A group (folder) in the database tree.
#[derive(Debug, Clone, Serialize)]
pub struct GroupRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Slash-joined path from the root group.
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub entry_count: usize,
    pub subgroup_count: usize,
    pub is_recycle_bin: bool,
}

/// A search hit with its relevance score attached.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: EntryRecord,
    pub relevance: f64,
}

/// An authenticated session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub mode: AccessMode,
    pub created_at: Instant,
    pub last_access: Instant,
}

/// Record of a single backup file.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct BackupRecord {
    pub filename: String,
    pub created_at: DateTime<Utc>,
    /// What triggered the backup (`manual`, `pre_write`, `pre_restore`).
    pub reason: String,
    /// SHA-256 of the database bytes at copy time.
    pub checksum: String,
    pub size: u64,
    pub compressed: bool,
    pub verified: bool,
}

/// Password strength analysis.
#[derive(Debug, Clone, Serialize)]
pub struct StrengthReport {
    /// 0-100.
    pub score: u8,
    pub category: StrengthCategory,
    pub feedback: Vec<String>,
    pub entropy_bits: f64,
    pub length: usize,
    pub has_uppercase: bool,
    pub has_lowercase: bool,
    pub has_digits: bool,
    pub has_symbols: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrengthCategory {
    VeryWeak,
    Weak,
    Fair,
    Strong,
    VeryStrong,
}

/// An entry flagged by the weak-password scan.
#[derive(Debug, Clone, Serialize)]
pub struct WeakEntry {
    pub id: String,
    pub title: String,
    pub group: String,
    pub reasons: Vec<String>,
}

/// Summary shape for `validate_entries`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub total_entries: usize,
    pub weak_passwords: Vec<WeakEntry>,
    pub empty_passwords: Vec<EntryRef>,
    pub duplicate_titles: Vec<EntryRef>,
    pub missing_urls: Vec<EntryRef>,
    pub expired_entries: Vec<EntryRef>,
    pub total_issues: usize,
}

/// Minimal reference to an entry in reports.
#[derive(Debug, Clone, Serialize)]
pub struct EntryRef {
    pub id: String,
    pub title: String,
    pub group: String,
}

/// Response to a successful authentication.
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub mode: AccessMode,
    /// Hard session lifetime in seconds.
    pub expires_in: u64,
}

/// A generated password together with its strength analysis.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedPassword {
    pub password: String,
    pub strength: StrengthReport,
}

/// Non-secret database overview.
#[derive(Debug, Clone, Serialize)]
pub struct DatabaseInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub entry_count: usize,
    pub group_count: usize,
    pub locked: bool,
    pub access_mode: AccessMode,
}

/// Liveness response; requires no session.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub locked: bool,
    pub database_reachable: bool,
}

impl EntryRecord {
    /// Minimal reference for report payloads.
    pub fn to_ref(&self) -> EntryRef {
        EntryRef {
            id: self.id.clone(),
            title: self.title.clone(),
            group: self.group.clone(),
        }
    }
}
