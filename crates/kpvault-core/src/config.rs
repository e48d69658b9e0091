//! Environment-driven configuration.
//!
//! The vault consumes an immutable `Config` at startup and never re-reads
//! the environment mid-session. Call `dotenvy::dotenv()` before
//! `Config::from_env()` if a `.env` file should be honored.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, VaultError};

/// Database access mode for the whole process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    ReadOnly,
    ReadWrite,
}

/// Immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the KeePass database file.
    pub db_path: PathBuf,
    /// Optional key file combined with the master password.
    pub key_file: Option<PathBuf>,
    /// Directory where backups are written.
    pub backup_dir: PathBuf,
    /// Whether write operations are permitted at all.
    pub access_mode: AccessMode,
    /// Take a backup before every destructive operation.
    pub auto_backup: bool,
    /// Retention count; oldest backups beyond this are pruned.
    pub backup_count: usize,
    /// Hard session lifetime.
    pub session_timeout: Duration,
    /// Idle window after which the session auto-locks.
    pub auto_lock: Duration,
    /// Failed authentication attempts allowed per rolling window.
    pub max_auth_attempts: usize,
    /// Width of the rolling rate-limit window.
    pub auth_window: Duration,
    /// Concurrent operations admitted before backpressure kicks in.
    pub max_concurrent_ops: usize,
    /// Bound on save/backup disk work.
    pub op_timeout: Duration,
}

impl Config {
    /// Build a configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let db_path = PathBuf::from(require_var("KEEPASS_DB_PATH")?);
        let key_file = optional_var("KEEPASS_KEY_FILE").map(PathBuf::from);
        let backup_dir = optional_var("KEEPASS_BACKUP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_backup_dir);

        let access_mode = match optional_var("KEEPASS_ACCESS_MODE").as_deref() {
            None | Some("readonly") => AccessMode::ReadOnly,
            Some("readwrite") => AccessMode::ReadWrite,
            Some(other) => {
                return Err(VaultError::Validation(format!(
                    "KEEPASS_ACCESS_MODE must be 'readonly' or 'readwrite', got '{other}'"
                )))
            }
        };

        let config = Self {
            db_path,
            key_file,
            backup_dir,
            access_mode,
            auto_backup: parse_var("KEEPASS_AUTO_BACKUP", true)?,
            backup_count: parse_var("KEEPASS_BACKUP_COUNT", 10usize)?,
            session_timeout: Duration::from_secs(parse_var("KEEPASS_SESSION_TIMEOUT", 3600u64)?),
            auto_lock: Duration::from_secs(parse_var("KEEPASS_AUTO_LOCK", 1800u64)?),
            max_auth_attempts: parse_var("KEEPASS_MAX_RETRIES", 3usize)?,
            auth_window: Duration::from_secs(parse_var("KEEPASS_AUTH_WINDOW", 300u64)?),
            max_concurrent_ops: parse_var("KEEPASS_MAX_CONCURRENT_OPS", 5usize)?,
            op_timeout: Duration::from_secs(parse_var("KEEPASS_OP_TIMEOUT", 30u64)?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks shared by `from_env` and hand-built configs in tests.
    pub fn validate(&self) -> Result<()> {
        match self.db_path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("kdbx") => {}
            _ => {
                return Err(VaultError::Validation(
                    "database path must point to a .kdbx file".into(),
                ))
            }
        }
        if self.backup_count == 0 {
            return Err(VaultError::Validation(
                "backup count must be at least 1".into(),
            ));
        }
        if self.max_concurrent_ops == 0 {
            return Err(VaultError::Validation(
                "max concurrent operations must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn is_read_only(&self) -> bool {
        self.access_mode == AccessMode::ReadOnly
    }
}

fn default_backup_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("kpvault").join("backups"))
        .unwrap_or_else(|| PathBuf::from("./backups"))
}

fn require_var(name: &str) -> Result<String> {
    optional_var(name).ok_or_else(|| VaultError::Validation(format!("{name} must be set")))
}

fn optional_var(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match optional_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| VaultError::Validation(format!("{name} has an invalid value: '{raw}'"))),
        None => Ok(default),
    }
}
