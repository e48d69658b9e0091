//! Error taxonomy for vault operations.
//!
//! Every fallible operation returns one of these variants. Errors coming
//! out of the `keepass` crate are wrapped at the boundary with sanitized
//! messages; secret values and key-file paths never appear in a message.

use thiserror::Error;

/// All errors surfaced by the vault operation layer.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("authentication failed: invalid credentials")]
    Authentication,

    #[error("session has expired")]
    SessionExpired,

    #[error("session token is unknown or has been invalidated")]
    SessionNotFound,

    #[error("too many authentication attempts, try again later")]
    RateLimited,

    #[error("operation '{0}' not allowed in read-only mode")]
    ReadOnly(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error("entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("backup failed: {0}")]
    Backup(String),

    #[error("backup verification failed: checksum mismatch")]
    BackupVerification,

    #[error("database error: {0}")]
    Database(String),

    #[error("operation '{operation}' timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("too many concurrent operations")]
    Concurrency,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VaultError {
    /// Stable machine-readable kind, used in the wire error object.
    pub fn kind(&self) -> &'static str {
        match self {
            VaultError::Authentication => "authentication_error",
            VaultError::SessionExpired => "session_expired",
            VaultError::SessionNotFound => "session_not_found",
            VaultError::RateLimited => "rate_limit_error",
            VaultError::ReadOnly(_) => "read_only_mode",
            VaultError::Validation(_) => "validation_error",
            VaultError::EntryNotFound(_) => "entry_not_found",
            VaultError::GroupNotFound(_) => "group_not_found",
            VaultError::DuplicateEntry(_) => "duplicate_entry",
            VaultError::Backup(_) => "backup_error",
            VaultError::BackupVerification => "backup_verification_error",
            VaultError::Database(_) => "database_error",
            VaultError::Timeout { .. } => "operation_timeout",
            VaultError::Concurrency => "concurrency_error",
            VaultError::Io(_) => "io_error",
            VaultError::Internal(_) => "internal_error",
        }
    }

    /// Whether the error invalidates the caller's session.
    pub fn is_session_fault(&self) -> bool {
        matches!(
            self,
            VaultError::SessionExpired | VaultError::SessionNotFound
        )
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;
