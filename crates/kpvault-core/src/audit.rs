//! Structured audit trail for security-relevant events.
//!
//! Everything goes through `tracing` under the `audit` target so
//! deployments can route the trail separately from diagnostic logs.
//! Session tokens only ever appear as their first 8 characters, and no
//! event carries a password or key file path.

use crate::session::token_prefix;

pub const TARGET: &str = "audit";

pub fn auth_success(token: &str, mode: &str) {
    tracing::info!(
        target: TARGET,
        session = %token_prefix(token),
        mode,
        "authentication succeeded"
    );
}

pub fn auth_failure(reason: &str) {
    tracing::warn!(target: TARGET, reason, "authentication failed");
}

pub fn auth_rate_limited() {
    tracing::warn!(target: TARGET, "authentication rate limit reached");
}

pub fn session_evicted(prefix: &str) {
    tracing::info!(
        target: TARGET,
        session = %prefix,
        "session evicted by new authentication"
    );
}

pub fn session_expired(token: &str) {
    tracing::info!(target: TARGET, session = %token_prefix(token), "session expired");
}

pub fn logout(token: &str) {
    tracing::info!(target: TARGET, session = %token_prefix(token), "session closed");
}

/// A mutation against the database tree. `target_id` is the entry or
/// group UUID, never its secret content.
pub fn mutation(token: &str, action: &str, target_id: &str) {
    tracing::info!(
        target: TARGET,
        session = %token_prefix(token),
        action,
        id = %target_id,
        "database modified"
    );
}

pub fn save(token: &str, path: &str) {
    tracing::info!(
        target: TARGET,
        session = %token_prefix(token),
        path,
        "database saved"
    );
}

pub fn backup(token: &str, filename: &str, reason: &str) {
    tracing::info!(
        target: TARGET,
        session = %token_prefix(token),
        file = %filename,
        reason,
        "backup created"
    );
}

pub fn restore(token: &str, filename: &str) {
    tracing::warn!(
        target: TARGET,
        session = %token_prefix(token),
        file = %filename,
        "database restored from backup"
    );
}
