//! Session token lifecycle and authentication rate limiting.
//!
//! One session at a time: a successful authentication silently evicts any
//! live session (the eviction is audited by the caller). Tokens expire on
//! a hard lifetime and on a shorter idle window (auto-lock). All state is
//! interior-mutable behind a mutex so the vault can share the manager
//! across concurrent requests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;

use crate::config::AccessMode;
use crate::error::{Result, VaultError};
use crate::models::Session;

const TOKEN_LEN: usize = 32;

/// Outcome of creating a session.
pub struct Created {
    pub session: Session,
    /// Token prefix of the session that was evicted, if any.
    pub evicted: Option<String>,
}

struct State {
    current: Option<Session>,
    attempts: VecDeque<Instant>,
}

pub struct SessionManager {
    session_timeout: Duration,
    auto_lock: Duration,
    max_attempts: usize,
    attempt_window: Duration,
    state: Mutex<State>,
}

impl SessionManager {
    pub fn new(
        session_timeout: Duration,
        auto_lock: Duration,
        max_attempts: usize,
        attempt_window: Duration,
    ) -> Self {
        Self {
            session_timeout,
            auto_lock,
            max_attempts,
            attempt_window,
            state: Mutex::new(State {
                current: None,
                attempts: VecDeque::new(),
            }),
        }
    }

    /// Fail with `RateLimited` when the rolling window is full.
    pub fn check_rate_limit(&self) -> Result<()> {
        let mut state = self.state.lock().expect("session state poisoned");
        if let Some(cutoff) = Instant::now().checked_sub(self.attempt_window) {
            while matches!(state.attempts.front(), Some(&t) if t < cutoff) {
                state.attempts.pop_front();
            }
        }
        if state.attempts.len() >= self.max_attempts {
            return Err(VaultError::RateLimited);
        }
        Ok(())
    }

    /// Record a failed authentication attempt.
    pub fn record_failure(&self) {
        let mut state = self.state.lock().expect("session state poisoned");
        state.attempts.push_back(Instant::now());
    }

    /// Create a new session, evicting the current one. Clears the
    /// rate-limit window on success.
    pub fn create(&self, mode: AccessMode) -> Created {
        let mut state = self.state.lock().expect("session state poisoned");
        let evicted = state.current.take().map(|s| token_prefix(&s.token));
        state.attempts.clear();

        let now = Instant::now();
        let session = Session {
            token: generate_token(),
            mode,
            created_at: now,
            last_access: now,
        };
        state.current = Some(session.clone());
        Created { session, evicted }
    }

    /// Validate a token, refreshing its idle timer on success.
    ///
    /// Hard lifetime and idle window are checked independently; either
    /// one expiring destroys the session.
    pub fn validate(&self, token: &str) -> Result<Session> {
        let mut state = self.state.lock().expect("session state poisoned");
        let session = match &mut state.current {
            Some(s) if s.token == token => s,
            _ => return Err(VaultError::SessionNotFound),
        };

        let now = Instant::now();
        let hard_expired = now.duration_since(session.created_at) > self.session_timeout;
        let idle_expired = now.duration_since(session.last_access) > self.auto_lock;
        if hard_expired || idle_expired {
            state.current = None;
            return Err(VaultError::SessionExpired);
        }

        session.last_access = now;
        Ok(session.clone())
    }

    /// Destroy the session matching the token. Unknown tokens fail.
    pub fn destroy(&self, token: &str) -> Result<()> {
        let mut state = self.state.lock().expect("session state poisoned");
        match &state.current {
            Some(s) if s.token == token => {
                state.current = None;
                Ok(())
            }
            _ => Err(VaultError::SessionNotFound),
        }
    }

    /// Destroy whatever session exists (lock, shutdown).
    pub fn destroy_any(&self) {
        self.state.lock().expect("session state poisoned").current = None;
    }

    pub fn has_session(&self) -> bool {
        self.state
            .lock()
            .expect("session state poisoned")
            .current
            .is_some()
    }
}

fn generate_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// First 8 characters, safe for audit output.
pub fn token_prefix(token: &str) -> String {
    token.chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(session_timeout: Duration, auto_lock: Duration) -> SessionManager {
        SessionManager::new(session_timeout, auto_lock, 3, Duration::from_secs(300))
    }

    #[test]
    fn validate_succeeds_until_timeout() {
        let mgr = manager(Duration::from_secs(3600), Duration::from_secs(1800));
        let created = mgr.create(AccessMode::ReadWrite);
        assert!(created.evicted.is_none());
        assert!(mgr.validate(&created.session.token).is_ok());
    }

    #[test]
    fn expired_session_is_destroyed() {
        let mgr = manager(Duration::ZERO, Duration::from_secs(1800));
        let created = mgr.create(AccessMode::ReadOnly);
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            mgr.validate(&created.session.token),
            Err(VaultError::SessionExpired)
        ));
        // gone for good, not just expired
        assert!(matches!(
            mgr.validate(&created.session.token),
            Err(VaultError::SessionNotFound)
        ));
    }

    #[test]
    fn idle_window_expires_independently() {
        let mgr = manager(Duration::from_secs(3600), Duration::ZERO);
        let created = mgr.create(AccessMode::ReadOnly);
        std::thread::sleep(Duration::from_millis(5));
        assert!(matches!(
            mgr.validate(&created.session.token),
            Err(VaultError::SessionExpired)
        ));
    }

    #[test]
    fn new_session_evicts_previous() {
        let mgr = manager(Duration::from_secs(3600), Duration::from_secs(1800));
        let first = mgr.create(AccessMode::ReadWrite);
        let second = mgr.create(AccessMode::ReadWrite);

        assert_eq!(
            second.evicted,
            Some(token_prefix(&first.session.token))
        );
        assert!(matches!(
            mgr.validate(&first.session.token),
            Err(VaultError::SessionNotFound)
        ));
        assert!(mgr.validate(&second.session.token).is_ok());
    }

    #[test]
    fn rate_limit_opens_after_failures() {
        let mgr = manager(Duration::from_secs(3600), Duration::from_secs(1800));
        for _ in 0..3 {
            assert!(mgr.check_rate_limit().is_ok());
            mgr.record_failure();
        }
        assert!(matches!(
            mgr.check_rate_limit(),
            Err(VaultError::RateLimited)
        ));

        // a successful authentication clears the window
        mgr.create(AccessMode::ReadOnly);
        assert!(mgr.check_rate_limit().is_ok());
    }

    #[test]
    fn unknown_token_is_rejected() {
        let mgr = manager(Duration::from_secs(3600), Duration::from_secs(1800));
        mgr.create(AccessMode::ReadOnly);
        assert!(matches!(
            mgr.validate("bogus-token"),
            Err(VaultError::SessionNotFound)
        ));
        assert!(matches!(
            mgr.destroy("bogus-token"),
            Err(VaultError::SessionNotFound)
        ));
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert_ne!(a, b);
    }
}
