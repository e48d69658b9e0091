//! The vault: orchestration of sessions, database state, and persistence.
//!
//! All public operations live here. Each one validates the caller's
//! session, takes a concurrency permit, and runs against the shared
//! database state behind an async `RwLock`. Mutations persist to disk
//! immediately through an atomic write (temp file plus rename) bounded
//! by the configured operation timeout, with an automatic pre-write
//! backup when enabled.

use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};
use uuid::Uuid;

use crate::audit;
use crate::backup::BackupManager;
use crate::config::{AccessMode, Config};
use crate::database::{DeleteGroupPolicy, EntryPatch, GroupPatch, KeepassDatabase, NewEntry};
use crate::error::{Result, VaultError};
use crate::generator::{self, PasswordSpec};
use crate::models::{
    AuthResponse, BackupRecord, DatabaseInfo, EntryRecord, GeneratedPassword, GroupRecord,
    HealthStatus, ScoredEntry, Session, ValidationReport, WeakEntry,
};
use crate::search::{self, SearchOptions};
use crate::session::SessionManager;

pub struct Vault {
    config: Config,
    sessions: SessionManager,
    backups: BackupManager,
    db: RwLock<Option<KeepassDatabase>>,
    ops: Arc<Semaphore>,
}

impl Vault {
    pub fn new(config: Config) -> Self {
        let sessions = SessionManager::new(
            config.session_timeout,
            config.auto_lock,
            config.max_auth_attempts,
            config.auth_window,
        );
        let backups = BackupManager::new(
            config.db_path.clone(),
            config.backup_dir.clone(),
            config.backup_count,
        );
        let ops = Arc::new(Semaphore::new(config.max_concurrent_ops));
        Self {
            config,
            sessions,
            backups,
            db: RwLock::new(None),
            ops,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ── authentication ───────────────────────────────────────────────────

    /// Unlock the database with the master password (plus the configured
    /// key file) and open a session. A live session is silently evicted.
    pub async fn authenticate(&self, password: &str) -> Result<AuthResponse> {
        self.sessions.check_rate_limit().map_err(|e| {
            audit::auth_rate_limited();
            e
        })?;

        let path = self.config.db_path.clone();
        let key_file = self.config.key_file.clone();
        let password = password.to_string();
        // Key derivation is CPU-bound; keep it off the async runtime.
        let unlocked = tokio::task::spawn_blocking(move || {
            KeepassDatabase::unlock(&path, &password, key_file.as_deref())
        })
        .await
        .map_err(|e| VaultError::Internal(format!("unlock task failed: {e}")))?;

        let database = match unlocked {
            Ok(db) => db,
            Err(e) => {
                self.sessions.record_failure();
                audit::auth_failure(e.kind());
                return Err(e);
            }
        };

        *self.db.write().await = Some(database);
        let created = self.sessions.create(self.config.access_mode);
        if let Some(prefix) = created.evicted {
            audit::session_evicted(&prefix);
        }
        let mode = match created.session.mode {
            AccessMode::ReadOnly => "readonly",
            AccessMode::ReadWrite => "readwrite",
        };
        audit::auth_success(&created.session.token, mode);

        Ok(AuthResponse {
            token: created.session.token,
            mode: created.session.mode,
            expires_in: self.config.session_timeout.as_secs(),
        })
    }

    /// Close the session and lock the database.
    pub async fn logout(&self, token: &str) -> Result<()> {
        self.sessions.destroy(token)?;
        *self.db.write().await = None;
        audit::logout(token);
        Ok(())
    }

    /// Liveness probe; requires no session.
    pub async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            status: "ok",
            locked: self.db.read().await.is_none(),
            database_reachable: self.config.db_path.exists(),
        }
    }

    // ── read operations ──────────────────────────────────────────────────

    pub async fn get_database_info(&self, token: &str) -> Result<DatabaseInfo> {
        let session = self.authorize(token).await?;
        let _permit = self.permit()?;
        let guard = self.db.read().await;
        let db = Self::unlocked(&guard)?;
        let mut info = db.info();
        info.access_mode = session.mode;
        Ok(info)
    }

    /// Entries in a group (all entries when `group_id` is `None`),
    /// passwords always redacted.
    pub async fn list_entries(
        &self,
        token: &str,
        group_id: Option<&str>,
        recursive: bool,
    ) -> Result<Vec<EntryRecord>> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let guard = self.db.read().await;
        let db = Self::unlocked(&guard)?;
        let entries = match group_id {
            Some(raw) => db.entries_in_group(parse_id(raw)?, recursive)?,
            None => db.all_entries(false),
        };
        Ok(entries.into_iter().map(EntryRecord::redacted).collect())
    }

    /// Fetch one entry. The password is included only on explicit request.
    pub async fn get_credential(
        &self,
        token: &str,
        id: &str,
        include_password: bool,
    ) -> Result<EntryRecord> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let guard = self.db.read().await;
        let db = Self::unlocked(&guard)?;
        let entry = db.get_entry(parse_id(id)?)?;
        Ok(if include_password {
            entry
        } else {
            entry.redacted()
        })
    }

    pub async fn list_groups(&self, token: &str) -> Result<Vec<GroupRecord>> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let guard = self.db.read().await;
        Ok(Self::unlocked(&guard)?.list_groups())
    }

    /// Look up a group by uuid, or by name when the argument is not a uuid.
    pub async fn get_group_info(&self, token: &str, group: &str) -> Result<GroupRecord> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let guard = self.db.read().await;
        let db = Self::unlocked(&guard)?;
        match Uuid::parse_str(group) {
            Ok(id) => db.get_group(id),
            Err(_) => db
                .find_group_by_name(group)
                .ok_or_else(|| VaultError::GroupNotFound(group.to_string())),
        }
    }

    // ── search ───────────────────────────────────────────────────────────

    pub async fn search_credentials(
        &self,
        token: &str,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<ScoredEntry>> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let entries = self.snapshot().await?;
        let mut results = search::search(&entries, query, opts);
        for scored in &mut results {
            scored.entry.password = None;
        }
        Ok(results)
    }

    pub async fn search_by_url(
        &self,
        token: &str,
        url: &str,
        fuzzy: bool,
    ) -> Result<Vec<ScoredEntry>> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let entries = self.snapshot().await?;
        let mut results = search::search_by_url(&entries, url, fuzzy);
        for scored in &mut results {
            scored.entry.password = None;
        }
        Ok(results)
    }

    pub async fn search_weak_passwords(
        &self,
        token: &str,
        min_length: usize,
        require_complexity: bool,
    ) -> Result<Vec<WeakEntry>> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let entries = self.snapshot().await?;
        Ok(search::find_weak_passwords(
            &entries,
            min_length,
            require_complexity,
        ))
    }

    pub async fn search_duplicates(&self, token: &str) -> Result<Vec<Vec<EntryRecord>>> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let entries = self.snapshot().await?;
        Ok(search::find_duplicates(&entries))
    }

    /// Hygiene report across the whole active set.
    pub async fn validate_entries(&self, token: &str) -> Result<ValidationReport> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        let entries = self.snapshot().await?;
        let now = chrono::Utc::now().naive_utc();

        let weak_passwords = search::find_weak_passwords(&entries, 8, true);
        let empty_passwords: Vec<_> = entries
            .iter()
            .filter(|e| e.password.as_deref().unwrap_or_default().is_empty())
            .map(EntryRecord::to_ref)
            .collect();
        let missing_urls: Vec<_> = entries
            .iter()
            .filter(|e| e.url.trim().is_empty())
            .map(EntryRecord::to_ref)
            .collect();
        let expired_entries: Vec<_> = entries
            .iter()
            .filter(|e| e.expires.is_some_and(|t| t < now))
            .map(EntryRecord::to_ref)
            .collect();

        let mut title_counts = std::collections::HashMap::new();
        for entry in &entries {
            *title_counts
                .entry(entry.title.trim().to_lowercase())
                .or_insert(0usize) += 1;
        }
        let duplicate_titles: Vec<_> = entries
            .iter()
            .filter(|e| title_counts[&e.title.trim().to_lowercase()] > 1)
            .map(EntryRecord::to_ref)
            .collect();

        let total_issues = weak_passwords.len()
            + empty_passwords.len()
            + duplicate_titles.len()
            + missing_urls.len()
            + expired_entries.len();
        Ok(ValidationReport {
            total_entries: entries.len(),
            weak_passwords,
            empty_passwords,
            duplicate_titles,
            missing_urls,
            expired_entries,
            total_issues,
        })
    }

    // ── password generation ──────────────────────────────────────────────

    pub async fn generate_password(
        &self,
        token: &str,
        spec: &PasswordSpec,
    ) -> Result<GeneratedPassword> {
        self.authorize(token).await?;
        let password = generator::generate(spec)?;
        let strength = generator::score_strength(&password);
        Ok(GeneratedPassword { password, strength })
    }

    // ── mutations ────────────────────────────────────────────────────────

    /// Create an entry. Entries matching an existing one on title,
    /// username, and url are rejected as duplicates.
    pub async fn create_entry(
        &self,
        token: &str,
        group_id: Option<&str>,
        new: NewEntry,
    ) -> Result<EntryRecord> {
        let session = self.require_write(token, "create_entry").await?;
        let _permit = self.permit()?;
        let group_id = group_id.map(parse_id).transpose()?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;

        let clash = db.all_entries(false).into_iter().find(|e| {
            e.title.eq_ignore_ascii_case(&new.title)
                && e.username.eq_ignore_ascii_case(&new.username)
                && e.url.eq_ignore_ascii_case(&new.url)
        });
        if let Some(existing) = clash {
            return Err(VaultError::DuplicateEntry(existing.id));
        }

        let created = db.create_entry(group_id, new)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "create_entry", &created.id);
        Ok(created.redacted())
    }

    pub async fn update_entry(
        &self,
        token: &str,
        id: &str,
        patch: EntryPatch,
    ) -> Result<EntryRecord> {
        let session = self.require_write(token, "update_entry").await?;
        let _permit = self.permit()?;
        let id = parse_id(id)?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        let updated = db.update_entry(id, patch)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "update_entry", &updated.id);
        Ok(updated.redacted())
    }

    pub async fn delete_entry(&self, token: &str, id: &str, permanent: bool) -> Result<()> {
        let session = self.require_write(token, "delete_entry").await?;
        let _permit = self.permit()?;
        let id = parse_id(id)?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        db.delete_entry(id, permanent)?;
        self.persist(db).await?;
        let action = if permanent {
            "delete_entry_permanent"
        } else {
            "delete_entry"
        };
        audit::mutation(&session.token, action, &id.to_string());
        Ok(())
    }

    pub async fn move_entry(&self, token: &str, id: &str, group_id: &str) -> Result<EntryRecord> {
        let session = self.require_write(token, "move_entry").await?;
        let _permit = self.permit()?;
        let id = parse_id(id)?;
        let group_id = parse_id(group_id)?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        let moved = db.move_entry(id, group_id)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "move_entry", &moved.id);
        Ok(moved.redacted())
    }

    /// Copy an entry in place. The copy gets a fresh id and a
    /// " (Copy)" title suffix, everything else carries over.
    pub async fn duplicate_entry(&self, token: &str, id: &str) -> Result<EntryRecord> {
        let session = self.require_write(token, "duplicate_entry").await?;
        let _permit = self.permit()?;
        let id = parse_id(id)?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        let source = db.get_entry(id)?;
        let group_id = parse_id(&source.group_id)?;
        let copy = NewEntry {
            title: format!("{} (Copy)", source.title),
            username: source.username,
            password: source.password.unwrap_or_default(),
            url: source.url,
            notes: source.notes,
            tags: source.tags,
            custom_fields: source.custom_fields,
            expires: source.expires,
            icon: source.icon,
        };
        let created = db.create_entry(Some(group_id), copy)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "duplicate_entry", &created.id);
        Ok(created.redacted())
    }

    pub async fn create_group(
        &self,
        token: &str,
        parent_id: Option<&str>,
        name: &str,
        notes: Option<String>,
        icon: Option<usize>,
    ) -> Result<GroupRecord> {
        let session = self.require_write(token, "create_group").await?;
        let _permit = self.permit()?;
        let parent_id = parent_id.map(parse_id).transpose()?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        let created = db.create_group(parent_id, name, notes, icon)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "create_group", &created.id);
        Ok(created)
    }

    pub async fn update_group(&self, token: &str, id: &str, patch: GroupPatch) -> Result<GroupRecord> {
        let session = self.require_write(token, "update_group").await?;
        let _permit = self.permit()?;
        let id = parse_id(id)?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        let updated = db.update_group(id, patch)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "update_group", &updated.id);
        Ok(updated)
    }

    pub async fn delete_group(
        &self,
        token: &str,
        id: &str,
        policy: DeleteGroupPolicy,
    ) -> Result<()> {
        let session = self.require_write(token, "delete_group").await?;
        let _permit = self.permit()?;
        let id = parse_id(id)?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        db.delete_group(id, policy)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "delete_group", &id.to_string());
        Ok(())
    }

    pub async fn move_group(&self, token: &str, id: &str, parent_id: &str) -> Result<GroupRecord> {
        let session = self.require_write(token, "move_group").await?;
        let _permit = self.permit()?;
        let id = parse_id(id)?;
        let parent_id = parse_id(parent_id)?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        let moved = db.move_group(id, parent_id)?;
        self.persist(db).await?;
        audit::mutation(&session.token, "move_group", &moved.id);
        Ok(moved)
    }

    // ── persistence and backups ──────────────────────────────────────────

    /// Force a save of the current in-memory state.
    pub async fn save_database(&self, token: &str) -> Result<()> {
        let session = self.require_write(token, "save_database").await?;
        let _permit = self.permit()?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        self.persist(db).await?;
        audit::save(&session.token, &self.config.db_path.display().to_string());
        Ok(())
    }

    pub async fn create_backup(
        &self,
        token: &str,
        compress: bool,
        verify: bool,
    ) -> Result<BackupRecord> {
        let session = self.authorize(token).await?;
        let _permit = self.permit()?;
        let record = self.bounded_backup("manual", compress, verify).await?;
        audit::backup(&session.token, &record.filename, "manual");
        Ok(record)
    }

    pub async fn list_backups(&self, token: &str) -> Result<Vec<BackupRecord>> {
        self.authorize(token).await?;
        let _permit = self.permit()?;
        self.backups.list()
    }

    /// Replace the database file with a verified backup, then reload the
    /// in-memory state from disk so the session stays usable.
    pub async fn restore_backup(&self, token: &str, filename: &str) -> Result<BackupRecord> {
        let session = self.require_write(token, "restore_backup").await?;
        let _permit = self.permit()?;

        let mut guard = self.db.write().await;
        let db = Self::unlocked_mut(&mut guard)?;
        let record = self.backups.restore(filename)?;
        *db = db.reload()?;
        audit::restore(&session.token, filename);
        Ok(record)
    }

    // ── internals ────────────────────────────────────────────────────────

    /// Validate the session token. An expired session also drops the
    /// unlocked database handle, returning the vault to the locked state.
    async fn authorize(&self, token: &str) -> Result<Session> {
        match self.sessions.validate(token) {
            Ok(session) => Ok(session),
            Err(e) => {
                if matches!(e, VaultError::SessionExpired) {
                    *self.db.write().await = None;
                    audit::session_expired(token);
                }
                Err(e)
            }
        }
    }

    async fn require_write(&self, token: &str, operation: &str) -> Result<Session> {
        let session = self.authorize(token).await?;
        if session.mode != AccessMode::ReadWrite {
            return Err(VaultError::ReadOnly(operation.to_string()));
        }
        Ok(session)
    }

    fn permit(&self) -> Result<tokio::sync::OwnedSemaphorePermit> {
        Arc::clone(&self.ops)
            .try_acquire_owned()
            .map_err(|_| VaultError::Concurrency)
    }

    fn unlocked<'a>(guard: &'a tokio::sync::RwLockReadGuard<'_, Option<KeepassDatabase>>) -> Result<&'a KeepassDatabase> {
        guard
            .as_ref()
            .ok_or_else(|| VaultError::Database("database is locked".into()))
    }

    fn unlocked_mut<'a>(guard: &'a mut tokio::sync::RwLockWriteGuard<'_, Option<KeepassDatabase>>) -> Result<&'a mut KeepassDatabase> {
        guard
            .as_mut()
            .ok_or_else(|| VaultError::Database("database is locked".into()))
    }

    /// Redaction-free snapshot of the active set for the search paths.
    async fn snapshot(&self) -> Result<Vec<EntryRecord>> {
        let guard = self.db.read().await;
        Ok(Self::unlocked(&guard)?.all_entries(false))
    }

    /// Write the in-memory state to disk atomically: serialize, optional
    /// pre-write backup of the current file, temp write plus rename,
    /// the disk work bounded by the operation timeout.
    async fn persist(&self, db: &KeepassDatabase) -> Result<()> {
        let bytes = db.serialize()?;

        if self.config.auto_backup && self.config.db_path.exists() {
            self.bounded_backup("pre_write", true, true).await?;
        }

        let path = self.config.db_path.to_path_buf();
        let tmp = path.with_extension("kdbx.tmp");
        let secs = self.config.op_timeout.as_secs();
        let write = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &path).await?;
            Ok::<(), std::io::Error>(())
        };
        tokio::time::timeout(self.config.op_timeout, write)
            .await
            .map_err(|_| VaultError::Timeout {
                operation: "save_database".into(),
                secs,
            })??;
        Ok(())
    }

    async fn bounded_backup(
        &self,
        reason: &str,
        compress: bool,
        verify: bool,
    ) -> Result<BackupRecord> {
        let secs = self.config.op_timeout.as_secs();
        let backups = self.backups.clone();
        let reason = reason.to_string();
        let work = tokio::task::spawn_blocking(move || backups.create(&reason, compress, verify));
        tokio::time::timeout(self.config.op_timeout, work)
            .await
            .map_err(|_| VaultError::Timeout {
                operation: "create_backup".into(),
                secs,
            })?
            .map_err(|e| VaultError::Internal(format!("backup task failed: {e}")))?
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| VaultError::Validation(format!("invalid id: '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(db_path: PathBuf, backup_dir: PathBuf) -> Config {
        Config {
            db_path,
            key_file: None,
            backup_dir,
            access_mode: AccessMode::ReadWrite,
            auto_backup: false,
            backup_count: 5,
            session_timeout: Duration::from_secs(3600),
            auto_lock: Duration::from_secs(1800),
            max_auth_attempts: 3,
            auth_window: Duration::from_secs(300),
            max_concurrent_ops: 1,
            op_timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn saturated_admission_rejects_operations() {
        let dir = TempDir::new().unwrap();
        let vault = Vault::new(test_config(
            dir.path().join("vault.kdbx"),
            dir.path().join("backups"),
        ));
        let token = vault.sessions.create(AccessMode::ReadWrite).session.token;

        let held = Arc::clone(&vault.ops).try_acquire_owned().unwrap();
        assert!(matches!(
            vault.list_groups(&token).await,
            Err(VaultError::Concurrency)
        ));

        // releasing the permit lets the next call past admission; it then
        // fails on the locked database instead
        drop(held);
        assert!(matches!(
            vault.list_groups(&token).await,
            Err(VaultError::Database(_))
        ));
    }

    #[tokio::test]
    async fn zero_timeout_bounds_backup_work() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("vault.kdbx");
        std::fs::write(&db_path, b"kdbx-bytes").unwrap();
        let mut config = test_config(db_path, dir.path().join("backups"));
        config.op_timeout = Duration::ZERO;
        let vault = Vault::new(config);
        let token = vault.sessions.create(AccessMode::ReadWrite).session.token;

        assert!(matches!(
            vault.create_backup(&token, false, false).await,
            Err(VaultError::Timeout { .. })
        ));
    }
}
