//! End-to-end vault tests against a real kdbx file on disk.

use std::path::PathBuf;
use std::time::Duration;

use keepass::config::DatabaseConfig;
use keepass::db::{Entry, Node, Value};
use keepass::{Database, DatabaseKey};
use tempfile::TempDir;

use kpvault_core::database::NewEntry;
use kpvault_core::{AccessMode, Config, Vault, VaultError};

const MASTER: &str = "correct horse battery staple";

fn write_test_db(path: &PathBuf) {
    let mut db = Database::new(DatabaseConfig::default());
    db.meta.database_name = Some("Test Vault".to_string());

    let mut entry = Entry::new();
    entry
        .fields
        .insert("Title".into(), Value::Unprotected("GitHub".into()));
    entry
        .fields
        .insert("UserName".into(), Value::Unprotected("octocat".into()));
    entry.fields.insert(
        "Password".into(),
        Value::Protected("Tr0ub4dor&3".as_bytes().into()),
    );
    entry.fields.insert(
        "URL".into(),
        Value::Unprotected("https://github.com".into()),
    );
    db.root.children.push(Node::Entry(entry));

    let key = DatabaseKey::new().with_password(MASTER);
    let mut file = std::fs::File::create(path).unwrap();
    db.save(&mut file, key).unwrap();
}

fn test_config(dir: &TempDir, access_mode: AccessMode) -> Config {
    let db_path = dir.path().join("vault.kdbx");
    write_test_db(&db_path);
    Config {
        db_path,
        key_file: None,
        backup_dir: dir.path().join("backups"),
        access_mode,
        auto_backup: true,
        backup_count: 5,
        session_timeout: Duration::from_secs(3600),
        auto_lock: Duration::from_secs(1800),
        max_auth_attempts: 3,
        auth_window: Duration::from_secs(300),
        max_concurrent_ops: 5,
        op_timeout: Duration::from_secs(30),
    }
}

fn sample_entry(title: &str) -> NewEntry {
    NewEntry {
        title: title.to_string(),
        username: "alice".into(),
        password: "S3cret!pass".into(),
        url: "https://example.com".into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn authenticate_and_read_entries() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadOnly));

    let auth = vault.authenticate(MASTER).await.unwrap();
    assert_eq!(auth.mode, AccessMode::ReadOnly);

    let entries = vault.list_entries(&auth.token, None, false).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "GitHub");
    // list responses never carry passwords
    assert!(entries[0].password.is_none());

    let full = vault
        .get_credential(&auth.token, &entries[0].id, true)
        .await
        .unwrap();
    assert_eq!(full.password.as_deref(), Some("Tr0ub4dor&3"));
}

#[tokio::test]
async fn wrong_password_is_rate_limited() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadOnly));

    for _ in 0..3 {
        assert!(matches!(
            vault.authenticate("wrong").await,
            Err(VaultError::Authentication)
        ));
    }
    assert!(matches!(
        vault.authenticate("wrong").await,
        Err(VaultError::RateLimited)
    ));
    // the right password is also refused while the window is full
    assert!(matches!(
        vault.authenticate(MASTER).await,
        Err(VaultError::RateLimited)
    ));
}

#[tokio::test]
async fn second_authentication_evicts_first_session() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadOnly));

    let first = vault.authenticate(MASTER).await.unwrap();
    let second = vault.authenticate(MASTER).await.unwrap();
    assert_ne!(first.token, second.token);

    assert!(matches!(
        vault.list_entries(&first.token, None, false).await,
        Err(VaultError::SessionNotFound)
    ));
    assert!(vault.list_entries(&second.token, None, false).await.is_ok());
}

#[tokio::test]
async fn readonly_session_rejects_mutations() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadOnly));
    let auth = vault.authenticate(MASTER).await.unwrap();

    let err = vault
        .create_entry(&auth.token, None, sample_entry("Blocked"))
        .await;
    assert!(matches!(err, Err(VaultError::ReadOnly(_))));
}

#[tokio::test]
async fn mutations_persist_across_unlocks() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, AccessMode::ReadWrite);
    let vault = Vault::new(config.clone());
    let auth = vault.authenticate(MASTER).await.unwrap();

    let created = vault
        .create_entry(&auth.token, None, sample_entry("Mail"))
        .await
        .unwrap();
    assert!(created.password.is_none());

    // a fresh vault over the same file sees the new entry
    let reopened = Vault::new(config);
    let auth2 = reopened.authenticate(MASTER).await.unwrap();
    let entries = reopened
        .list_entries(&auth2.token, None, false)
        .await
        .unwrap();
    assert!(entries.iter().any(|e| e.title == "Mail"));

    // the pre-write backup landed in the backup directory
    let backups = reopened.list_backups(&auth2.token).await.unwrap();
    assert!(backups.iter().any(|b| b.reason == "pre_write"));
}

#[tokio::test]
async fn duplicate_entries_are_rejected() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadWrite));
    let auth = vault.authenticate(MASTER).await.unwrap();

    vault
        .create_entry(&auth.token, None, sample_entry("Mail"))
        .await
        .unwrap();
    let err = vault
        .create_entry(&auth.token, None, sample_entry("Mail"))
        .await;
    assert!(matches!(err, Err(VaultError::DuplicateEntry(_))));
}

#[tokio::test]
async fn soft_delete_then_second_delete_fails() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadWrite));
    let auth = vault.authenticate(MASTER).await.unwrap();

    let created = vault
        .create_entry(&auth.token, None, sample_entry("Old"))
        .await
        .unwrap();

    vault
        .delete_entry(&auth.token, &created.id, false)
        .await
        .unwrap();
    assert!(matches!(
        vault.delete_entry(&auth.token, &created.id, false).await,
        Err(VaultError::EntryNotFound(_))
    ));
}

#[tokio::test]
async fn backup_restore_round_trip() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadWrite));
    let auth = vault.authenticate(MASTER).await.unwrap();

    let backup = vault.create_backup(&auth.token, true, true).await.unwrap();
    assert!(backup.verified);

    // mutate, then roll back to the snapshot
    vault
        .create_entry(&auth.token, None, sample_entry("Ephemeral"))
        .await
        .unwrap();
    vault
        .restore_backup(&auth.token, &backup.filename)
        .await
        .unwrap();

    let entries = vault.list_entries(&auth.token, None, false).await.unwrap();
    assert!(!entries.iter().any(|e| e.title == "Ephemeral"));
    assert!(entries.iter().any(|e| e.title == "GitHub"));
}

#[tokio::test]
async fn logout_locks_the_database() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadOnly));
    let auth = vault.authenticate(MASTER).await.unwrap();

    vault.logout(&auth.token).await.unwrap();
    assert!(matches!(
        vault.list_entries(&auth.token, None, false).await,
        Err(VaultError::SessionNotFound)
    ));

    let health = vault.health_check().await;
    assert!(health.locked);
    assert!(health.database_reachable);
}

#[tokio::test]
async fn url_search_prefers_exact_domain() {
    let dir = TempDir::new().unwrap();
    let vault = Vault::new(test_config(&dir, AccessMode::ReadWrite));
    let auth = vault.authenticate(MASTER).await.unwrap();

    let gist = NewEntry {
        title: "Gist".into(),
        username: "octocat".into(),
        password: "x".into(),
        url: "https://gist.github.com".into(),
        ..Default::default()
    };
    vault.create_entry(&auth.token, None, gist).await.unwrap();

    let results = vault
        .search_by_url(&auth.token, "https://github.com/login", true)
        .await
        .unwrap();
    assert_eq!(results[0].entry.title, "GitHub");
    assert!(results.iter().all(|r| r.entry.password.is_none()));
}
