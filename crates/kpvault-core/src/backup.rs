//! Point-in-time backups of the database file.
//!
//! Backups are plain copies (optionally gzip-compressed) named
//! `{stem}_{timestamp}_{reason}.kdbx[.gz]`, each with a JSON sidecar
//! carrying the SHA-256 checksum taken at copy time. Retention keeps the
//! newest `backup_count` files; verification recomputes the checksum from
//! the written backup and deletes it on mismatch.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};

use crate::error::{Result, VaultError};
use crate::models::BackupRecord;

const META_SUFFIX: &str = ".meta.json";

#[derive(Clone)]
pub struct BackupManager {
    db_path: PathBuf,
    backup_dir: PathBuf,
    retention: usize,
}

impl BackupManager {
    pub fn new(db_path: PathBuf, backup_dir: PathBuf, retention: usize) -> Self {
        Self {
            db_path,
            backup_dir,
            retention,
        }
    }

    /// Copy the current database file aside.
    ///
    /// With `verify`, the written backup is read back, decompressed when
    /// needed, and its checksum compared against the source checksum; a
    /// mismatch removes the bad file and fails with
    /// `BackupVerification`. Old backups beyond the retention count are
    /// pruned afterwards, oldest first.
    pub fn create(&self, reason: &str, compress: bool, verify: bool) -> Result<BackupRecord> {
        if !self.db_path.exists() {
            return Err(VaultError::Backup(format!(
                "database file not found: {}",
                self.db_path.display()
            )));
        }
        fs::create_dir_all(&self.backup_dir)?;

        let source = fs::read(&self.db_path)?;
        let checksum = sha256_hex(&source);

        let stem = self
            .db_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("database");
        let timestamp = Utc::now();
        let base = format!("{stem}_{}_{reason}", timestamp.format("%Y%m%d_%H%M%S"));
        let ext = if compress { ".kdbx.gz" } else { ".kdbx" };
        // timestamps have one-second resolution; never overwrite an
        // earlier snapshot taken within the same second
        let mut filename = format!("{base}{ext}");
        let mut seq = 1;
        while self.backup_dir.join(&filename).exists() {
            filename = format!("{base}_{seq}{ext}");
            seq += 1;
        }
        let backup_path = self.backup_dir.join(&filename);

        if compress {
            let file = fs::File::create(&backup_path)?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(&source)?;
            encoder.finish()?;
        } else {
            fs::write(&backup_path, &source)?;
        }

        let mut verified = false;
        if verify {
            let restored = read_backup_bytes(&backup_path, compress)?;
            if sha256_hex(&restored) != checksum {
                let _ = fs::remove_file(&backup_path);
                return Err(VaultError::BackupVerification);
            }
            verified = true;
        }

        let record = BackupRecord {
            filename,
            created_at: timestamp,
            reason: reason.to_string(),
            checksum,
            size: fs::metadata(&backup_path)?.len(),
            compressed: compress,
            verified,
        };
        self.write_meta(&backup_path, &record);
        self.prune();

        tracing::info!(file = %record.filename, reason, "backup created");
        Ok(record)
    }

    /// All backups on disk, newest first.
    pub fn list(&self) -> Result<Vec<BackupRecord>> {
        let mut records = Vec::new();
        if !self.backup_dir.exists() {
            return Ok(records);
        }
        for dir_entry in fs::read_dir(&self.backup_dir)? {
            let path = dir_entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name.ends_with(META_SUFFIX) || !(name.contains(".kdbx")) {
                continue;
            }
            records.push(self.load_meta(&path).unwrap_or_else(|| BackupRecord {
                filename: name.to_string(),
                created_at: fs::metadata(&path)
                    .and_then(|m| m.modified())
                    .map(Into::into)
                    .unwrap_or_else(|_| Utc::now()),
                reason: "unknown".to_string(),
                checksum: String::new(),
                size: fs::metadata(&path).map(|m| m.len()).unwrap_or(0),
                compressed: name.ends_with(".gz"),
                verified: false,
            }));
        }
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Recompute a backup's checksum against its recorded one.
    pub fn verify(&self, filename: &str) -> Result<BackupRecord> {
        let path = self.backup_dir.join(filename);
        if !path.exists() {
            return Err(VaultError::Backup(format!("backup not found: {filename}")));
        }
        let mut record = self
            .load_meta(&path)
            .ok_or_else(|| VaultError::Backup(format!("no metadata for backup: {filename}")))?;
        let bytes = read_backup_bytes(&path, record.compressed)?;
        if sha256_hex(&bytes) != record.checksum {
            return Err(VaultError::BackupVerification);
        }
        record.verified = true;
        self.write_meta(&path, &record);
        Ok(record)
    }

    /// Replace the database file with a verified backup.
    ///
    /// The current database is snapshotted first (`pre_restore`) so the
    /// operation is reversible.
    pub fn restore(&self, filename: &str) -> Result<BackupRecord> {
        let record = self.verify(filename)?;
        let path = self.backup_dir.join(filename);
        let bytes = read_backup_bytes(&path, record.compressed)?;

        if self.db_path.exists() {
            self.create("pre_restore", true, true)?;
        }

        let tmp = self.db_path.with_extension("kdbx.tmp");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &self.db_path)?;

        tracing::info!(file = %filename, "database restored from backup");
        Ok(record)
    }

    fn prune(&self) {
        let Ok(records) = self.list() else { return };
        for stale in records.iter().skip(self.retention) {
            let path = self.backup_dir.join(&stale.filename);
            if let Err(e) = fs::remove_file(&path) {
                tracing::warn!(file = %stale.filename, error = %e, "failed to prune backup");
                continue;
            }
            let _ = fs::remove_file(meta_path(&path));
            tracing::debug!(file = %stale.filename, "pruned old backup");
        }
    }

    fn write_meta(&self, backup_path: &Path, record: &BackupRecord) {
        match serde_json::to_vec_pretty(record) {
            Ok(json) => {
                if let Err(e) = fs::write(meta_path(backup_path), json) {
                    tracing::warn!(error = %e, "failed to write backup metadata");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to serialize backup metadata"),
        }
    }

    fn load_meta(&self, backup_path: &Path) -> Option<BackupRecord> {
        let raw = fs::read(meta_path(backup_path)).ok()?;
        serde_json::from_slice(&raw).ok()
    }
}

fn meta_path(backup_path: &Path) -> PathBuf {
    let mut name = backup_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();
    name.push_str(META_SUFFIX);
    backup_path.with_file_name(name)
}

fn read_backup_bytes(path: &Path, compressed: bool) -> Result<Vec<u8>> {
    let raw = fs::read(path)?;
    if !compressed {
        return Ok(raw);
    }
    let mut decoder = GzDecoder::new(raw.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| VaultError::Backup(format!("failed to decompress backup: {e}")))?;
    Ok(out)
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}
