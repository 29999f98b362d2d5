//! Per-fix file snapshots and rollback.
//!
//! Layout: `<root>/<fix_id>/<file>.<fix_id>.<timestamp>.bak` plus a
//! `manifest.json` listing every snapshot in creation order. Snapshots are
//! never overwritten; a second backup of the same path adds a new file.

use super::FixError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MANIFEST: &str = "manifest.json";

/// A snapshot of one file, owned by exactly one fix id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBackup {
    pub fix_id: String,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub taken_at: DateTime<Utc>,
}

/// Root of all fix backup directories.
#[derive(Debug, Clone)]
pub struct BackupStore {
    root: PathBuf,
}

impl BackupStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn fix_dir(&self, fix_id: &str) -> PathBuf {
        self.root.join(fix_id)
    }

    /// Copy `original` aside under `fix_id`. Any I/O failure is returned,
    /// so callers abort before mutating the file.
    pub fn backup(&self, original: &Path, fix_id: &str) -> Result<FileBackup, FixError> {
        let io_err = |source| FixError::Backup {
            fix_id: fix_id.to_string(),
            path: original.to_path_buf(),
            source,
        };

        let dir = self.fix_dir(fix_id);
        std::fs::create_dir_all(&dir).map_err(io_err)?;

        let taken_at = Utc::now();
        let file_name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_string());
        let stamp = taken_at.format("%Y%m%dT%H%M%S%.6f");

        let mut backup_path = dir.join(format!("{}.{}.{}.bak", file_name, fix_id, stamp));
        let mut seq = 1;
        while backup_path.exists() {
            backup_path = dir.join(format!("{}.{}.{}.{}.bak", file_name, fix_id, stamp, seq));
            seq += 1;
        }

        std::fs::copy(original, &backup_path).map_err(io_err)?;

        let record = FileBackup {
            fix_id: fix_id.to_string(),
            original_path: original.to_path_buf(),
            backup_path,
            taken_at,
        };
        let mut manifest = self
            .read_manifest(fix_id)
            .map_err(|reason| io_err(std::io::Error::other(reason)))?;
        manifest.push(record.clone());
        self.write_manifest(fix_id, &manifest).map_err(io_err)?;

        debug!(
            fix_id,
            original = %record.original_path.display(),
            backup = %record.backup_path.display(),
            "File backed up"
        );
        Ok(record)
    }

    /// All snapshots recorded under `fix_id`, oldest first.
    pub fn records(&self, fix_id: &str) -> Result<Vec<FileBackup>, FixError> {
        self.read_manifest(fix_id).map_err(|reason| FixError::Rollback {
            fix_id: fix_id.to_string(),
            failures: vec![reason],
        })
    }

    fn read_manifest(&self, fix_id: &str) -> Result<Vec<FileBackup>, String> {
        let path = self.fix_dir(fix_id).join(MANIFEST);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(format!("read {}: {}", path.display(), e)),
        };
        serde_json::from_str(&content).map_err(|e| format!("parse {}: {}", path.display(), e))
    }

    fn write_manifest(&self, fix_id: &str, records: &[FileBackup]) -> std::io::Result<()> {
        let dir = self.fix_dir(fix_id);
        let tmp = dir.join(format!("{}.tmp", MANIFEST));
        let json = serde_json::to_vec_pretty(records)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, dir.join(MANIFEST))
    }

    /// Restore every snapshot of `fix_id`, newest first, so a path backed up
    /// more than once ends at its earliest content. Runs over all records even
    /// if some fail. Safe to repeat. Returns the number of restored snapshots.
    pub fn rollback(&self, fix_id: &str) -> Result<usize, FixError> {
        let records = self.records(fix_id)?;
        let mut failures = Vec::new();
        let mut restored = 0;

        for record in records.iter().rev() {
            match std::fs::copy(&record.backup_path, &record.original_path) {
                Ok(_) => restored += 1,
                Err(e) => {
                    warn!(
                        fix_id,
                        original = %record.original_path.display(),
                        backup = %record.backup_path.display(),
                        error = %e,
                        "Failed to restore snapshot"
                    );
                    failures.push(format!("{}: {}", record.original_path.display(), e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(FixError::Rollback {
                fix_id: fix_id.to_string(),
                failures,
            });
        }
        info!(fix_id, restored, "Rollback complete");
        Ok(restored)
    }
}
