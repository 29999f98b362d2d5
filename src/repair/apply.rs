//! Exact-text replacement inside the working tree.

use super::{BackupStore, FileChange, FixError};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Resolve a tree-relative path, refusing anything that could leave the tree.
pub fn resolve_in_tree(repo_root: &Path, relative: &Path) -> Result<PathBuf, FixError> {
    if relative.as_os_str().is_empty() {
        return Err(FixError::PathOutsideTree(relative.to_path_buf()));
    }
    for component in relative.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FixError::PathOutsideTree(relative.to_path_buf()));
            }
        }
    }
    Ok(repo_root.join(relative))
}

/// Back up the target, then replace the first occurrence of `old_content`.
///
/// When `old_content` is absent the file is left untouched; the snapshot
/// already taken stays on disk unused. Returns the absolute path written.
pub fn apply_change(
    store: &BackupStore,
    repo_root: &Path,
    change: &FileChange,
    fix_id: &str,
) -> Result<PathBuf, FixError> {
    let target = resolve_in_tree(repo_root, &change.path)?;
    let apply_err = |reason: String| FixError::Apply {
        fix_id: fix_id.to_string(),
        path: change.path.clone(),
        reason,
    };

    if change.old_content.is_empty() {
        return Err(apply_err("expected content is empty".to_string()));
    }

    store.backup(&target, fix_id)?;

    let current = std::fs::read(&target).map_err(|e| apply_err(format!("read failed: {}", e)))?;
    let old = change.old_content.as_bytes();

    let Some(at) = find_bytes(&current, old) else {
        warn!(fix_id, path = %change.path.display(), "Expected content not found; file left unchanged");
        return Err(apply_err("expected content not found".to_string()));
    };

    let mut updated = Vec::with_capacity(current.len() - old.len() + change.new_content.len());
    updated.extend_from_slice(&current[..at]);
    updated.extend_from_slice(change.new_content.as_bytes());
    updated.extend_from_slice(&current[at + old.len()..]);
    std::fs::write(&target, updated).map_err(|e| apply_err(format!("write failed: {}", e)))?;

    debug!(fix_id, path = %change.path.display(), "Change applied");
    Ok(target)
}

/// Offset of the first exact occurrence of `needle`. `needle` must be non-empty.
fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(content: &str) -> (tempfile::TempDir, BackupStore) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/app.py"), content).unwrap();
        let store = BackupStore::new(dir.path().join(".backups"));
        (dir, store)
    }

    #[test]
    fn test_replaces_first_occurrence_only() {
        let (dir, store) = setup("retry = 1\nretry = 1\n");
        let change = FileChange::new("src/app.py", "retry = 1", "retry = 3");
        apply_change(&store, dir.path(), &change, "fix_a").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("src/app.py")).unwrap(),
            "retry = 3\nretry = 1\n"
        );
    }

    #[test]
    fn test_absent_old_content_leaves_file_identical() {
        let (dir, store) = setup("timeout = 5\n");
        let before = std::fs::read(dir.path().join("src/app.py")).unwrap();
        let change = FileChange::new("src/app.py", "timeout = 50", "timeout = 60");
        let err = apply_change(&store, dir.path(), &change, "fix_a").unwrap_err();
        assert!(matches!(err, FixError::Apply { .. }));
        assert_eq!(std::fs::read(dir.path().join("src/app.py")).unwrap(), before);
        // The snapshot is still recorded.
        assert_eq!(store.records("fix_a").unwrap().len(), 1);
    }

    #[test]
    fn test_non_utf8_file_is_matched_bytewise() {
        let (dir, store) = setup("");
        let path = dir.path().join("src/app.py");
        std::fs::write(&path, b"\xff\xfe header\ntimeout = 5\n\x80\n").unwrap();

        let change = FileChange::new("src/app.py", "timeout = 5", "timeout = 30");
        apply_change(&store, dir.path(), &change, "fix_a").unwrap();
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"\xff\xfe header\ntimeout = 30\n\x80\n".to_vec()
        );

        assert_eq!(store.rollback("fix_a").unwrap(), 1);
        assert_eq!(
            std::fs::read(&path).unwrap(),
            b"\xff\xfe header\ntimeout = 5\n\x80\n".to_vec()
        );
    }

    #[test]
    fn test_find_bytes() {
        assert_eq!(find_bytes(b"abcabc", b"ca"), Some(2));
        assert_eq!(find_bytes(b"abc", b"abcd"), None);
    }

    #[test]
    fn test_match_is_exact() {
        let (dir, store) = setup("Timeout = 5\n");
        let change = FileChange::new("src/app.py", "timeout = 5", "timeout = 6");
        assert!(apply_change(&store, dir.path(), &change, "fix_a").is_err());
    }

    #[test]
    fn test_refuses_escaping_paths() {
        let (dir, store) = setup("x");
        for bad in ["../etc/passwd", "/etc/passwd", "src/../../x", ""] {
            let change = FileChange::new(bad, "x", "y");
            assert!(
                matches!(
                    apply_change(&store, dir.path(), &change, "fix_a"),
                    Err(FixError::PathOutsideTree(_))
                ),
                "{}",
                bad
            );
        }
        assert!(store.records("fix_a").unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_aborts_at_backup() {
        let (dir, store) = setup("x");
        let change = FileChange::new("src/missing.py", "x", "y");
        assert!(matches!(
            apply_change(&store, dir.path(), &change, "fix_a"),
            Err(FixError::Backup { .. })
        ));
    }
}
