//! `git` CLI backend.

use super::{VcsBackend, VcsError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct GitBackend {
    repo_root: PathBuf,
    remote: String,
    branch: Option<String>,
}

impl GitBackend {
    /// Open `repo_root`, failing closed if it is not a git work tree.
    pub async fn open(
        repo_root: impl Into<PathBuf>,
        remote: impl Into<String>,
        branch: Option<String>,
    ) -> Result<Self, VcsError> {
        let backend = Self {
            repo_root: repo_root.into(),
            remote: remote.into(),
            branch,
        };
        let inside = backend
            .git(&["rev-parse", "--is-inside-work-tree"])
            .await
            .map_err(|e| VcsError::Configuration(e.to_string()))?;
        if inside.trim() != "true" {
            return Err(VcsError::Configuration(format!(
                "{} is not a git work tree",
                backend.repo_root.display()
            )));
        }
        Ok(backend)
    }

    /// Reset the index entries of `paths` to HEAD so a later rollback of the
    /// files leaves nothing staged behind.
    async fn unstage(&self, paths: &[&str]) {
        let mut reset = vec!["reset", "-q", "--"];
        reset.extend(paths);
        if let Err(e) = self.git(&reset).await {
            warn!(error = %e, "Failed to unstage paths after a failed commit");
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    async fn git(&self, args: &[&str]) -> Result<String, VcsError> {
        let command = format!("git {}", args.join(" "));
        debug!(%command, "Running git");
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .await
            .map_err(|source| VcsError::Spawn {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(VcsError::Command {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VcsBackend for GitBackend {
    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<String, VcsError> {
        let path_args: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
        let pathspec: Vec<&str> = path_args.iter().map(String::as_str).collect();

        // Untracked paths must be known to the index before `commit --only`.
        let mut add = vec!["add", "-A", "--"];
        add.extend(&pathspec);
        self.git(&add).await?;

        // `--only` commits exactly these paths and leaves anything else staged alone.
        let mut commit = vec!["commit", "--only", "-m", message, "--"];
        commit.extend(&pathspec);
        if let Err(e) = self.git(&commit).await {
            self.unstage(&pathspec).await;
            return Err(e);
        }

        let head = self.git(&["rev-parse", "HEAD"]).await?;
        let head = head.trim().to_string();
        info!(commit = %head, "Committed");
        Ok(head)
    }

    async fn push(&self) -> Result<(), VcsError> {
        let refspec = self.branch.as_deref().unwrap_or("HEAD");
        self.git(&["push", &self.remote, refspec]).await?;
        info!(remote = %self.remote, refspec, "Pushed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn git_available() -> bool {
        Command::new("git").arg("--version").output().is_ok()
    }

    fn run(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {:?}", args);
    }

    fn init_repo(dir: &Path) {
        run(dir, &["init", "-q"]);
        run(dir, &["config", "user.email", "ops@example.com"]);
        run(dir, &["config", "user.name", "ops"]);
        run(dir, &["config", "commit.gpgsign", "false"]);
        std::fs::write(dir.join("app.py"), "x = 1\n").unwrap();
        run(dir, &["add", "."]);
        run(dir, &["commit", "-q", "-m", "init"]);
    }

    #[tokio::test]
    async fn test_open_rejects_plain_directory() {
        if !git_available() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        assert!(GitBackend::open(dir.path(), "origin", None).await.is_err());
    }

    #[tokio::test]
    async fn test_commit_and_push() {
        if !git_available() {
            return;
        }
        let work = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        run(remote.path(), &["init", "-q", "--bare"]);
        init_repo(work.path());
        run(
            work.path(),
            &["remote", "add", "origin", &remote.path().display().to_string()],
        );

        let backend = GitBackend::open(work.path(), "origin", None).await.unwrap();
        std::fs::write(work.path().join("app.py"), "x = 2\n").unwrap();
        let head = backend
            .commit(&[PathBuf::from("app.py")], "fix(fix_1): bump x")
            .await
            .unwrap();
        assert_eq!(head.len(), 40);

        backend.push().await.unwrap();
    }

    #[tokio::test]
    async fn test_commit_with_nothing_staged_fails() {
        if !git_available() {
            return;
        }
        let work = tempfile::tempdir().unwrap();
        init_repo(work.path());
        let backend = GitBackend::open(work.path(), "origin", None).await.unwrap();
        let err = backend
            .commit(&[PathBuf::from("app.py")], "noop")
            .await
            .unwrap_err();
        assert!(matches!(err, VcsError::Command { .. }));
    }

    fn stdout(dir: &Path, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(out.status.success(), "git {:?}", args);
        String::from_utf8(out.stdout).unwrap()
    }

    #[cfg(unix)]
    fn install_failing_once_hook(dir: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let hook = dir.join(".git/hooks/pre-commit");
        std::fs::write(
            &hook,
            "#!/bin/sh\nif [ -f .git/fail-once ]; then rm .git/fail-once; exit 1; fi\nexit 0\n",
        )
        .unwrap();
        std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
        std::fs::write(dir.join(".git/fail-once"), "").unwrap();
    }

    struct AlwaysPasses;

    #[async_trait]
    impl crate::repair::Validator for AlwaysPasses {
        async fn run_validation(&self) -> crate::repair::ValidationOutcome {
            crate::repair::ValidationOutcome::pass("ok")
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_rejected_commit_leaves_nothing_staged_for_next_fix() {
        use crate::repair::{BackupStore, FileChange, FixImplementor, FixRegistry, FixState};
        use std::sync::Arc;

        if !git_available() {
            return;
        }
        let work = tempfile::tempdir().unwrap();
        let backups = tempfile::tempdir().unwrap();
        init_repo(work.path());
        std::fs::write(work.path().join("b.py"), "y = 1\n").unwrap();
        run(work.path(), &["add", "b.py"]);
        run(work.path(), &["commit", "-q", "-m", "add b"]);
        install_failing_once_hook(work.path());

        let backend = GitBackend::open(work.path(), "origin", None).await.unwrap();
        let implementor = FixImplementor::new(
            work.path(),
            BackupStore::new(backups.path()),
            Arc::new(AlwaysPasses),
            Arc::new(backend),
            Arc::new(FixRegistry::new()),
        )
        .with_auto_deploy(false);

        let first = implementor
            .implement_fix("fix_1", &[FileChange::new("app.py", "x = 1", "x = 2")], "bump x")
            .await
            .unwrap();
        assert!(!first.success);
        assert!(first.rolled_back);
        assert_eq!(
            std::fs::read_to_string(work.path().join("app.py")).unwrap(),
            "x = 1\n"
        );
        assert_eq!(stdout(work.path(), &["status", "--porcelain"]), "");

        let second = implementor
            .implement_fix("fix_2", &[FileChange::new("b.py", "y = 1", "y = 2")], "bump y")
            .await
            .unwrap();
        assert!(second.success);
        assert_eq!(second.final_state, FixState::Committed);
        assert_eq!(
            stdout(work.path(), &["show", "--name-only", "--format=", "HEAD"]).trim(),
            "b.py"
        );
        assert_eq!(stdout(work.path(), &["show", "HEAD:app.py"]), "x = 1\n");
    }

    #[tokio::test]
    async fn test_commit_ignores_unrelated_staged_content() {
        if !git_available() {
            return;
        }
        let work = tempfile::tempdir().unwrap();
        init_repo(work.path());
        std::fs::write(work.path().join("notes.txt"), "wip\n").unwrap();
        run(work.path(), &["add", "notes.txt"]);

        let backend = GitBackend::open(work.path(), "origin", None).await.unwrap();
        std::fs::write(work.path().join("app.py"), "x = 2\n").unwrap();
        backend
            .commit(&[PathBuf::from("app.py")], "fix(fix_1): bump x")
            .await
            .unwrap();

        assert_eq!(
            stdout(work.path(), &["show", "--name-only", "--format=", "HEAD"]).trim(),
            "app.py"
        );
        assert_eq!(
            stdout(work.path(), &["status", "--porcelain"]).trim(),
            "A  notes.txt"
        );
    }

    #[tokio::test]
    async fn test_push_without_remote_fails() {
        if !git_available() {
            return;
        }
        let work = tempfile::tempdir().unwrap();
        init_repo(work.path());
        let backend = GitBackend::open(work.path(), "origin", None).await.unwrap();
        assert!(backend.push().await.is_err());
    }
}
