//! The fix state machine.
//!
//! ```text
//! PROPOSED -> APPLYING -> VALIDATING -> COMMITTING -> DEPLOYING -> DEPLOYED
//!                 \            \             \             \--> COMMITTED (push failed)
//!                  \------------\-------------\--> ROLLING_BACK -> ROLLED_BACK | ROLLBACK_FAILED
//! ```
//!
//! The commit is the durability boundary: failures before it roll back,
//! a failed push after it is reported and the commit stays.

use super::{
    apply, BackupStore, FileBackup, FileChange, FixError, FixRegistry, FixState,
    ImplementationResult, ValidationOutcome, Validator,
};
use crate::vcs::VcsBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

pub struct FixImplementor {
    repo_root: PathBuf,
    store: BackupStore,
    validator: Arc<dyn Validator>,
    vcs: Arc<dyn VcsBackend>,
    registry: Arc<FixRegistry>,
    auto_deploy: bool,
    /// Exclusive claim over the working tree for one `implement_fix` at a time.
    tree_lock: Mutex<()>,
}

/// What the pipeline reached before returning successfully.
struct Delivered {
    commit_ref: String,
    deployed: bool,
    deploy_error: Option<String>,
}

impl FixImplementor {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        store: BackupStore,
        validator: Arc<dyn Validator>,
        vcs: Arc<dyn VcsBackend>,
        registry: Arc<FixRegistry>,
    ) -> Self {
        Self {
            repo_root: repo_root.into(),
            store,
            validator,
            vcs,
            registry,
            auto_deploy: true,
            tree_lock: Mutex::new(()),
        }
    }

    pub fn with_auto_deploy(mut self, auto_deploy: bool) -> Self {
        self.auto_deploy = auto_deploy;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    pub fn backup_store(&self) -> &BackupStore {
        &self.store
    }

    /// Snapshot `path` (tree-relative) under `fix_id`.
    pub async fn backup(&self, path: &Path, fix_id: &str) -> Result<FileBackup, FixError> {
        let target = apply::resolve_in_tree(&self.repo_root, path)?;
        let store = self.store.clone();
        let fix_id = fix_id.to_string();
        tokio::task::spawn_blocking(move || store.backup(&target, &fix_id)).await?
    }

    /// Back up, then replace the first exact occurrence of the old content.
    pub async fn apply_change(&self, change: &FileChange, fix_id: &str) -> Result<PathBuf, FixError> {
        let store = self.store.clone();
        let root = self.repo_root.clone();
        let change = change.clone();
        let fix_id = fix_id.to_string();
        tokio::task::spawn_blocking(move || apply::apply_change(&store, &root, &change, &fix_id))
            .await?
    }

    pub async fn run_validation(&self) -> ValidationOutcome {
        self.validator.run_validation().await
    }

    pub async fn commit(
        &self,
        fix_id: &str,
        description: &str,
        paths: &[PathBuf],
    ) -> Result<String, FixError> {
        let message = format!("fix({}): {}", fix_id, description);
        self.vcs
            .commit(paths, &message)
            .await
            .map_err(|e| FixError::Commit {
                fix_id: fix_id.to_string(),
                reason: e.to_string(),
            })
    }

    pub async fn deploy(&self, fix_id: &str) -> Result<(), FixError> {
        self.vcs.push().await.map_err(|e| FixError::Deploy {
            fix_id: fix_id.to_string(),
            reason: e.to_string(),
        })
    }

    /// Restore every snapshot taken under `fix_id`. Runs on the blocking pool,
    /// so it completes even if the caller stops waiting. Idempotent.
    pub async fn rollback(&self, fix_id: &str) -> Result<usize, FixError> {
        let store = self.store.clone();
        let fix_id = fix_id.to_string();
        tokio::task::spawn_blocking(move || store.rollback(&fix_id)).await?
    }

    /// Run the whole lifecycle for one fix while holding the working-tree claim.
    ///
    /// Returns `Err` only when the fix could not start: the tree is busy, there
    /// is nothing to apply, or the registry refuses the transition. Every
    /// attempt that started yields an [`ImplementationResult`].
    pub async fn implement_fix(
        &self,
        fix_id: &str,
        changes: &[FileChange],
        description: &str,
    ) -> Result<ImplementationResult, FixError> {
        if changes.is_empty() {
            return Err(FixError::NoChanges(fix_id.to_string()));
        }
        let _claim = self
            .tree_lock
            .try_lock()
            .map_err(|_| FixError::WorkingTreeBusy {
                fix_id: fix_id.to_string(),
            })?;

        self.enter(fix_id, FixState::Applying).await?;
        info!(fix_id, changes = changes.len(), "Implementing fix");

        let mut files_modified = Vec::new();
        let outcome = self
            .run_pipeline(fix_id, changes, description, &mut files_modified)
            .await;

        let result = match outcome {
            Ok(delivered) => {
                let final_state = if delivered.deployed {
                    FixState::Deployed
                } else {
                    FixState::Committed
                };
                self.enter(fix_id, final_state).await?;
                info!(fix_id, commit = %delivered.commit_ref, %final_state, "Fix implemented");
                ImplementationResult {
                    fix_id: fix_id.to_string(),
                    success: true,
                    files_modified,
                    commit_ref: Some(delivered.commit_ref),
                    error: None,
                    rolled_back: false,
                    deployed: delivered.deployed,
                    deploy_error: delivered.deploy_error,
                    final_state,
                }
            }
            Err(cause) => self.abort(fix_id, cause, files_modified).await?,
        };

        self.registry.record_result(&result).await;
        Ok(result)
    }

    async fn run_pipeline(
        &self,
        fix_id: &str,
        changes: &[FileChange],
        description: &str,
        files_modified: &mut Vec<PathBuf>,
    ) -> Result<Delivered, FixError> {
        for change in changes {
            self.apply_change(change, fix_id).await?;
            if !files_modified.contains(&change.path) {
                files_modified.push(change.path.clone());
            }
        }

        self.enter(fix_id, FixState::Validating).await?;
        let validation = self.run_validation().await;
        if !validation.passed {
            return Err(FixError::Validation {
                fix_id: fix_id.to_string(),
                message: validation.message,
            });
        }

        self.enter(fix_id, FixState::Committing).await?;
        let commit_ref = self.commit(fix_id, description, files_modified).await?;

        if !self.auto_deploy {
            return Ok(Delivered {
                commit_ref,
                deployed: false,
                deploy_error: None,
            });
        }

        self.enter(fix_id, FixState::Deploying).await?;
        match self.deploy(fix_id).await {
            Ok(()) => Ok(Delivered {
                commit_ref,
                deployed: true,
                deploy_error: None,
            }),
            Err(e) => {
                warn!(fix_id, error = %e, "Deploy failed; commit is kept");
                Ok(Delivered {
                    commit_ref,
                    deployed: false,
                    deploy_error: Some(e.to_string()),
                })
            }
        }
    }

    async fn abort(
        &self,
        fix_id: &str,
        cause: FixError,
        files_modified: Vec<PathBuf>,
    ) -> Result<ImplementationResult, FixError> {
        warn!(fix_id, error = %cause, "Fix aborted, rolling back");
        self.enter(fix_id, FixState::RollingBack).await?;

        let (rolled_back, error, final_state) = match self.rollback(fix_id).await {
            Ok(restored) => {
                info!(fix_id, restored, "Working tree restored");
                (true, cause.to_string(), FixState::RolledBack)
            }
            Err(rollback_err) => {
                error!(fix_id, error = %rollback_err, "Rollback failed; working tree may be inconsistent");
                (
                    false,
                    format!("{}; {}", cause, rollback_err),
                    FixState::RollbackFailed,
                )
            }
        };
        self.enter(fix_id, final_state).await?;

        Ok(ImplementationResult {
            fix_id: fix_id.to_string(),
            success: false,
            files_modified,
            commit_ref: None,
            error: Some(error),
            rolled_back,
            deployed: false,
            deploy_error: None,
            final_state,
        })
    }

    /// Record a transition for fixes tracked in the registry. Fixes started
    /// outside the registry (e.g. from the CLI) are not tracked.
    async fn enter(&self, fix_id: &str, state: FixState) -> Result<(), FixError> {
        match self.registry.advance(fix_id, state).await {
            Ok(_) | Err(FixError::UnknownFix(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
