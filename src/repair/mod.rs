//! Guarded self-healing: backup, apply, validate, commit, deploy, rollback.
//!
//! A [`ProposedFix`] moves through [`FixState`] under the control of the
//! [`FixImplementor`]. Every mutation of the working tree is preceded by a
//! backup owned by the fix id, and any failure before the commit boundary
//! restores those backups.

pub mod apply;
pub mod backup;
pub mod changes;
pub mod implementor;
pub mod registry;
pub mod validate;

use crate::detect::Anomaly;
use crate::reasoning::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use self::backup::{BackupStore, FileBackup};
pub use self::changes::parse_change_set;
pub use self::implementor::FixImplementor;
pub use self::registry::FixRegistry;
pub use self::validate::{CommandValidator, ValidationOutcome, Validator};

#[derive(Debug, Error)]
pub enum FixError {
    #[error("repair is not configured: {0}")]
    Configuration(String),
    #[error("fix {fix_id}: backup of {path} failed: {source}")]
    Backup {
        fix_id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("fix {fix_id}: could not apply change to {path}: {reason}")]
    Apply {
        fix_id: String,
        path: PathBuf,
        reason: String,
    },
    #[error("fix {fix_id}: validation failed: {message}")]
    Validation { fix_id: String, message: String },
    #[error("fix {fix_id}: commit failed: {reason}")]
    Commit { fix_id: String, reason: String },
    #[error("fix {fix_id}: deploy failed: {reason}")]
    Deploy { fix_id: String, reason: String },
    #[error("fix {fix_id}: rollback incomplete: {failures:?}")]
    Rollback {
        fix_id: String,
        failures: Vec<String>,
    },
    #[error("working tree is busy; fix {fix_id} was not started")]
    WorkingTreeBusy { fix_id: String },
    #[error("unknown fix {0}")]
    UnknownFix(String),
    #[error("fix {fix_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        fix_id: String,
        from: FixState,
        to: FixState,
    },
    #[error("path {0} escapes the working tree")]
    PathOutsideTree(PathBuf),
    #[error("fix {0} carries no concrete file changes")]
    NoChanges(String),
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Lifecycle of a proposed fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FixState {
    Proposed,
    Applying,
    Validating,
    Committing,
    Deploying,
    Deployed,
    /// Committed but not delivered: push failed or auto-deploy is off.
    Committed,
    RollingBack,
    RolledBack,
    /// Rollback hit an I/O error; the tree may hold partial changes.
    RollbackFailed,
    Rejected,
}

impl FixState {
    pub fn can_transition_to(self, next: FixState) -> bool {
        use FixState::*;
        matches!(
            (self, next),
            (Proposed, Applying)
                | (Proposed, Rejected)
                | (Applying, Validating)
                | (Validating, Committing)
                | (Committing, Deploying)
                | (Committing, Committed)
                | (Deploying, Deployed)
                | (Deploying, Committed)
                | (Applying | Validating | Committing | Deploying, RollingBack)
                | (RollingBack, RolledBack)
                | (RollingBack, RollbackFailed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            FixState::Deployed
                | FixState::Committed
                | FixState::RolledBack
                | FixState::RollbackFailed
                | FixState::Rejected
        )
    }
}

impl std::fmt::Display for FixState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FixState::Proposed => "PROPOSED",
            FixState::Applying => "APPLYING",
            FixState::Validating => "VALIDATING",
            FixState::Committing => "COMMITTING",
            FixState::Deploying => "DEPLOYING",
            FixState::Deployed => "DEPLOYED",
            FixState::Committed => "COMMITTED",
            FixState::RollingBack => "ROLLING_BACK",
            FixState::RolledBack => "ROLLED_BACK",
            FixState::RollbackFailed => "ROLLBACK_FAILED",
            FixState::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// One exact-text replacement in a file, path relative to the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: PathBuf,
    pub old_content: String,
    pub new_content: String,
}

impl FileChange {
    pub fn new(
        path: impl Into<PathBuf>,
        old_content: impl Into<String>,
        new_content: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            old_content: old_content.into(),
            new_content: new_content.into(),
        }
    }
}

/// A remediation proposal awaiting (or past) approval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposedFix {
    pub fix_id: String,
    pub anomaly: Anomaly,
    pub root_cause: String,
    pub affected_components: Vec<String>,
    /// Free text plus search/replace blocks for the concrete edits.
    pub change_description: String,
    pub reasoning: String,
    pub risk_level: RiskLevel,
    pub state: FixState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_result: Option<ImplementationResult>,
}

/// Outcome of one `implement_fix` attempt. Never mutated after return.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImplementationResult {
    pub fix_id: String,
    pub success: bool,
    pub files_modified: Vec<PathBuf>,
    pub commit_ref: Option<String>,
    pub error: Option<String>,
    pub rolled_back: bool,
    pub deployed: bool,
    /// Set when the commit landed but delivery failed.
    pub deploy_error: Option<String>,
    pub final_state: FixState,
}

/// Time-derived fix identifier, e.g. `fix_20240601_120000_123`.
pub fn new_fix_id(now: DateTime<Utc>) -> String {
    format!("fix_{}", now.format("%Y%m%d_%H%M%S_%3f"))
}
