//! Out-of-band approval: publishing proposals and acting on `implement` /
//! `reject` commands.

pub mod webhook;

use crate::repair::{
    parse_change_set, FixError, FixImplementor, FixRegistry, FixState, ImplementationResult,
    ProposedFix,
};
use async_trait::async_trait;
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub use self::webhook::WebhookApprovalChannel;

/// Where proposals are sent for a human decision.
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    /// Deliver a proposal. Returns whether delivery succeeded.
    async fn publish(&self, fix: &ProposedFix) -> bool;
}

/// Channel that only logs proposals; decisions arrive through the API.
#[derive(Debug, Default)]
pub struct LogApprovalChannel;

#[async_trait]
impl ApprovalChannel for LogApprovalChannel {
    async fn publish(&self, fix: &ProposedFix) -> bool {
        info!(
            fix_id = %fix.fix_id,
            severity = %fix.anomaly.severity,
            category = %fix.anomaly.category,
            risk = %fix.risk_level,
            root_cause = %fix.root_cause,
            "Fix awaiting approval: send `implement {}` or `reject {}`",
            fix.fix_id,
            fix.fix_id
        );
        true
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    #[error("expected `implement <fixId>` or `reject <fixId>`, got {0:?}")]
    Shape(String),
    #[error("unknown verb {0:?}")]
    Verb(String),
    #[error("{0:?} is not a fix id")]
    FixId(String),
}

/// The only inbound triggers that move a fix out of PROPOSED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", content = "fix_id", rename_all = "snake_case")]
pub enum ApprovalCommand {
    Implement(String),
    Reject(String),
}

impl ApprovalCommand {
    pub fn fix_id(&self) -> &str {
        match self {
            ApprovalCommand::Implement(id) | ApprovalCommand::Reject(id) => id,
        }
    }
}

impl FromStr for ApprovalCommand {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [verb, fix_id] = parts.as_slice() else {
            return Err(ParseCommandError::Shape(s.trim().to_string()));
        };
        if !fix_id.starts_with("fix_") {
            return Err(ParseCommandError::FixId(fix_id.to_string()));
        }
        match verb.trim_start_matches('/').to_lowercase().as_str() {
            "implement" => Ok(ApprovalCommand::Implement(fix_id.to_string())),
            "reject" => Ok(ApprovalCommand::Reject(fix_id.to_string())),
            other => Err(ParseCommandError::Verb(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Implemented { result: ImplementationResult },
    Rejected { fix_id: String },
}

/// Applies approval decisions. Built once at startup and shared by handle.
pub struct ApprovalHandler {
    registry: Arc<FixRegistry>,
    implementor: Option<Arc<FixImplementor>>,
}

impl ApprovalHandler {
    /// `implementor` is `None` when repair is not configured; approvals then
    /// fail closed while rejections still work.
    pub fn new(registry: Arc<FixRegistry>, implementor: Option<Arc<FixImplementor>>) -> Self {
        Self {
            registry,
            implementor,
        }
    }

    pub fn registry(&self) -> &Arc<FixRegistry> {
        &self.registry
    }

    pub async fn handle(&self, command: ApprovalCommand) -> Result<ApprovalOutcome, FixError> {
        match command {
            ApprovalCommand::Implement(fix_id) => self.implement(&fix_id).await,
            ApprovalCommand::Reject(fix_id) => {
                self.registry.advance(&fix_id, FixState::Rejected).await?;
                info!(fix_id = %fix_id, "Fix rejected; no files touched");
                Ok(ApprovalOutcome::Rejected { fix_id })
            }
        }
    }

    async fn implement(&self, fix_id: &str) -> Result<ApprovalOutcome, FixError> {
        let fix = self
            .registry
            .get(fix_id)
            .await
            .ok_or_else(|| FixError::UnknownFix(fix_id.to_string()))?;
        if fix.state != FixState::Proposed {
            return Err(FixError::InvalidTransition {
                fix_id: fix_id.to_string(),
                from: fix.state,
                to: FixState::Applying,
            });
        }
        let implementor = self.implementor.as_ref().ok_or_else(|| {
            FixError::Configuration("no validation or version control configured".to_string())
        })?;

        let changes = parse_change_set(&fix.change_description);
        if changes.is_empty() {
            return Err(FixError::NoChanges(fix_id.to_string()));
        }

        let summary = commit_summary(&fix);
        let result = implementor.implement_fix(fix_id, &changes, &summary).await?;
        Ok(ApprovalOutcome::Implemented { result })
    }
}

fn commit_summary(fix: &ProposedFix) -> String {
    let first_line = fix.root_cause.lines().next().unwrap_or("").trim();
    let summary: String = first_line.chars().take(72).collect();
    if summary.is_empty() {
        format!("{} anomaly remediation", fix.anomaly.category)
    } else {
        summary
    }
}
