//! Contract around the external reasoning service.
//!
//! The service is a text-in/text-out black box used for two calls: root-cause
//! analysis of an anomaly and generation of a concrete fix. Any backend that
//! implements [`ReasoningGateway`] can be plugged in.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use self::http::HttpReasoningGateway;

#[derive(Debug, Error)]
pub enum ReasoningError {
    #[error("reasoning service timed out after {0:?}")]
    Timeout(Duration),
    #[error("reasoning service unreachable: {0}")]
    Transport(String),
    #[error("reasoning service rejected the request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("malformed reasoning response: {0}")]
    Malformed(String),
    #[error("reasoning service not configured: {0}")]
    Configuration(String),
}

/// Risk the reasoning service attaches to a proposed fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Lenient parse of free-text risk. Anything unrecognized is treated as HIGH.
    pub fn from_assessment(text: &str) -> Self {
        let lower = text.trim().to_lowercase();
        if lower.starts_with("low") {
            RiskLevel::Low
        } else if lower.starts_with("medium") || lower.starts_with("moderate") {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootCauseAnalysis {
    pub root_cause: String,
    #[serde(default)]
    pub severity_assessment: String,
    #[serde(default)]
    pub affected_components: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    /// Change description, including search/replace blocks for concrete edits.
    pub proposed_fix: String,
    pub reasoning: String,
    pub risk_assessment: RiskLevel,
}

#[async_trait]
pub trait ReasoningGateway: Send + Sync {
    async fn analyze_root_cause(
        &self,
        description: &str,
        sample_lines: &[String],
        system_context: &str,
    ) -> Result<RootCauseAnalysis, ReasoningError>;

    async fn generate_fix(
        &self,
        root_cause: &str,
        affected_components: &[String],
        current_code: &str,
    ) -> Result<FixSuggestion, ReasoningError>;
}

/// Bounds every call of an inner gateway with a deadline.
pub struct TimeoutGateway {
    inner: Arc<dyn ReasoningGateway>,
    timeout: Duration,
}

impl TimeoutGateway {
    pub fn new(inner: Arc<dyn ReasoningGateway>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl ReasoningGateway for TimeoutGateway {
    async fn analyze_root_cause(
        &self,
        description: &str,
        sample_lines: &[String],
        system_context: &str,
    ) -> Result<RootCauseAnalysis, ReasoningError> {
        tokio::time::timeout(
            self.timeout,
            self.inner
                .analyze_root_cause(description, sample_lines, system_context),
        )
        .await
        .map_err(|_| ReasoningError::Timeout(self.timeout))?
    }

    async fn generate_fix(
        &self,
        root_cause: &str,
        affected_components: &[String],
        current_code: &str,
    ) -> Result<FixSuggestion, ReasoningError> {
        tokio::time::timeout(
            self.timeout,
            self.inner
                .generate_fix(root_cause, affected_components, current_code),
        )
        .await
        .map_err(|_| ReasoningError::Timeout(self.timeout))?
    }
}
