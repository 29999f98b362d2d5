//! In-memory registry of proposed fixes and their lifecycle state.

use super::{new_fix_id, FixError, FixState, ImplementationResult, ProposedFix};
use crate::detect::Anomaly;
use crate::reasoning::{FixSuggestion, RootCauseAnalysis};
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::info;

/// Shared handle between the monitor, the approval handler, and the API.
/// Ids are time-derived, so iteration order is creation order.
#[derive(Debug, Default)]
pub struct FixRegistry {
    fixes: RwLock<BTreeMap<String, ProposedFix>>,
}

impl FixRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new fix in PROPOSED state and return a copy of it.
    pub async fn propose(
        &self,
        anomaly: Anomaly,
        analysis: RootCauseAnalysis,
        suggestion: FixSuggestion,
    ) -> ProposedFix {
        let now = Utc::now();
        let mut fixes = self.fixes.write().await;

        let base = new_fix_id(now);
        let mut fix_id = base.clone();
        let mut n = 1;
        while fixes.contains_key(&fix_id) {
            fix_id = format!("{}_{}", base, n);
            n += 1;
        }

        let fix = ProposedFix {
            fix_id: fix_id.clone(),
            anomaly,
            root_cause: analysis.root_cause,
            affected_components: analysis.affected_components,
            change_description: suggestion.proposed_fix,
            reasoning: suggestion.reasoning,
            risk_level: suggestion.risk_assessment,
            state: FixState::Proposed,
            created_at: now,
            updated_at: now,
            last_result: None,
        };
        fixes.insert(fix_id.clone(), fix.clone());
        info!(fix_id = %fix_id, risk = %fix.risk_level, "Fix proposed");
        fix
    }

    pub async fn get(&self, fix_id: &str) -> Option<ProposedFix> {
        self.fixes.read().await.get(fix_id).cloned()
    }

    pub async fn list(&self) -> Vec<ProposedFix> {
        self.fixes.read().await.values().cloned().collect()
    }

    /// Move a fix to `next`, enforcing the lifecycle. Returns the previous state.
    pub async fn advance(&self, fix_id: &str, next: FixState) -> Result<FixState, FixError> {
        let mut fixes = self.fixes.write().await;
        let fix = fixes
            .get_mut(fix_id)
            .ok_or_else(|| FixError::UnknownFix(fix_id.to_string()))?;
        let from = fix.state;
        if !from.can_transition_to(next) {
            return Err(FixError::InvalidTransition {
                fix_id: fix_id.to_string(),
                from,
                to: next,
            });
        }
        fix.state = next;
        fix.updated_at = Utc::now();
        info!(fix_id, %from, to = %next, "Fix state changed");
        Ok(from)
    }

    pub async fn record_result(&self, result: &ImplementationResult) {
        if let Some(fix) = self.fixes.write().await.get_mut(&result.fix_id) {
            fix.last_result = Some(result.clone());
            fix.updated_at = Utc::now();
        }
    }
}
