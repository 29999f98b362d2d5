//! Bounded record of recently surfaced anomalies and what became of them.

use crate::detect::Anomaly;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// What the monitor did with an admitted anomaly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Escalation {
    /// Below the escalation floor; recorded only.
    NotEscalated,
    /// No reasoning service configured.
    Disabled,
    ReasoningFailed { reason: String },
    Proposed { fix_id: String },
    /// Fix registered but the approval channel did not accept it.
    Unpublished { fix_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyRecord {
    pub recorded_at: DateTime<Utc>,
    pub anomaly: Anomaly,
    pub escalation: Escalation,
}

#[derive(Debug)]
pub struct AnomalyHistory {
    limit: usize,
    entries: RwLock<VecDeque<AnomalyRecord>>,
}

impl AnomalyHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            entries: RwLock::new(VecDeque::new()),
        }
    }

    pub async fn record(&self, anomaly: Anomaly, escalation: Escalation) {
        let mut entries = self.entries.write().await;
        if entries.len() == self.limit {
            entries.pop_front();
        }
        entries.push_back(AnomalyRecord {
            recorded_at: Utc::now(),
            anomaly,
            escalation,
        });
    }

    /// Newest first.
    pub async fn recent(&self) -> Vec<AnomalyRecord> {
        self.entries.read().await.iter().rev().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Category;

    #[tokio::test]
    async fn test_ring_keeps_newest() {
        let history = AnomalyHistory::new(2);
        for name in ["a", "b", "c"] {
            let lines = vec![name; 3];
            let anomaly = Anomaly::new(Category::Error, name, name, &lines, Utc::now());
            history.record(anomaly, Escalation::NotEscalated).await;
        }
        let recent = history.recent().await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].anomaly.fingerprint, "c");
        assert_eq!(recent[1].anomaly.fingerprint, "b");
    }
}
