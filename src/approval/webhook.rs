//! Publishes proposals as JSON to an HTTP webhook (chat bridge, ticketing, ...).

use super::ApprovalChannel;
use crate::repair::ProposedFix;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

pub struct WebhookApprovalChannel {
    client: Client,
    url: String,
}

impl WebhookApprovalChannel {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

pub(crate) fn proposal_payload(fix: &ProposedFix) -> serde_json::Value {
    json!({
        "fix_id": fix.fix_id,
        "severity": fix.anomaly.severity,
        "category": fix.anomaly.category,
        "anomaly": fix.anomaly.description,
        "occurrences": fix.anomaly.occurrence_count,
        "sample_lines": fix.anomaly.sample_lines,
        "root_cause": fix.root_cause,
        "change_description": fix.change_description,
        "reasoning": fix.reasoning,
        "risk_level": fix.risk_level,
        "commands": {
            "implement": format!("implement {}", fix.fix_id),
            "reject": format!("reject {}", fix.fix_id),
        },
    })
}

#[async_trait]
impl ApprovalChannel for WebhookApprovalChannel {
    async fn publish(&self, fix: &ProposedFix) -> bool {
        let result = self
            .client
            .post(&self.url)
            .json(&proposal_payload(fix))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {
                info!(fix_id = %fix.fix_id, "Proposal published");
                true
            }
            Ok(resp) => {
                warn!(fix_id = %fix.fix_id, status = %resp.status(), "Approval webhook refused proposal");
                false
            }
            Err(e) => {
                warn!(fix_id = %fix.fix_id, error = %e, "Approval webhook unreachable");
                false
            }
        }
    }
}
