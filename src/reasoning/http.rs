//! JSON-over-HTTP reasoning backend.

use super::{FixSuggestion, ReasoningError, ReasoningGateway, RiskLevel, RootCauseAnalysis};
use crate::config::ReasoningConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Posts `{"task": ...}` requests to a single endpoint and decodes JSON replies.
pub struct HttpReasoningGateway {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct FixReply {
    proposed_fix: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    risk_assessment: String,
}

impl HttpReasoningGateway {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ReasoningError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReasoningError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
            model,
            timeout,
        })
    }

    /// Build from config. Fails closed when the endpoint or the named
    /// credential variable is missing.
    pub fn from_config(cfg: &ReasoningConfig) -> Result<Self, ReasoningError> {
        let endpoint = cfg
            .endpoint
            .clone()
            .ok_or_else(|| ReasoningError::Configuration("no endpoint configured".into()))?;
        let api_key = match &cfg.api_key_env {
            Some(var) => Some(std::env::var(var).map_err(|_| {
                ReasoningError::Configuration(format!("credential variable {} is not set", var))
            })?),
            None => None,
        };
        Self::new(
            endpoint,
            api_key,
            cfg.model.clone(),
            Duration::from_secs(cfg.timeout_secs),
        )
    }

    async fn call<T: DeserializeOwned>(
        &self,
        body: serde_json::Value,
    ) -> Result<T, ReasoningError> {
        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_transport(e))?;
        debug!(status = %status, bytes = text.len(), "Reasoning service replied");

        if !status.is_success() {
            return Err(ReasoningError::Rejected {
                status: status.as_u16(),
                body: text.chars().take(500).collect(),
            });
        }
        serde_json::from_str(&text).map_err(|e| ReasoningError::Malformed(e.to_string()))
    }

    fn map_transport(&self, e: reqwest::Error) -> ReasoningError {
        if e.is_timeout() {
            ReasoningError::Timeout(self.timeout)
        } else {
            ReasoningError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl ReasoningGateway for HttpReasoningGateway {
    async fn analyze_root_cause(
        &self,
        description: &str,
        sample_lines: &[String],
        system_context: &str,
    ) -> Result<RootCauseAnalysis, ReasoningError> {
        self.call(json!({
            "task": "root_cause",
            "model": self.model,
            "description": description,
            "sample_lines": sample_lines,
            "system_context": system_context,
        }))
        .await
    }

    async fn generate_fix(
        &self,
        root_cause: &str,
        affected_components: &[String],
        current_code: &str,
    ) -> Result<FixSuggestion, ReasoningError> {
        let reply: FixReply = self
            .call(json!({
                "task": "generate_fix",
                "model": self.model,
                "root_cause": root_cause,
                "affected_components": affected_components,
                "current_code": current_code,
            }))
            .await?;
        if reply.proposed_fix.trim().is_empty() {
            return Err(ReasoningError::Malformed("empty proposed_fix".into()));
        }
        Ok(FixSuggestion {
            proposed_fix: reply.proposed_fix,
            reasoning: reply.reasoning,
            risk_assessment: RiskLevel::from_assessment(&reply.risk_assessment),
        })
    }
}
