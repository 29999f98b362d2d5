//! The proactive detection loop: poll, analyze, dedupe, reason, propose.

pub mod history;

use crate::approval::ApprovalChannel;
use crate::config::LogmedicConfig;
use crate::detect::{Anomaly, AnomalyDeduplicator, LogAnalyzer};
use crate::reasoning::ReasoningGateway;
use crate::repair::apply::resolve_in_tree;
use crate::repair::FixRegistry;
use crate::sources::LogSource;
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub use self::history::{AnomalyHistory, AnomalyRecord, Escalation};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub recovery_interval: Duration,
    pub max_lines: usize,
    pub system_context: String,
    /// Tree the affected components are read from for fix context.
    pub repo_root: PathBuf,
    pub max_context_bytes: usize,
}

impl MonitorSettings {
    pub fn from_config(cfg: &LogmedicConfig) -> Self {
        Self {
            interval: Duration::from_secs(cfg.monitor.interval_secs),
            recovery_interval: Duration::from_secs(cfg.monitor.recovery_secs),
            max_lines: cfg.monitor.max_lines,
            system_context: cfg.reasoning.system_context.clone(),
            repo_root: cfg.repair.repo_root.clone(),
            max_context_bytes: cfg.reasoning.max_context_bytes,
        }
    }
}

/// Counts from one detection cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub lines: usize,
    pub detected: usize,
    pub admitted: usize,
    pub proposed: usize,
}

pub struct ProactiveMonitor {
    source: Arc<dyn LogSource>,
    analyzer: LogAnalyzer,
    dedup: Mutex<AnomalyDeduplicator>,
    reasoning: Option<Arc<dyn ReasoningGateway>>,
    approval: Arc<dyn ApprovalChannel>,
    registry: Arc<FixRegistry>,
    history: Arc<AnomalyHistory>,
    settings: MonitorSettings,
}

impl ProactiveMonitor {
    pub fn new(
        source: Arc<dyn LogSource>,
        approval: Arc<dyn ApprovalChannel>,
        registry: Arc<FixRegistry>,
        history: Arc<AnomalyHistory>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            source,
            analyzer: LogAnalyzer::new(),
            dedup: Mutex::new(AnomalyDeduplicator::new()),
            reasoning: None,
            approval,
            registry,
            history,
            settings,
        }
    }

    /// Enable escalation. Calls should already be deadline-bounded
    /// (see [`crate::reasoning::TimeoutGateway`]).
    pub fn with_reasoning(mut self, gateway: Arc<dyn ReasoningGateway>) -> Self {
        self.reasoning = Some(gateway);
        self
    }

    pub fn with_deduplicator(mut self, dedup: AnomalyDeduplicator) -> Self {
        self.dedup = Mutex::new(dedup);
        self
    }

    /// One pass of the loop body. Anomalies are handled one at a time.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let lines = self
            .source
            .fetch_recent_lines(self.settings.max_lines)
            .await;
        let detected = self.analyzer.analyze(&lines);

        let admitted: Vec<Anomaly> = {
            let mut dedup = self.dedup.lock().await;
            dedup.prune(Utc::now());
            detected.iter().filter(|a| dedup.admit(a)).cloned().collect()
        };

        let mut report = CycleReport {
            lines: lines.len(),
            detected: detected.len(),
            admitted: admitted.len(),
            proposed: 0,
        };

        for anomaly in admitted {
            info!(
                category = %anomaly.category,
                severity = %anomaly.severity,
                occurrences = anomaly.occurrence_count,
                fingerprint = %anomaly.fingerprint,
                "Anomaly detected"
            );
            let escalation = if anomaly.severity.is_escalated() {
                self.escalate(&anomaly).await
            } else {
                Escalation::NotEscalated
            };
            if matches!(escalation, Escalation::Proposed { .. }) {
                report.proposed += 1;
            }
            self.history.record(anomaly, escalation).await;
        }

        Ok(report)
    }

    async fn escalate(&self, anomaly: &Anomaly) -> Escalation {
        let Some(reasoning) = &self.reasoning else {
            debug!("Reasoning service not configured; anomaly surfaced without a fix");
            return Escalation::Disabled;
        };

        let analysis = match reasoning
            .analyze_root_cause(
                &anomaly.description,
                &anomaly.sample_lines,
                &self.settings.system_context,
            )
            .await
        {
            Ok(a) => a,
            Err(e) => {
                warn!(fingerprint = %anomaly.fingerprint, error = %e, "Root-cause analysis failed");
                return Escalation::ReasoningFailed {
                    reason: e.to_string(),
                };
            }
        };

        let current_code = gather_code_context(
            &self.settings.repo_root,
            &analysis.affected_components,
            self.settings.max_context_bytes,
        )
        .await;

        let suggestion = match reasoning
            .generate_fix(
                &analysis.root_cause,
                &analysis.affected_components,
                &current_code,
            )
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!(fingerprint = %anomaly.fingerprint, error = %e, "Unable to generate fix");
                return Escalation::ReasoningFailed {
                    reason: e.to_string(),
                };
            }
        };

        let fix = self
            .registry
            .propose(anomaly.clone(), analysis, suggestion)
            .await;
        if self.approval.publish(&fix).await {
            Escalation::Proposed { fix_id: fix.fix_id }
        } else {
            warn!(fix_id = %fix.fix_id, "Proposal could not be delivered; still available via the API");
            Escalation::Unpublished { fix_id: fix.fix_id }
        }
    }

    /// Run until `shutdown` fires. A failed or panicking cycle is logged and
    /// followed by the recovery interval; the loop itself never exits on error.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(
            source = %self.source.name(),
            interval = ?self.settings.interval,
            escalation = self.reasoning.is_some(),
            "Monitor started"
        );

        loop {
            let this = Arc::clone(&self);
            let cycle = tokio::spawn(async move { this.run_cycle().await });

            let pause = match cycle.await {
                Ok(Ok(report)) => {
                    debug!(?report, "Monitor cycle complete");
                    self.settings.interval
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Monitor cycle failed");
                    self.settings.recovery_interval
                }
                Err(e) => {
                    error!(error = %e, "Monitor cycle panicked");
                    self.settings.recovery_interval
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }
        info!("Monitor stopped");
    }
}

/// Concatenate the contents of affected components that name files in the tree.
async fn gather_code_context(repo_root: &Path, components: &[String], max_bytes: usize) -> String {
    let mut context = String::new();
    for component in components {
        let Ok(path) = resolve_in_tree(repo_root, Path::new(component.trim())) else {
            continue;
        };
        let Ok(content) = tokio::fs::read_to_string(&path).await else {
            continue;
        };
        let header = format!("=== {} ===\n", component.trim());
        let remaining = max_bytes.saturating_sub(context.len() + header.len());
        if remaining == 0 {
            break;
        }
        context.push_str(&header);
        context.push_str(truncate_bytes(&content, remaining));
        context.push('\n');
    }
    context
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
