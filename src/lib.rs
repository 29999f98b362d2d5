//! logmedic -- autonomous log-anomaly detection with a guarded self-healing pipeline.
//!
//! This crate watches operational logs, turns recurring problems into
//! anomalies, asks a reasoning service for a remediation, and applies approved
//! fixes to a working tree under backup/validate/commit/deploy with automatic
//! rollback.

pub mod api;
pub mod approval;
pub mod config;
pub mod detect;
pub mod monitor;
pub mod reasoning;
pub mod repair;
pub mod sources;
pub mod vcs;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::approval::{ApprovalChannel, ApprovalHandler, LogApprovalChannel, WebhookApprovalChannel};
use crate::config::{LogmedicConfig, SourceKind};
use crate::monitor::{AnomalyHistory, MonitorSettings, ProactiveMonitor};
use crate::reasoning::{HttpReasoningGateway, ReasoningGateway, TimeoutGateway};
use crate::repair::{BackupStore, CommandValidator, FixError, FixImplementor, FixRegistry};
use crate::sources::{CommandLogSource, FileLogSource, LogSource};
use crate::vcs::GitBackend;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Every long-lived service, constructed once at startup and shared by handle.
pub struct Services {
    pub registry: Arc<FixRegistry>,
    pub history: Arc<AnomalyHistory>,
    pub approval: Arc<ApprovalHandler>,
    pub monitor: Arc<ProactiveMonitor>,
    pub repair_enabled: bool,
}

impl Services {
    pub async fn build(config: &LogmedicConfig) -> Result<Self> {
        let source = build_source(config)?;
        let registry = Arc::new(FixRegistry::new());
        let history = Arc::new(AnomalyHistory::new(config.monitor.history_limit));

        let channel: Arc<dyn ApprovalChannel> = match &config.approval.webhook_url {
            Some(url) => Arc::new(WebhookApprovalChannel::new(url.clone(), WEBHOOK_TIMEOUT)?),
            None => Arc::new(LogApprovalChannel),
        };

        let implementor = match build_implementor(config, registry.clone()).await {
            Ok(imp) => Some(Arc::new(imp)),
            Err(e) => {
                warn!(error = %e, "Fix implementation disabled; approvals will be refused");
                None
            }
        };
        let repair_enabled = implementor.is_some();
        let approval = Arc::new(ApprovalHandler::new(registry.clone(), implementor));

        let mut monitor = ProactiveMonitor::new(
            source,
            channel,
            registry.clone(),
            history.clone(),
            MonitorSettings::from_config(config),
        );
        match HttpReasoningGateway::from_config(&config.reasoning) {
            Ok(gateway) => {
                let bounded: Arc<dyn ReasoningGateway> = Arc::new(TimeoutGateway::new(
                    Arc::new(gateway),
                    Duration::from_secs(config.reasoning.timeout_secs),
                ));
                monitor = monitor.with_reasoning(bounded);
            }
            Err(e) => warn!(error = %e, "Escalation disabled; anomalies will be surfaced only"),
        }

        Ok(Self {
            registry,
            history,
            approval,
            monitor: Arc::new(monitor),
            repair_enabled,
        })
    }

    pub fn app_state(&self) -> api::state::AppState {
        api::state::AppState {
            registry: self.registry.clone(),
            history: self.history.clone(),
            approval: self.approval.clone(),
            repair_enabled: self.repair_enabled,
        }
    }
}

fn build_source(config: &LogmedicConfig) -> Result<Arc<dyn LogSource>> {
    let src = &config.source;
    let source: Arc<dyn LogSource> = match src.kind {
        SourceKind::File => Arc::new(FileLogSource::new(src.path.clone())),
        SourceKind::Command => Arc::new(
            CommandLogSource::from_argv(
                &src.command,
                Duration::from_secs(src.command_timeout_secs),
            )
            .context("source.kind = \"command\" requires a non-empty source.command")?,
        ),
    };
    Ok(source)
}

/// Fails closed: missing validation steps or a tree that is not a git
/// repository disable implementation entirely.
pub async fn build_implementor(
    config: &LogmedicConfig,
    registry: Arc<FixRegistry>,
) -> Result<FixImplementor, FixError> {
    let repair = &config.repair;
    let validator = CommandValidator::new(
        repair.repo_root.clone(),
        repair.validation.clone(),
        Duration::from_secs(repair.validation_timeout_secs),
    )?;
    let vcs = GitBackend::open(
        repair.repo_root.clone(),
        repair.remote.clone(),
        repair.branch.clone(),
    )
    .await
    .map_err(|e| FixError::Configuration(e.to_string()))?;

    Ok(FixImplementor::new(
        repair.repo_root.clone(),
        BackupStore::new(repair.backup_dir.clone()),
        Arc::new(validator),
        Arc::new(vcs),
        registry,
    )
    .with_auto_deploy(repair.auto_deploy))
}

/// Start the logmedic daemon: monitor loop plus approval API.
pub async fn serve(config: LogmedicConfig) -> Result<()> {
    let services = Services::build(&config).await?;
    let shutdown = CancellationToken::new();

    let monitor = tokio::spawn(services.monitor.clone().run(shutdown.clone()));

    let addr: std::net::SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid api.bind address: {}", config.api.bind))?;
    let app = api::router(services.app_state());

    info!(%addr, repair_enabled = services.repair_enabled, "logmedic listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                signal.cancelled().await;
            }
            info!("Shutdown requested");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    monitor.await?;
    Ok(())
}
