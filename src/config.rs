//! TOML configuration for the logmedic daemon.
//!
//! Layered lookup: an explicit `--config` path, then the `LOGMEDIC_CONFIG`
//! environment variable, then `/etc/logmedic/logmedic.toml`, then compiled-in
//! defaults. Every section is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "LOGMEDIC_CONFIG";

const SYSTEM_CONFIG_PATH: &str = "/etc/logmedic/logmedic.toml";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogmedicConfig {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub reasoning: ReasoningConfig,
    #[serde(default)]
    pub approval: ApprovalConfig,
    #[serde(default)]
    pub repair: RepairConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl LogmedicConfig {
    /// Load configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Resolve the effective configuration. An explicitly requested file must
    /// load; the implicit locations fall through to defaults on failure.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        Ok(Self::load_or_default())
    }

    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "LOGMEDIC_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("No config file found, using compiled-in defaults");
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Monitor loop
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between detection cycles.
    pub interval_secs: u64,
    /// Seconds to back off after a failed cycle.
    pub recovery_secs: u64,
    /// How many recent lines to pull per cycle.
    pub max_lines: usize,
    /// How many surfaced anomalies to keep for the API.
    pub history_limit: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            recovery_secs: 60,
            max_lines: 200,
            history_limit: 100,
        }
    }
}

// ---------------------------------------------------------------------------
// Log source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    File,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    /// Log file to tail when `kind = "file"`.
    pub path: PathBuf,
    /// argv to run when `kind = "command"`, e.g. `["journalctl", "-u", "app", "-n", "200"]`.
    pub command: Vec<String>,
    pub command_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::File,
            path: PathBuf::from("/var/log/app/app.log"),
            command: Vec::new(),
            command_timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// Reasoning service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// HTTP endpoint of the reasoning service. Unset disables escalation.
    pub endpoint: Option<String>,
    /// Name of the environment variable holding a bearer token.
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_secs: u64,
    /// Free-text description of the monitored system, sent with every analysis.
    pub system_context: String,
    /// Cap on source text sent as fix context.
    pub max_context_bytes: usize,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key_env: None,
            model: None,
            timeout_secs: 60,
            system_context: String::new(),
            max_context_bytes: 16 * 1024,
        }
    }
}

// ---------------------------------------------------------------------------
// Approval channel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Where proposals are POSTed. Unset means proposals are only logged.
    pub webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Repair (working tree, validation, delivery)
// ---------------------------------------------------------------------------

/// One validation command, run in the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Working tree that fixes are applied to.
    pub repo_root: PathBuf,
    /// One subdirectory per fix id is created here.
    pub backup_dir: PathBuf,
    pub remote: String,
    pub branch: Option<String>,
    /// Ordered post-apply checks. Empty disables implementation.
    pub validation: Vec<ValidationStep>,
    pub validation_timeout_secs: u64,
    /// Push after a successful commit.
    pub auto_deploy: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            backup_dir: PathBuf::from("data/backups"),
            remote: "origin".to_string(),
            branch: None,
            validation: Vec::new(),
            validation_timeout_secs: 300,
            auto_deploy: true,
        }
    }
}

// ---------------------------------------------------------------------------
// API / logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = LogmedicConfig::default();
        assert_eq!(cfg.monitor.interval_secs, 300);
        assert_eq!(cfg.monitor.recovery_secs, 60);
        assert_eq!(cfg.monitor.max_lines, 200);
        assert_eq!(cfg.reasoning.timeout_secs, 60);
        assert!(cfg.reasoning.endpoint.is_none());
        assert!(cfg.repair.validation.is_empty());
        assert!(cfg.repair.auto_deploy);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg: LogmedicConfig = toml::from_str(
            r#"
            [monitor]
            interval_secs = 30

            [source]
            kind = "command"
            command = ["journalctl", "-u", "app", "-n", "200", "--no-pager"]

            [[repair.validation]]
            name = "compile"
            program = "python3"
            args = ["-m", "compileall", "-q", "."]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.monitor.interval_secs, 30);
        assert_eq!(cfg.monitor.max_lines, 200);
        assert_eq!(cfg.source.kind, SourceKind::Command);
        assert_eq!(cfg.source.command[0], "journalctl");
        assert_eq!(cfg.repair.validation.len(), 1);
        assert_eq!(cfg.repair.remote, "origin");
        assert_eq!(cfg.api.bind, "127.0.0.1:8090");
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        assert!(LogmedicConfig::resolve(Some(Path::new("/nonexistent/logmedic.toml"))).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logmedic.toml");
        std::fs::write(&path, "[api]\nbind = \"0.0.0.0:9000\"\n").unwrap();
        let cfg = LogmedicConfig::load(&path).unwrap();
        assert_eq!(cfg.api.bind, "0.0.0.0:9000");
    }
}
