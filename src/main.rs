use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use logmedic::config::{LoggingConfig, LogmedicConfig};
use logmedic::detect::{normalize, LogAnalyzer};
use logmedic::repair::BackupStore;
use logmedic::sources::{FileLogSource, LogSource};

#[derive(Parser)]
#[command(
    name = "logmedic",
    about = "Autonomous log-anomaly detection with guarded self-healing fixes",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file (overrides LOGMEDIC_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (monitor loop + approval API)
    Serve {
        /// Bind address (overrides api.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the detectors once over a log file
    Analyze {
        /// Log file to read
        #[arg(long)]
        file: PathBuf,

        /// Only analyze the last N lines
        #[arg(long, default_value = "200")]
        max_lines: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Print the fingerprint of a single log line
    Normalize {
        /// Raw log line
        line: String,
    },

    /// Restore every file backed up for a fix
    Rollback {
        /// Fix identifier, e.g. fix_20250101_120000_000
        #[arg(long)]
        fix_id: String,
    },

    /// Print the effective configuration
    CheckConfig,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = LogmedicConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.api.bind = bind;
            }
            tracing::info!(bind = %config.api.bind, "Starting logmedic daemon");
            logmedic::serve(config).await?;
        }
        Commands::Analyze {
            file,
            max_lines,
            json,
        } => {
            if !file.exists() {
                anyhow::bail!("log file not found: {}", file.display());
            }
            let lines = FileLogSource::new(file.clone())
                .fetch_recent_lines(max_lines)
                .await;
            let anomalies = LogAnalyzer::new().analyze(&lines);

            if json {
                println!("{}", serde_json::to_string_pretty(&anomalies)?);
            } else if anomalies.is_empty() {
                println!("No anomalies in {} lines of {}", lines.len(), file.display());
            } else {
                println!("{:<10} | {:<12} | {:>5} | Description", "Severity", "Category", "Count");
                println!("{:-<10}-|-{:-<12}-|-{:->5}-|-{:-<40}", "", "", "", "");
                for a in &anomalies {
                    println!(
                        "{:<10} | {:<12} | {:>5} | {}",
                        a.severity.to_string(),
                        a.category.to_string(),
                        a.occurrence_count,
                        a.description
                    );
                }
            }
        }
        Commands::Normalize { line } => {
            println!("{}", normalize(&line));
        }
        Commands::Rollback { fix_id } => {
            let store = BackupStore::new(config.repair.backup_dir.clone());
            let restored = tokio::task::spawn_blocking(move || store.rollback(&fix_id))
                .await
                .context("rollback task panicked")??;
            println!("Restored {} file(s).", restored);
        }
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
