//! Post-apply validation of the working tree.

use super::FixError;
use crate::config::ValidationStep;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Maximum captured output kept in a failure message.
const MAX_OUTPUT_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    pub message: String,
}

impl ValidationOutcome {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

/// Checks that the mutated tree still builds and loads.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn run_validation(&self) -> ValidationOutcome;
}

/// Runs configured commands in the repository root, stopping at the first failure.
///
/// Typical steps are a whole-tree compile check followed by import smoke
/// tests of a few entry modules.
pub struct CommandValidator {
    repo_root: PathBuf,
    steps: Vec<ValidationStep>,
    timeout: Duration,
}

impl CommandValidator {
    pub fn new(
        repo_root: impl Into<PathBuf>,
        steps: Vec<ValidationStep>,
        timeout: Duration,
    ) -> Result<Self, FixError> {
        if steps.is_empty() {
            return Err(FixError::Configuration(
                "no validation steps configured".to_string(),
            ));
        }
        Ok(Self {
            repo_root: repo_root.into(),
            steps,
            timeout,
        })
    }

    async fn run_step(&self, step: &ValidationStep) -> Result<(), String> {
        let output = tokio::process::Command::new(&step.program)
            .args(&step.args)
            .current_dir(&self.repo_root)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) if out.status.success() => Ok(()),
            Ok(Ok(out)) => {
                let mut captured = String::from_utf8_lossy(&out.stderr).into_owned();
                captured.push_str(&String::from_utf8_lossy(&out.stdout));
                Err(format!(
                    "step '{}' exited with {}: {}",
                    step.name,
                    out.status,
                    tail_chars(captured.trim(), MAX_OUTPUT_CHARS)
                ))
            }
            Ok(Err(e)) => Err(format!("step '{}' could not start: {}", step.name, e)),
            Err(_) => Err(format!(
                "step '{}' timed out after {:?}",
                step.name, self.timeout
            )),
        }
    }
}

#[async_trait]
impl Validator for CommandValidator {
    async fn run_validation(&self) -> ValidationOutcome {
        for step in &self.steps {
            if let Err(message) = self.run_step(step).await {
                warn!(step = %step.name, %message, "Validation step failed");
                return ValidationOutcome::fail(message);
            }
            info!(step = %step.name, "Validation step passed");
        }
        ValidationOutcome::pass(format!("{} validation step(s) passed", self.steps.len()))
    }
}

fn tail_chars(s: &str, max: usize) -> &str {
    let count = s.chars().count();
    if count <= max {
        return s;
    }
    match s.char_indices().nth(count - max) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}
