use super::{tail_lines, LogSource};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

/// Runs a command (e.g. `journalctl -u app -n 200 --no-pager`) and tails its stdout.
pub struct CommandLogSource {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    name: String,
}

impl CommandLogSource {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        let program = program.into();
        let name = format!("command:{}", program);
        Self {
            program,
            args,
            timeout,
            name,
        }
    }

    /// Build from an argv list; `None` when the list is empty.
    pub fn from_argv(argv: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec(), timeout))
    }
}

#[async_trait]
impl LogSource for CommandLogSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_recent_lines(&self, max_lines: usize) -> Vec<String> {
        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(out)) if out.status.success() => {
                tail_lines(&String::from_utf8_lossy(&out.stdout), max_lines)
            }
            Ok(Ok(out)) => {
                warn!(
                    source = %self.name,
                    status = %out.status,
                    stderr = %String::from_utf8_lossy(&out.stderr).trim(),
                    "Log command exited with failure"
                );
                Vec::new()
            }
            Ok(Err(e)) => {
                warn!(source = %self.name, error = %e, "Failed to spawn log command");
                Vec::new()
            }
            Err(_) => {
                warn!(source = %self.name, timeout = ?self.timeout, "Log command timed out");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tails_stdout() {
        let argv: Vec<String> = ["sh", "-c", "printf 'a\\nb\\nc\\n'"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let source = CommandLogSource::from_argv(&argv, Duration::from_secs(5)).unwrap();
        assert_eq!(source.fetch_recent_lines(2).await, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_failing_command_yields_empty() {
        let source = CommandLogSource::new(
            "sh",
            vec!["-c".to_string(), "exit 3".to_string()],
            Duration::from_secs(5),
        );
        assert!(source.fetch_recent_lines(10).await.is_empty());
    }

    #[test]
    fn test_empty_argv() {
        assert!(CommandLogSource::from_argv(&[], Duration::from_secs(1)).is_none());
    }
}
