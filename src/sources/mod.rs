//! Log sources the monitor polls for recent lines.

use async_trait::async_trait;

pub mod command;
pub mod file;

pub use self::command::CommandLogSource;
pub use self::file::FileLogSource;

/// Anything that can hand back its most recent log lines.
///
/// Implementations never fail toward the caller: errors are logged and an
/// empty batch is returned so the monitor loop keeps running.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Short name for log fields.
    fn name(&self) -> &str;

    async fn fetch_recent_lines(&self, max_lines: usize) -> Vec<String>;
}

/// Keep the last `max_lines` lines of `text`.
pub(crate) fn tail_lines(text: &str, max_lines: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].iter().map(|l| l.to_string()).collect()
}
