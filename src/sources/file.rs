use super::{tail_lines, LogSource};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::warn;

/// Reads the tail of a log file on every poll.
pub struct FileLogSource {
    path: PathBuf,
    name: String,
}

impl FileLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self { path, name }
    }
}

#[async_trait]
impl LogSource for FileLogSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_recent_lines(&self, max_lines: usize) -> Vec<String> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => tail_lines(&String::from_utf8_lossy(&bytes), max_lines),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read log file");
                Vec::new()
            }
        }
    }
}
