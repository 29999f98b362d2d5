//! Version-control and delivery backend.

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

pub mod git;

pub use self::git::GitBackend;

#[derive(Debug, Error)]
pub enum VcsError {
    #[error("{command} exited with {status}: {stderr}")]
    Command {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("not usable as a repository: {0}")]
    Configuration(String),
}

/// Commit and delivery operations. Retrying a failed push is safe.
#[async_trait]
pub trait VcsBackend: Send + Sync {
    /// Stage `paths` and commit them. Returns an opaque commit reference.
    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<String, VcsError>;

    /// Push to the delivery remote; CI/CD takes it from there.
    async fn push(&self) -> Result<(), VcsError>;
}
