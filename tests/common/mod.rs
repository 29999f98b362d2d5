//! Test doubles for the logmedic service seams.

#![allow(dead_code)]

use async_trait::async_trait;
use logmedic::approval::ApprovalChannel;
use logmedic::reasoning::{
    FixSuggestion, ReasoningError, ReasoningGateway, RiskLevel, RootCauseAnalysis,
};
use logmedic::repair::{BackupStore, FixImplementor, FixRegistry, ProposedFix, ValidationOutcome, Validator};
use logmedic::sources::LogSource;
use logmedic::vcs::{VcsBackend, VcsError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

// ---------------------------------------------------------------------------
// Log source
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemorySource {
    lines: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: Mutex::new(lines),
        }
    }

    pub fn replace(&self, lines: Vec<String>) {
        *self.lines.lock().unwrap() = lines;
    }
}

#[async_trait]
impl LogSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_recent_lines(&self, max_lines: usize) -> Vec<String> {
        let lines = self.lines.lock().unwrap();
        let start = lines.len().saturating_sub(max_lines);
        lines[start..].to_vec()
    }
}

/// `n` copies of the same error with varying timestamps and ids.
pub fn repeated_error(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            format!(
                "2024-05-01 09:00:{:02},{:03} ERROR payment gateway timeout for order {}",
                i,
                i * 7,
                1000 + i
            )
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Reasoning
// ---------------------------------------------------------------------------

pub struct ScriptedReasoning {
    pub proposed_fix: String,
    pub fail_analysis: bool,
    pub analysis_calls: AtomicUsize,
    pub fix_calls: AtomicUsize,
}

impl ScriptedReasoning {
    pub fn proposing(proposed_fix: impl Into<String>) -> Self {
        Self {
            proposed_fix: proposed_fix.into(),
            fail_analysis: false,
            analysis_calls: AtomicUsize::new(0),
            fix_calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_analysis: true,
            ..Self::proposing("")
        }
    }
}

#[async_trait]
impl ReasoningGateway for ScriptedReasoning {
    async fn analyze_root_cause(
        &self,
        _description: &str,
        _sample_lines: &[String],
        _system_context: &str,
    ) -> Result<RootCauseAnalysis, ReasoningError> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_analysis {
            return Err(ReasoningError::Transport("connection refused".into()));
        }
        Ok(RootCauseAnalysis {
            root_cause: "Gateway timeout is too short\nThe upstream p99 is 8s.".into(),
            severity_assessment: "high".into(),
            affected_components: vec!["app/settings.py".into()],
        })
    }

    async fn generate_fix(
        &self,
        _root_cause: &str,
        _affected_components: &[String],
        _current_code: &str,
    ) -> Result<FixSuggestion, ReasoningError> {
        self.fix_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FixSuggestion {
            proposed_fix: self.proposed_fix.clone(),
            reasoning: "raise the timeout above the upstream p99".into(),
            risk_assessment: RiskLevel::Low,
        })
    }
}

/// A change-set description with one block for `path`.
pub fn change_block(path: &str, old: &str, new: &str) -> String {
    format!(
        "Raise the timeout.\n\nFile: {}\n<<<<<<< SEARCH\n{}\n=======\n{}\n>>>>>>> REPLACE\n",
        path, old, new
    )
}

// ---------------------------------------------------------------------------
// Approval channel
// ---------------------------------------------------------------------------

pub struct RecordingChannel {
    pub deliver: bool,
    pub published: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new(deliver: bool) -> Self {
        Self {
            deliver,
            published: Mutex::new(Vec::new()),
        }
    }

    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalChannel for RecordingChannel {
    async fn publish(&self, fix: &ProposedFix) -> bool {
        self.published.lock().unwrap().push(fix.fix_id.clone());
        self.deliver
    }
}

// ---------------------------------------------------------------------------
// Version control
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingVcs {
    pub fail_commit: bool,
    pub fail_push: bool,
    pub commits: Mutex<Vec<(Vec<PathBuf>, String)>>,
    pub pushes: AtomicUsize,
}

impl RecordingVcs {
    pub fn commits(&self) -> Vec<(Vec<PathBuf>, String)> {
        self.commits.lock().unwrap().clone()
    }
}

#[async_trait]
impl VcsBackend for RecordingVcs {
    async fn commit(&self, paths: &[PathBuf], message: &str) -> Result<String, VcsError> {
        if self.fail_commit {
            return Err(VcsError::Command {
                command: "git commit".into(),
                status: "exit status: 1".into(),
                stderr: "nothing to commit".into(),
            });
        }
        let mut commits = self.commits.lock().unwrap();
        commits.push((paths.to_vec(), message.to_string()));
        Ok(format!("{:040x}", commits.len()))
    }

    async fn push(&self) -> Result<(), VcsError> {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_push {
            return Err(VcsError::Command {
                command: "git push".into(),
                status: "exit status: 128".into(),
                stderr: "remote unreachable".into(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

type Hook = Box<dyn Fn() + Send + Sync>;

pub struct ScriptedValidator {
    pass: bool,
    hook: Option<Hook>,
    gate: Option<Gate>,
    pub runs: AtomicUsize,
}

/// Rendezvous: the validator signals `entered` and waits for `release`.
#[derive(Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl ScriptedValidator {
    pub fn passing() -> Self {
        Self {
            pass: true,
            hook: None,
            gate: None,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            pass: false,
            ..Self::passing()
        }
    }

    /// Run `hook` during validation, before the verdict.
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn with_gate(mut self, gate: Gate) -> Self {
        self.gate = Some(gate);
        self
    }
}

#[async_trait]
impl Validator for ScriptedValidator {
    async fn run_validation(&self) -> ValidationOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if let Some(hook) = &self.hook {
            hook();
        }
        if self.pass {
            ValidationOutcome::pass("compile check passed")
        } else {
            ValidationOutcome::fail("SyntaxError: invalid syntax (settings.py, line 3)")
        }
    }
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

pub struct Harness {
    pub tree: tempfile::TempDir,
    pub registry: Arc<FixRegistry>,
    pub vcs: Arc<RecordingVcs>,
    pub implementor: Arc<FixImplementor>,
}

impl Harness {
    pub fn new(validator: ScriptedValidator, vcs: RecordingVcs) -> Self {
        Self::build(|_| validator, vcs)
    }

    /// `make` receives the backup directory so a validator can tamper with it.
    pub fn build(make: impl FnOnce(&Path) -> ScriptedValidator, vcs: RecordingVcs) -> Self {
        let tree = tempfile::tempdir().unwrap();
        let backups = tree.path().join(".logmedic/backups");
        let registry = Arc::new(FixRegistry::new());
        let vcs = Arc::new(vcs);
        let validator = make(&backups);
        let implementor = FixImplementor::new(
            tree.path(),
            BackupStore::new(backups),
            Arc::new(validator),
            vcs.clone(),
            registry.clone(),
        );
        Self {
            tree,
            registry,
            vcs,
            implementor: Arc::new(implementor),
        }
    }

    pub fn root(&self) -> &Path {
        self.tree.path()
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.root().join(relative)).unwrap()
    }
}
