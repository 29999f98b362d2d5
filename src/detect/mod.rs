//! Log anomaly detection: fingerprinting, threshold detectors, and cooldown dedup.

pub mod analyzer;
pub mod dedup;
pub mod normalize;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use self::analyzer::LogAnalyzer;
pub use self::dedup::AnomalyDeduplicator;
pub use self::normalize::normalize;

/// Maximum number of raw lines kept on an anomaly as evidence.
pub const MAX_SAMPLE_LINES: usize = 5;

/// Severity of a detected anomaly. Ordered, so `severity >= Severity::Medium` works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity is fully determined by category and occurrence count.
    pub fn classify(category: Category, occurrences: usize) -> Self {
        match category {
            Category::Error if occurrences >= analyzer::ERROR_HIGH_THRESHOLD => Severity::High,
            Category::Error => Severity::Medium,
            Category::Performance => Severity::Medium,
            Category::Pattern => Severity::Low,
        }
    }

    /// Whether anomalies of this severity are escalated to fix generation.
    pub fn is_escalated(&self) -> bool {
        *self >= Severity::Medium
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "LOW"),
            Severity::Medium => write!(f, "MEDIUM"),
            Severity::High => write!(f, "HIGH"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// What kind of recurring condition an anomaly describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Error,
    Performance,
    Pattern,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Error => write!(f, "ERROR"),
            Category::Performance => write!(f, "PERFORMANCE"),
            Category::Pattern => write!(f, "PATTERN"),
        }
    }
}

/// A recurring condition found in a batch of log lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub detected_at: DateTime<Utc>,
    pub severity: Severity,
    pub category: Category,
    pub description: String,
    /// Up to [`MAX_SAMPLE_LINES`] raw lines, in input order.
    pub sample_lines: Vec<String>,
    pub occurrence_count: usize,
    /// Normalized pattern; identity key within a category.
    pub fingerprint: String,
}

impl Anomaly {
    /// Build an anomaly whose severity is derived from category and count.
    pub fn new(
        category: Category,
        fingerprint: impl Into<String>,
        description: impl Into<String>,
        occurrences: &[&str],
        detected_at: DateTime<Utc>,
    ) -> Self {
        Self {
            detected_at,
            severity: Severity::classify(category, occurrences.len()),
            category,
            description: description.into(),
            sample_lines: occurrences
                .iter()
                .take(MAX_SAMPLE_LINES)
                .map(|l| l.to_string())
                .collect(),
            occurrence_count: occurrences.len(),
            fingerprint: fingerprint.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity_thresholds() {
        let sev: Vec<Severity> = (3..=6)
            .map(|n| Severity::classify(Category::Error, n))
            .collect();
        assert_eq!(
            sev,
            vec![Severity::Medium, Severity::Medium, Severity::High, Severity::High]
        );
    }

    #[test]
    fn test_escalation_floor_is_medium() {
        assert!(!Severity::Low.is_escalated());
        assert!(Severity::Medium.is_escalated());
        assert!(Severity::Critical.is_escalated());
    }

    #[test]
    fn test_samples_are_capped() {
        let lines = vec!["ERROR x"; 8];
        let a = Anomaly::new(Category::Error, "ERROR x", "x", &lines, Utc::now());
        assert_eq!(a.occurrence_count, 8);
        assert_eq!(a.sample_lines.len(), MAX_SAMPLE_LINES);
        assert_eq!(a.severity, Severity::High);
    }
}
