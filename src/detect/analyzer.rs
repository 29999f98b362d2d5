//! Threshold detectors over a batch of raw log lines.

use super::{normalize, Anomaly, Category};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tracing::debug;

/// Minimum group size for an error fingerprint to become an anomaly.
pub const ERROR_MIN_OCCURRENCES: usize = 3;
/// Group size at which an error anomaly is HIGH instead of MEDIUM.
pub const ERROR_HIGH_THRESHOLD: usize = 5;
/// Minimum slow/truncated lines for a performance anomaly.
pub const PERFORMANCE_MIN_OCCURRENCES: usize = 2;
/// Minimum duplicate-event lines for a pattern anomaly.
pub const DUPLICATE_MIN_OCCURRENCES: usize = 10;

const ERROR_MARKERS: &[&str] = &["ERROR", "CRITICAL", "❌"];

// Matched against the lowercased line.
const PERFORMANCE_MARKERS: &[&str] = &[
    "truncated",
    "truncating",
    "slow query",
    "slow request",
    "slow response",
    "took too long",
];

const DUPLICATE_MARKERS: &[&str] = &["duplicate event", "already processed"];

const PERFORMANCE_FINGERPRINT: &str = "slow-or-truncated-operation";
const DUPLICATE_FINGERPRINT: &str = "duplicate-event";

/// Stateless analyzer running the three detectors over the same input.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAnalyzer;

impl LogAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Run every detector and concatenate their findings.
    pub fn analyze<S: AsRef<str>>(&self, lines: &[S]) -> Vec<Anomaly> {
        self.analyze_at(lines, Utc::now())
    }

    /// Same as [`LogAnalyzer::analyze`] with an explicit detection time.
    pub fn analyze_at<S: AsRef<str>>(&self, lines: &[S], now: DateTime<Utc>) -> Vec<Anomaly> {
        let lines: Vec<&str> = lines.iter().map(|l| l.as_ref()).collect();

        let mut anomalies = detect_error_patterns(&lines, now);
        anomalies.extend(detect_performance(&lines, now));
        anomalies.extend(detect_unusual_patterns(&lines, now));

        debug!(
            lines = lines.len(),
            anomalies = anomalies.len(),
            "Log batch analyzed"
        );
        anomalies
    }
}

fn is_error_line(line: &str) -> bool {
    ERROR_MARKERS.iter().any(|m| line.contains(m))
}

fn contains_any_lowercase(line: &str, markers: &[&str]) -> bool {
    let lower = line.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

/// Group error-level lines by fingerprint; groups keep first-seen order.
fn detect_error_patterns(lines: &[&str], now: DateTime<Utc>) -> Vec<Anomaly> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&str>> = HashMap::new();

    for line in lines.iter().copied().filter(|l| is_error_line(l)) {
        let fingerprint = normalize(line);
        let group = groups.entry(fingerprint.clone()).or_insert_with(|| {
            order.push(fingerprint);
            Vec::new()
        });
        group.push(line);
    }

    order
        .into_iter()
        .filter_map(|fingerprint| {
            let members = groups.remove(&fingerprint)?;
            if members.len() < ERROR_MIN_OCCURRENCES {
                return None;
            }
            let description = format!(
                "Recurring error ({} occurrences): {}",
                members.len(),
                truncate_chars(&fingerprint, 200)
            );
            Some(Anomaly::new(
                Category::Error,
                fingerprint,
                description,
                &members,
                now,
            ))
        })
        .collect()
}

fn detect_performance(lines: &[&str], now: DateTime<Utc>) -> Option<Anomaly> {
    let hits: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| contains_any_lowercase(l, PERFORMANCE_MARKERS))
        .collect();
    if hits.len() < PERFORMANCE_MIN_OCCURRENCES {
        return None;
    }
    let description = format!("{} slow or truncated operations", hits.len());
    Some(Anomaly::new(
        Category::Performance,
        PERFORMANCE_FINGERPRINT,
        description,
        &hits,
        now,
    ))
}

fn detect_unusual_patterns(lines: &[&str], now: DateTime<Utc>) -> Option<Anomaly> {
    let hits: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| contains_any_lowercase(l, DUPLICATE_MARKERS))
        .collect();
    if hits.len() < DUPLICATE_MIN_OCCURRENCES {
        return None;
    }
    let description = format!("{} duplicate event deliveries", hits.len());
    Some(Anomaly::new(
        Category::Pattern,
        DUPLICATE_FINGERPRINT,
        description,
        &hits,
        now,
    ))
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
