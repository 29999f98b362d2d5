//! Cooldown cache that keeps an active anomaly from alerting twice.

use super::Anomaly;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

/// Default window during which a repeated anomaly is suppressed.
pub const DEFAULT_COOLDOWN_SECS: i64 = 3600;

/// Number of fingerprint characters that participate in the dedup key.
const KEY_FINGERPRINT_CHARS: usize = 50;

/// Time-windowed map of `category:fingerprint-prefix` to the last admitted anomaly.
///
/// A suppressed repeat does not refresh the stored entry, so the cooldown is
/// measured from the last *admitted* occurrence, not the last seen one.
#[derive(Debug)]
pub struct AnomalyDeduplicator {
    cooldown: Duration,
    seen: HashMap<String, Anomaly>,
}

impl Default for AnomalyDeduplicator {
    fn default() -> Self {
        Self::new()
    }
}

impl AnomalyDeduplicator {
    pub fn new() -> Self {
        Self::with_cooldown(Duration::seconds(DEFAULT_COOLDOWN_SECS))
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            cooldown,
            seen: HashMap::new(),
        }
    }

    pub fn key(anomaly: &Anomaly) -> String {
        let prefix: String = anomaly
            .fingerprint
            .chars()
            .take(KEY_FINGERPRINT_CHARS)
            .collect();
        format!("{}:{}", anomaly.category, prefix)
    }

    /// Returns true when the anomaly is new or its previous admission has aged
    /// past the cooldown. The anomaly's own `detected_at` is the clock.
    pub fn admit(&mut self, anomaly: &Anomaly) -> bool {
        let key = Self::key(anomaly);
        if let Some(previous) = self.seen.get(&key) {
            if anomaly.detected_at - previous.detected_at <= self.cooldown {
                return false;
            }
        }
        self.seen.insert(key, anomaly.clone());
        true
    }

    /// Forget entries whose cooldown has expired by `now`.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cooldown = self.cooldown;
        self.seen.retain(|_, a| now - a.detected_at <= cooldown);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
