//! Log line fingerprinting.
//!
//! Variable tokens are stripped in a fixed order so that two lines describing
//! the same fault with different timestamps or ids collapse to one key.

use regex::Regex;
use std::sync::LazyLock;

/// Placeholder for canonical 8-4-4-4-12 hex identifiers.
pub const UUID_PLACEHOLDER: &str = "<uuid>";
/// Placeholder for any remaining run of digits.
pub const NUMBER_PLACEHOLDER: &str = "<n>";

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}[.,]\d{3}\d*(?:Z|[+-]\d{2}:?\d{2})?",
    )
    .unwrap()
});

static EVENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{10,}-[A-Z][A-Z0-9_]*").unwrap());

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
        .unwrap()
});

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").unwrap());

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Reduce a raw log line to its stable fingerprint. Total over any input.
pub fn normalize(line: &str) -> String {
    let s = TIMESTAMP.replace_all(line, "");
    let s = EVENT_ID.replace_all(&s, "");
    let s = UUID.replace_all(&s, UUID_PLACEHOLDER);
    let s = NUMBER.replace_all(&s, NUMBER_PLACEHOLDER);
    WHITESPACE.replace_all(s.trim(), " ").into_owned()
}
