//! Search/replace change blocks embedded in a fix description.
//!
//! ```text
//! File: src/handlers/payment.py
//! <<<<<<< SEARCH
//! timeout = 5
//! =======
//! timeout = 30
//! >>>>>>> REPLACE
//! ```
//!
//! Text outside blocks is prose and ignored. A block applies to the most
//! recent `File:` line; blocks without one are skipped.

use super::FileChange;
use tracing::warn;

const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
const DIVIDER: &str = "=======";
const REPLACE_MARKER: &str = ">>>>>>> REPLACE";
const FILE_PREFIXES: &[&str] = &["File:", "FILE:", "Path:"];

enum Section {
    Prose,
    Search(Vec<String>),
    Replace(Vec<String>, Vec<String>),
}

fn file_header(line: &str) -> Option<String> {
    let trimmed = line.trim();
    FILE_PREFIXES.iter().find_map(|prefix| {
        trimmed
            .strip_prefix(prefix)
            .map(|rest| rest.trim().trim_matches('`').to_string())
            .filter(|p| !p.is_empty())
    })
}

/// Extract the concrete edits from a change description, in order.
pub fn parse_change_set(description: &str) -> Vec<FileChange> {
    let mut changes = Vec::new();
    let mut current_file: Option<String> = None;
    let mut section = Section::Prose;

    for line in description.lines() {
        section = match section {
            Section::Prose => {
                if line.trim_end() == SEARCH_MARKER {
                    Section::Search(Vec::new())
                } else {
                    if let Some(path) = file_header(line) {
                        current_file = Some(path);
                    }
                    Section::Prose
                }
            }
            Section::Search(mut old) => {
                if line.trim_end() == DIVIDER {
                    Section::Replace(old, Vec::new())
                } else {
                    old.push(line.to_string());
                    Section::Search(old)
                }
            }
            Section::Replace(old, mut new) => {
                if line.trim_end() == REPLACE_MARKER {
                    match &current_file {
                        Some(path) => changes.push(FileChange::new(
                            path.as_str(),
                            old.join("\n"),
                            new.join("\n"),
                        )),
                        None => warn!("Change block without a File: header skipped"),
                    }
                    Section::Prose
                } else {
                    new.push(line.to_string());
                    Section::Replace(old, new)
                }
            }
        };
    }

    if !matches!(section, Section::Prose) {
        warn!("Unterminated change block ignored");
    }
    changes
}

/// Render edits in the format [`parse_change_set`] reads.
pub fn render_change_set(changes: &[FileChange]) -> String {
    let mut out = String::new();
    for change in changes {
        out.push_str(&format!("File: {}\n", change.path.display()));
        out.push_str(SEARCH_MARKER);
        out.push('\n');
        out.push_str(&change.old_content);
        out.push('\n');
        out.push_str(DIVIDER);
        out.push('\n');
        out.push_str(&change.new_content);
        out.push('\n');
        out.push_str(REPLACE_MARKER);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parses_blocks_with_prose() {
        let text = "\
Increase the timeout and guard the null.

File: `src/client.py`
```python
<<<<<<< SEARCH
    timeout=5,
=======
    timeout=30,
>>>>>>> REPLACE
```

File: src/handler.py
<<<<<<< SEARCH
if user.email:
    send(user.email)
=======
if user is not None and user.email:
    send(user.email)
>>>>>>> REPLACE
";
        let changes = parse_change_set(text);
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].path, PathBuf::from("src/client.py"));
        assert_eq!(changes[0].old_content, "    timeout=5,");
        assert_eq!(changes[0].new_content, "    timeout=30,");
        assert_eq!(changes[1].path, PathBuf::from("src/handler.py"));
        assert_eq!(changes[1].old_content, "if user.email:\n    send(user.email)");
    }

    #[test]
    fn test_prose_only_has_no_changes() {
        assert!(parse_change_set("Restart the worker pool nightly.").is_empty());
    }

    #[test]
    fn test_block_without_file_is_skipped() {
        let text = "<<<<<<< SEARCH\na\n=======\nb\n>>>>>>> REPLACE\n";
        assert!(parse_change_set(text).is_empty());
    }

    #[test]
    fn test_unterminated_block_is_ignored() {
        let text = "File: a.py\n<<<<<<< SEARCH\na\n=======\nb\n";
        assert!(parse_change_set(text).is_empty());
    }

    #[test]
    fn test_render_then_parse() {
        let changes = vec![
            FileChange::new("a.py", "x = 1", "x = 2"),
            FileChange::new("b/c.py", "def f():\n    pass", "def f():\n    return 1"),
        ];
        assert_eq!(parse_change_set(&render_change_set(&changes)), changes);
    }
}
