//! Line-pattern fact extraction from Markdown and unified diffs.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::Fact;

/// Declarative line: a subject, one of `:` `-` `=` as separator, then a
/// non-empty object. The subject is 1-200 characters, does not start with
/// `:`, `#`, `=`, or `-`, and contains none of the separators.
static FACT_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([^:#=\-\s][^:=\-]{0,199}?)\s*[:=\-]\s*(\S.*)$")
        .unwrap_or_else(|e| unreachable!("fact regex: {e}"))
});

/// Extracts facts from Markdown content.
///
/// Empty lines, heading lines, and HTML comments are skipped. The
/// predicate is always the literal `"is"`; `line_start == line_end ==
/// line_offset + line index`.
#[must_use]
pub fn extract_from_markdown(
    content: &str,
    file: &str,
    heading: Option<&str>,
    line_offset: usize,
) -> Vec<Fact> {
    let mut facts = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("<!--") {
            continue;
        }
        if let Some(captures) = FACT_LINE_RE.captures(line) {
            let subject = captures[1].trim();
            let object = captures[2].trim();
            if subject.is_empty() || object.is_empty() {
                continue;
            }
            let line_number = line_offset + i;
            facts.push(
                Fact::new(subject, "is", object, file).with_location(
                    heading.map(str::to_string),
                    line_number,
                    line_number,
                ),
            );
        }
    }
    facts
}

/// Extracts facts from a unified-diff payload.
///
/// Added (`+`) and context (` `) lines lose their prefix character before
/// extraction; deletion (`-`) lines are fed through unchanged, which the
/// line pattern then rejects.
#[must_use]
pub fn extract_from_diff(diff: &str, file: &str) -> Vec<Fact> {
    let stripped: Vec<&str> = diff
        .lines()
        .map(|line| {
            if line.starts_with('+') || line.starts_with(' ') {
                &line[1..]
            } else {
                line
            }
        })
        .collect();
    extract_from_markdown(&stripped.join("\n"), file, None, 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_colon_dash_equals() {
        let content = "Database: PostgreSQL\nTimeout - 30s\nRetries = 5\n";
        let facts = extract_from_markdown(content, "R1-CONFIG.md", Some("Config"), 10);
        assert_eq!(facts.len(), 3);
        assert_eq!(facts[0].subject, "Database");
        assert_eq!(facts[0].predicate, "is");
        assert_eq!(facts[0].object, "PostgreSQL");
        assert_eq!(facts[0].line_start, Some(10));
        assert_eq!(facts[1].subject, "Timeout");
        assert_eq!(facts[1].object, "30s");
        assert_eq!(facts[1].line_start, Some(11));
        assert_eq!(facts[2].object, "5");
        assert_eq!(facts[2].heading.as_deref(), Some("Config"));
    }

    #[test]
    fn test_skips_headings_comments_blanks() {
        let content = "# Title: not a fact\n\n<!-- note: hidden -->\nKey: value\n";
        let facts = extract_from_markdown(content, "f.md", None, 1);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].subject, "Key");
        assert_eq!(facts[0].line_start, Some(4));
    }

    #[test]
    fn test_subject_stops_at_first_separator() {
        let facts = extract_from_markdown("endpoint: /api/v1: active\n", "f.md", None, 1);
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].subject, "endpoint");
        assert_eq!(facts[0].object, "/api/v1: active");
    }

    #[test]
    fn test_rejects_separator_leading_lines() {
        let content = "- bullet item\n= divider\n: orphan\n";
        assert!(extract_from_markdown(content, "f.md", None, 1).is_empty());
    }

    #[test]
    fn test_rejects_missing_object() {
        assert!(extract_from_markdown("Key:\n", "f.md", None, 1).is_empty());
        assert!(extract_from_markdown("Key:   \n", "f.md", None, 1).is_empty());
    }

    #[test]
    fn test_subject_length_cap() {
        let long_subject = "s".repeat(250);
        let content = format!("{long_subject}: value\n");
        assert!(extract_from_markdown(&content, "f.md", None, 1).is_empty());
    }

    #[test]
    fn test_diff_strips_added_and_context_prefixes() {
        let diff = "+Database: MySQL\n Region: us-east-1\n-Database: PostgreSQL\n";
        let facts = extract_from_diff(diff, "R2-CONFIG.md");
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].object, "MySQL");
        assert_eq!(facts[1].subject, "Region");
    }

    #[test]
    fn test_diff_duplicate_lines_both_extracted() {
        // In-payload duplicates are allowed; the index dedupes later.
        let diff = "+A: B\n A: B\n";
        let facts = extract_from_diff(diff, "f.md");
        assert_eq!(facts.len(), 2);
        assert_eq!(facts[0].hash, facts[1].hash);
    }

    #[test]
    fn test_diff_deletion_lines_never_extracted() {
        let diff = "-Database: PostgreSQL\n-Timeout = 30\n";
        assert!(extract_from_diff(diff, "f.md").is_empty());
    }
}
