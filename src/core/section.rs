//! Section and index representations for a parsed corpus.
//!
//! A section is a Markdown subtree rooted at one ATX heading, up to but not
//! including the next heading. Sections are immutable once parsed; their
//! lifecycle ends when the owning index is invalidated.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A single heading-rooted section of a corpus document.
///
/// For a given file, sections cover disjoint line ranges in source order.
///
/// # Examples
///
/// ```
/// use docrag::core::Section;
///
/// let section = Section {
///     file: "R1-ARCHITECTURE.md".to_string(),
///     release: "R1".to_string(),
///     doc_type: "ARCHITECTURE".to_string(),
///     heading: "Overview".to_string(),
///     content: "The system has three planes.".to_string(),
///     line_start: 1,
///     line_end: 3,
/// };
/// assert_eq!(section.release, "R1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Path relative to the corpus root, forward slashes.
    pub file: String,
    /// Release token from the filename prefix (`R` + digits).
    pub release: String,
    /// Uppercase document type token from the filename.
    #[serde(rename = "docType")]
    pub doc_type: String,
    /// Heading text with the `#` markers stripped.
    pub heading: String,
    /// Trimmed body text between this heading and the next.
    pub content: String,
    /// 1-based line of the heading.
    #[serde(rename = "lineStart")]
    pub line_start: usize,
    /// 1-based last line of the section body.
    #[serde(rename = "lineEnd")]
    pub line_end: usize,
}

impl Section {
    /// Returns `true` if the needle appears case-insensitively in the
    /// heading or the content.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.heading.to_lowercase().contains(&needle)
            || self.content.to_lowercase().contains(&needle)
    }
}

/// A parsed corpus snapshot with its content fingerprint.
///
/// The fingerprint is a pure function of the sorted set of
/// (absolute path, modification time) pairs plus the root path; any file
/// add, remove, rename, or modification under the root changes it.
#[derive(Debug, Clone)]
pub struct DocIndex {
    /// Sections in discovery order.
    pub sections: Vec<Section>,
    /// Hex SHA-256 digest of the corpus file set.
    pub fingerprint: String,
    /// Monotonic instant at which this index was built.
    pub built_at: Instant,
    /// Number of files that contributed to the fingerprint.
    pub file_count: usize,
}

impl DocIndex {
    /// Returns the distinct releases present in the index, sorted.
    #[must_use]
    pub fn releases(&self) -> Vec<String> {
        let mut releases: Vec<String> =
            self.sections.iter().map(|s| s.release.clone()).collect();
        releases.sort();
        releases.dedup();
        releases
    }

    /// Returns `true` if the index holds no sections.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(release: &str, heading: &str, content: &str) -> Section {
        Section {
            file: format!("{release}-NOTES.md"),
            release: release.to_string(),
            doc_type: "NOTES".to_string(),
            heading: heading.to_string(),
            content: content.to_string(),
            line_start: 1,
            line_end: 2,
        }
    }

    #[test]
    fn test_mentions_case_insensitive() {
        let s = section("R1", "Auth Overview", "token exchange flow");
        assert!(s.mentions("AUTH"));
        assert!(s.mentions("Token Exchange"));
        assert!(!s.mentions("billing"));
    }

    #[test]
    fn test_releases_sorted_and_deduped() {
        let index = DocIndex {
            sections: vec![
                section("R2", "A", "x"),
                section("R1", "B", "y"),
                section("R2", "C", "z"),
            ],
            fingerprint: "00".to_string(),
            built_at: Instant::now(),
            file_count: 2,
        };
        assert_eq!(index.releases(), vec!["R1", "R2"]);
        assert!(!index.is_empty());
    }

    #[test]
    fn test_section_serde_field_names() {
        let s = section("R1", "H", "c");
        let json = serde_json::to_value(&s).expect("serialize");
        assert!(json.get("docType").is_some());
        assert!(json.get("lineStart").is_some());
        assert!(json.get("lineEnd").is_some());
    }
}
