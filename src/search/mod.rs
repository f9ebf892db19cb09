//! Lexical section scoring.
//!
//! Scores parsed sections against a free-text query using phrase and term
//! matches plus a small structural-keyword bonus, after applying release,
//! service, and document-type pre-filters. Ties preserve source order.

pub mod cache;

pub use cache::{QueryCache, QueryCacheStats, QueryKey};

use serde::{Deserialize, Serialize};

use crate::core::Section;
use crate::core::text::truncate_chars;

/// Default number of hits returned.
pub const DEFAULT_MAX_RESULTS: usize = 5;

/// Maximum snippet length in characters.
pub const SNIPPET_CHARS: usize = 300;

/// Structural vocabulary that earns a one-time bonus when shared by the
/// query and a section.
const STRUCTURAL_KEYWORDS: [&str; 8] = [
    "implementation",
    "architecture",
    "flow",
    "diagram",
    "example",
    "interface",
    "contract",
    "specification",
];

/// Score bonus table.
const HEADING_PHRASE_BONUS: f64 = 100.0;
const CONTENT_PHRASE_BONUS: f64 = 50.0;
const HEADING_TERM_BONUS: f64 = 10.0;
const CONTENT_TERM_BONUS: f64 = 5.0;
const KEYWORD_BONUS: f64 = 15.0;

/// Optional pre-filters applied before scoring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Exact release match (e.g. `R2`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release: Option<String>,
    /// Case-insensitive substring required in heading or content.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Document-type membership.
    #[serde(rename = "docTypes", skip_serializing_if = "Option::is_none")]
    pub doc_types: Option<Vec<String>>,
}

impl SearchFilters {
    /// Returns `true` if the section passes every configured filter.
    #[must_use]
    pub fn accepts(&self, section: &Section) -> bool {
        if let Some(release) = &self.release
            && section.release != *release
        {
            return false;
        }
        if let Some(service) = &self.service
            && !section.mentions(service)
        {
            return false;
        }
        if let Some(doc_types) = &self.doc_types
            && !doc_types.iter().any(|dt| *dt == section.doc_type)
        {
            return false;
        }
        true
    }
}

/// A scored section with the reasons it matched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionHit {
    /// The matching section.
    pub section: Section,
    /// Non-negative relevance score; higher is more relevant.
    pub score: f64,
    /// Human-readable match reasons.
    #[serde(rename = "matchReasons")]
    pub match_reasons: Vec<String>,
}

impl SectionHit {
    /// Returns the leading content snippet for display.
    #[must_use]
    pub fn snippet(&self) -> &str {
        truncate_chars(&self.section.content, SNIPPET_CHARS)
    }
}

/// Scores `sections` against `query`, returning the top `max_results` hits
/// with positive scores. Ties preserve source order.
#[must_use]
pub fn score_sections(
    sections: &[Section],
    query: &str,
    filters: &SearchFilters,
    max_results: usize,
) -> Vec<SectionHit> {
    let query_lower = query.to_lowercase();
    let terms: Vec<&str> = query_lower
        .split_whitespace()
        .filter(|term| term.len() > 2)
        .collect();

    let mut hits: Vec<SectionHit> = sections
        .iter()
        .filter(|section| filters.accepts(section))
        .filter_map(|section| score_one(section, &query_lower, &terms))
        .collect();

    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    hits.truncate(max_results);
    hits
}

fn score_one(section: &Section, query_lower: &str, terms: &[&str]) -> Option<SectionHit> {
    let heading = section.heading.to_lowercase();
    let content = section.content.to_lowercase();

    let mut score = 0.0;
    let mut reasons = Vec::new();

    if heading.contains(query_lower) {
        score += HEADING_PHRASE_BONUS;
        reasons.push("Exact match in heading".to_string());
    }
    if content.contains(query_lower) {
        score += CONTENT_PHRASE_BONUS;
        reasons.push("Exact match in content".to_string());
    }

    let heading_terms = terms.iter().filter(|t| heading.contains(**t)).count();
    if heading_terms > 0 {
        score += HEADING_TERM_BONUS * heading_terms as f64;
        reasons.push(format!("{heading_terms} terms in heading"));
    }
    let content_terms = terms.iter().filter(|t| content.contains(**t)).count();
    if content_terms > 0 {
        score += CONTENT_TERM_BONUS * content_terms as f64;
        reasons.push(format!("{content_terms} terms in content"));
    }

    if let Some(keyword) = STRUCTURAL_KEYWORDS.iter().find(|kw| {
        query_lower.contains(**kw) && (heading.contains(**kw) || content.contains(**kw))
    }) {
        score += KEYWORD_BONUS;
        reasons.push(format!("Mentions {keyword}"));
    }

    if score > 0.0 {
        Some(SectionHit {
            section: section.clone(),
            score,
            match_reasons: reasons,
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn section(release: &str, doc_type: &str, heading: &str, content: &str) -> Section {
        Section {
            file: format!("{release}-{doc_type}.md"),
            release: release.to_string(),
            doc_type: doc_type.to_string(),
            heading: heading.to_string(),
            content: content.to_string(),
            line_start: 1,
            line_end: 2,
        }
    }

    fn fixture() -> Vec<Section> {
        vec![
            section(
                "R1",
                "NOTES",
                "Auth overview",
                "authentication flow and tokens",
            ),
            section("R2", "NOTES", "Payments", "handle invoices"),
        ]
    }

    #[test]
    fn test_exact_content_match_ranks_first() {
        let hits = score_sections(
            &fixture(),
            "authentication flow",
            &SearchFilters::default(),
            5,
        );
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].section.heading, "Auth overview");
        assert!(
            hits[0]
                .match_reasons
                .iter()
                .any(|r| r == "Exact match in content")
        );
        assert!(hits[0].match_reasons.iter().any(|r| r.contains("terms in content")));
    }

    #[test]
    fn test_release_filter() {
        let filters = SearchFilters {
            release: Some("R2".to_string()),
            ..SearchFilters::default()
        };
        let hits = score_sections(&fixture(), "invoices", &filters, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].section.release, "R2");

        let filters = SearchFilters {
            release: Some("R2".to_string()),
            ..SearchFilters::default()
        };
        let hits = score_sections(&fixture(), "authentication", &filters, 5);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_service_filter_substring() {
        let filters = SearchFilters {
            service: Some("AUTH".to_string()),
            ..SearchFilters::default()
        };
        let hits = score_sections(&fixture(), "tokens", &filters, 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].section.heading, "Auth overview");
    }

    #[test]
    fn test_doc_type_filter() {
        let filters = SearchFilters {
            doc_types: Some(vec!["CONFIGURATION".to_string()]),
            ..SearchFilters::default()
        };
        assert!(score_sections(&fixture(), "tokens", &filters, 5).is_empty());
    }

    #[test]
    fn test_heading_match_outranks_content_match() {
        let sections = vec![
            section("R1", "NOTES", "Deployment", "the cache layer stores entries"),
            section("R1", "NOTES", "Cache layer", "deployment hints"),
        ];
        let hits = score_sections(&sections, "cache layer", &SearchFilters::default(), 5);
        assert_eq!(hits[0].section.heading, "Cache layer");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn test_structural_keyword_bonus_once() {
        let sections = vec![section(
            "R1",
            "NOTES",
            "Service architecture",
            "architecture diagram with example flows",
        )];
        let hits = score_sections(
            &sections,
            "architecture diagram",
            &SearchFilters::default(),
            5,
        );
        let keyword_reasons = hits[0]
            .match_reasons
            .iter()
            .filter(|r| r.starts_with("Mentions"))
            .count();
        assert_eq!(keyword_reasons, 1);
        assert!(hits[0].match_reasons.iter().any(|r| r == "Mentions architecture"));
    }

    #[test]
    fn test_short_terms_skipped() {
        let sections = vec![section("R1", "NOTES", "IO", "an io note")];
        // Both terms are <= 2 chars, so only phrase matches can score.
        let hits = score_sections(&sections, "io", &SearchFilters::default(), 5);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].match_reasons.iter().all(|r| !r.contains("terms")));
    }

    #[test]
    fn test_ties_preserve_source_order() {
        let sections = vec![
            section("R1", "NOTES", "first", "shared phrase here"),
            section("R1", "NOTES", "second", "shared phrase here"),
        ];
        let hits = score_sections(&sections, "shared phrase", &SearchFilters::default(), 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].section.heading, "first");
        assert_eq!(hits[1].section.heading, "second");
    }

    #[test]
    fn test_max_results_truncates() {
        let sections: Vec<Section> = (0..10)
            .map(|i| section("R1", "NOTES", &format!("h{i}"), "needle text"))
            .collect();
        let hits = score_sections(&sections, "needle", &SearchFilters::default(), 3);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_zero_score_excluded() {
        let hits = score_sections(&fixture(), "kubernetes", &SearchFilters::default(), 5);
        assert!(hits.is_empty());
    }
}
