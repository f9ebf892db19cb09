//! Subject-predicate-object facts extracted from corpus text.
//!
//! Canonicalization makes equivalent values hash-equal: `Timeout: 1,000`
//! and `timeout = 1000` produce the same fact hash.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A `(subject, predicate, object)` triple with provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// Subject as written, trimmed.
    pub subject: String,
    /// Predicate; extraction always uses the literal `"is"`.
    pub predicate: String,
    /// Object as written, trimmed.
    pub object: String,
    /// Source file, relative to the corpus root.
    pub file: String,
    /// Heading of the source section, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    /// 1-based source line, when known.
    #[serde(rename = "lineStart", skip_serializing_if = "Option::is_none")]
    pub line_start: Option<usize>,
    /// 1-based source line, when known.
    #[serde(rename = "lineEnd", skip_serializing_if = "Option::is_none")]
    pub line_end: Option<usize>,
    /// `normalize(subject) + "::" + normalize(predicate)`.
    #[serde(rename = "normalizedKey")]
    pub normalized_key: String,
    /// Canonical form of the object.
    #[serde(rename = "canonicalObject")]
    pub canonical_object: String,
    /// Stable hex digest of the canonical triple.
    pub hash: String,
}

impl Fact {
    /// Creates a fact, deriving its key, canonical object, and hash.
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        let subject = subject.into();
        let predicate = predicate.into();
        let object = object.into();
        let normalized_key = fact_key(&subject, &predicate);
        let canonical_object = canonicalize(&object);
        let hash = fact_hash(&subject, &predicate, &object);
        Self {
            subject,
            predicate,
            object,
            file: file.into(),
            heading: None,
            line_start: None,
            line_end: None,
            normalized_key,
            canonical_object,
            hash,
        }
    }

    /// Attaches section provenance.
    #[must_use]
    pub fn with_location(
        mut self,
        heading: Option<String>,
        line_start: usize,
        line_end: usize,
    ) -> Self {
        self.heading = heading;
        self.line_start = Some(line_start);
        self.line_end = Some(line_end);
        self
    }
}

/// Lowercases, collapses runs of whitespace to single spaces, and thereby
/// normalizes line endings.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonicalizes an object value.
///
/// On top of [`normalize`], numeric strings (allowing thousands-separator
/// commas and embedded spaces) map to their decimal form and `true`/`false`
/// (any case) map to lowercase.
#[must_use]
pub fn canonicalize(object: &str) -> String {
    let normalized = normalize(object);
    if normalized == "true" || normalized == "false" {
        return normalized;
    }
    let candidate: String = normalized
        .chars()
        .filter(|c| *c != ',' && *c != ' ')
        .collect();
    if looks_numeric(&candidate) {
        if let Ok(int) = candidate.parse::<i128>() {
            return int.to_string();
        }
        if let Ok(float) = candidate.parse::<f64>()
            && float.is_finite()
        {
            return float.to_string();
        }
    }
    normalized
}

/// Builds the grouping key `normalize(subject) + "::" + normalize(predicate)`.
#[must_use]
pub fn fact_key(subject: &str, predicate: &str) -> String {
    format!("{}::{}", normalize(subject), normalize(predicate))
}

/// Stable digest of `normalize(subject) | normalize(predicate) | canonicalize(object)`.
#[must_use]
pub fn fact_hash(subject: &str, predicate: &str, object: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(subject).as_bytes());
    hasher.update(b"|");
    hasher.update(normalize(predicate).as_bytes());
    hasher.update(b"|");
    hasher.update(canonicalize(object).as_bytes());
    hex_digest(&hasher.finalize())
}

/// Formats a digest as lowercase hex.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Returns `true` when every character could belong to a decimal literal
/// and at least one digit is present.
fn looks_numeric(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.chars().any(|c| c.is_ascii_digit())
        && candidate
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_normalize_collapses_whitespace() {
        assert_eq!(normalize("  Hello\r\n  World "), "hello world");
        assert_eq!(normalize("A\tB"), "a b");
    }

    #[test_case("PostgreSQL", "postgresql"; "plain string lowercased")]
    #[test_case("TRUE", "true"; "boolean lowercased")]
    #[test_case("False", "false"; "boolean mixed case")]
    #[test_case("1,000", "1000"; "thousands separator")]
    #[test_case("1 000 000", "1000000"; "embedded spaces")]
    #[test_case("3.14", "3.14"; "float preserved")]
    #[test_case("-42", "-42"; "negative integer")]
    #[test_case("v1.2.3", "v1.2.3"; "version string untouched")]
    fn test_canonicalize(input: &str, expected: &str) {
        assert_eq!(canonicalize(input), expected);
    }

    #[test]
    fn test_fact_hash_invariant_under_formatting() {
        let a = fact_hash("Max Connections", "is", "1,000");
        let b = fact_hash("max   connections", "IS", "1000");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fact_hash_differs_on_object() {
        let a = fact_hash("Database", "is", "PostgreSQL");
        let b = fact_hash("Database", "is", "MySQL");
        assert_ne!(a, b);
    }

    #[test]
    fn test_fact_new_derives_fields() {
        let fact = Fact::new("Database", "is", "PostgreSQL", "R1-CONFIG.md")
            .with_location(Some("Storage".to_string()), 4, 4);
        assert_eq!(fact.normalized_key, "database::is");
        assert_eq!(fact.canonical_object, "postgresql");
        assert_eq!(fact.hash.len(), 64);
        assert_eq!(fact.line_start, Some(4));
    }

    #[test]
    fn test_hex_digest() {
        assert_eq!(hex_digest(&[0x00, 0xff, 0x10]), "00ff10");
    }
}
