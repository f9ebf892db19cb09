//! Corpus discovery and Markdown section parsing.
//!
//! Walks a corpus root recursively, honors an optional `.docignore` file
//! (gitignore syntax), and splits each selected `.md` file into
//! heading-rooted [`Section`]s carrying release and document-type metadata
//! captured from the `R<digits>-<DOCTYPE>.md` filename schema.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::Regex;
use tracing::warn;

use crate::core::Section;
use crate::error::{Error, ParseError, Result};

/// Name of the optional ignore file at the corpus root.
pub const DOCIGNORE_FILE: &str = ".docignore";

/// Directory basenames skipped entirely during the walk.
const SKIP_DIRS: [&str; 3] = ["node_modules", "build", "dist"];

/// Legacy project mount scanned in preference to the root itself.
const LEGACY_SUBDIR: &str = "mnt/project";

/// ATX heading: one to six `#` markers, whitespace, then the heading text.
pub static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(#{1,6})\s+(.+)$").unwrap_or_else(|e| unreachable!("heading regex: {e}"))
});

/// Release-prefixed filename selection rule.
static SELECT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^R\d+-.+\.md$").unwrap_or_else(|e| unreachable!("select regex: {e}"))
});

/// Full filename schema capturing release and document type.
static FILENAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(R\d+)-([A-Z0-9_]+)\.md$").unwrap_or_else(|e| unreachable!("filename regex: {e}"))
});

/// Parses every selected file under `root` into sections.
///
/// # Errors
///
/// Returns [`ParseError::RootNotFound`] when `root` is not a directory and
/// [`ParseError::InvalidUtf8`] when a selected file is not valid UTF-8.
/// Directory enumeration errors are recovered with a warning.
pub fn parse(root: &Path) -> Result<Vec<Section>> {
    let files = discover_files(root)?;
    parse_files(root, &files)
}

/// Parses an explicit list of discovered files.
///
/// # Errors
///
/// Returns [`ParseError::InvalidUtf8`] when a file is not valid UTF-8.
pub fn parse_files(root: &Path, files: &[PathBuf]) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    for file in files {
        sections.extend(parse_file(root, file)?);
    }
    Ok(sections)
}

/// Discovers every corpus file under `root` that section parsing would
/// consider, in deterministic order.
///
/// If `<root>/mnt/project` exists and yields at least one file, its results
/// are returned in preference; otherwise the walk covers `root` itself.
/// Selection within a directory: release-prefixed `.md` names anywhere, or
/// any `.md` file sitting directly in the scanned base.
///
/// # Errors
///
/// Returns [`ParseError::RootNotFound`] when `root` is not a directory.
pub fn discover_files(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::Parse(ParseError::RootNotFound {
            path: root.to_path_buf(),
        }));
    }

    let matcher = load_docignore(root);

    let legacy = root.join(LEGACY_SUBDIR);
    if legacy.is_dir() {
        let mut files = Vec::new();
        walk(&legacy, &legacy, root, matcher.as_ref(), &mut files);
        if !files.is_empty() {
            return Ok(files);
        }
    }

    let mut files = Vec::new();
    walk(root, root, root, matcher.as_ref(), &mut files);
    Ok(files)
}

/// Builds the `.docignore` matcher when the file exists at the root.
fn load_docignore(root: &Path) -> Option<Gitignore> {
    let ignore_path = root.join(DOCIGNORE_FILE);
    if !ignore_path.is_file() {
        return None;
    }
    let mut builder = GitignoreBuilder::new(root);
    if let Some(err) = builder.add(&ignore_path) {
        warn!(path = %ignore_path.display(), error = %err, "failed to read ignore file");
        return None;
    }
    match builder.build() {
        Ok(matcher) => Some(matcher),
        Err(err) => {
            warn!(path = %ignore_path.display(), error = %err, "invalid ignore file");
            None
        }
    }
}

/// Recursive walk with per-directory error recovery.
fn walk(dir: &Path, base: &Path, root: &Path, matcher: Option<&Gitignore>, out: &mut Vec<PathBuf>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "skipping unreadable directory");
            return;
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "skipping unreadable entry");
                None
            }
        })
        .collect();
    paths.sort();

    for path in paths {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_dir() {
            if name.starts_with('.') || SKIP_DIRS.contains(&name) {
                continue;
            }
            walk(&path, base, root, matcher, out);
        } else if is_selected(&path, name, base) && !is_ignored(&path, root, matcher) {
            out.push(path);
        }
    }
}

/// File selection rule: release-prefixed `.md` anywhere, or any `.md`
/// directly inside the scanned base directory.
fn is_selected(path: &Path, name: &str, base: &Path) -> bool {
    if !name.ends_with(".md") {
        return false;
    }
    SELECT_RE.is_match(name) || path.parent() == Some(base)
}

/// Applies `.docignore` patterns to the root-relative forward-slash path.
fn is_ignored(path: &Path, root: &Path, matcher: Option<&Gitignore>) -> bool {
    let Some(matcher) = matcher else {
        return false;
    };
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    matcher.matched(relative, false).is_ignore()
}

/// Splits one file into sections. Files whose names do not match the
/// `R<digits>-<DOCTYPE>.md` schema yield zero sections.
fn parse_file(root: &Path, path: &Path) -> Result<Vec<Section>> {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    let Some(captures) = FILENAME_RE.captures(name) else {
        return Ok(Vec::new());
    };
    let release = captures[1].to_string();
    let doc_type = captures[2].to_string();

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "skipping unreadable file");
            return Ok(Vec::new());
        }
    };
    let text = String::from_utf8(bytes).map_err(|_| {
        Error::Parse(ParseError::InvalidUtf8 {
            path: path.to_path_buf(),
        })
    })?;

    let file = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/");

    Ok(split_sections(&text, &file, &release, &doc_type))
}

/// Splits text on ATX headings into sections with 1-based line ranges.
fn split_sections(text: &str, file: &str, release: &str, doc_type: &str) -> Vec<Section> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = Vec::new();
    let mut open: Option<(String, usize, Vec<&str>)> = None;

    for (i, line) in lines.iter().enumerate() {
        if let Some(captures) = HEADING_RE.captures(line) {
            if let Some((heading, start, body)) = open.take() {
                sections.push(make_section(
                    file, release, doc_type, heading, start, i, &body,
                ));
            }
            open = Some((captures[2].to_string(), i + 1, Vec::new()));
        } else if let Some((_, _, body)) = open.as_mut() {
            body.push(line);
        }
    }
    if let Some((heading, start, body)) = open {
        sections.push(make_section(
            file,
            release,
            doc_type,
            heading,
            start,
            lines.len(),
            &body,
        ));
    }
    sections
}

fn make_section(
    file: &str,
    release: &str,
    doc_type: &str,
    heading: String,
    line_start: usize,
    line_end: usize,
    body: &[&str],
) -> Section {
    Section {
        file: file.to_string(),
        release: release.to_string(),
        doc_type: doc_type.to_string(),
        heading,
        content: body.join("\n").trim().to_string(),
        line_start,
        line_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create dirs");
        }
        fs::write(path, content).expect("write fixture");
    }

    #[test]
    fn test_parse_splits_on_headings() {
        let dir = TempDir::new().expect("tempdir");
        write(
            dir.path(),
            "R1-ARCHITECTURE.md",
            "# Overview\nAlpha plane.\n\n## Data\nBeta plane.\n",
        );
        let sections = parse(dir.path()).expect("parse");
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].heading, "Overview");
        assert_eq!(sections[0].content, "Alpha plane.");
        assert_eq!(sections[0].release, "R1");
        assert_eq!(sections[0].doc_type, "ARCHITECTURE");
        assert_eq!(sections[0].line_start, 1);
        assert_eq!(sections[0].line_end, 3);
        assert_eq!(sections[1].heading, "Data");
        assert_eq!(sections[1].line_start, 4);
        assert_eq!(sections[1].line_end, 5);
    }

    #[test]
    fn test_line_ranges_partition_file() {
        let dir = TempDir::new().expect("tempdir");
        let text = "# A\none\ntwo\n# B\nthree\n## C\nfour\nfive\n";
        write(dir.path(), "R2-NOTES.md", text);
        let sections = parse(dir.path()).expect("parse");
        assert_eq!(sections.len(), 3);
        let mut expected_start = 1;
        for section in &sections {
            assert_eq!(section.line_start, expected_start);
            assert!(section.line_end >= section.line_start);
            expected_start = section.line_end + 1;
        }
        assert_eq!(sections[2].line_end, text.lines().count());
    }

    #[test]
    fn test_no_headings_yields_zero_sections() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "R1-NOTES.md", "just prose, no headings\n");
        write(dir.path(), "R1-EMPTY.md", "");
        assert!(parse(dir.path()).expect("parse").is_empty());
    }

    #[test]
    fn test_non_schema_names_yield_zero_sections() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "README.md", "# Title\nbody\n");
        let sections = parse(dir.path()).expect("parse");
        assert!(sections.is_empty());
        // Selected regardless, so it participates in the fingerprint.
        let files = discover_files(dir.path()).expect("discover");
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_skips_hidden_and_build_dirs() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "R1-NOTES.md", "# A\nx\n");
        write(dir.path(), ".git/R1-SECRET.md", "# B\ny\n");
        write(dir.path(), "node_modules/R1-DEP.md", "# C\nz\n");
        write(dir.path(), "build/R1-OUT.md", "# D\nw\n");
        write(dir.path(), "dist/R1-OUT.md", "# E\nv\n");
        let files = discover_files(dir.path()).expect("discover");
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn test_nested_release_files_selected() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "guides/R3-MIGRATION_NOTES.md", "# Steps\n1\n");
        write(dir.path(), "guides/notes.md", "# Ignored\nnot at root\n");
        let files = discover_files(dir.path()).expect("discover");
        assert_eq!(files.len(), 1);
        let sections = parse(dir.path()).expect("parse");
        assert_eq!(sections[0].file, "guides/R3-MIGRATION_NOTES.md");
        assert_eq!(sections[0].release, "R3");
    }

    #[test]
    fn test_docignore_excludes_patterns() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), ".docignore", "drafts/\nR9-*.md\n");
        write(dir.path(), "R1-NOTES.md", "# A\nx\n");
        write(dir.path(), "R9-DRAFT.md", "# B\ny\n");
        write(dir.path(), "drafts/R2-NOTES.md", "# C\nz\n");
        let files = discover_files(dir.path()).expect("discover");
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("R1-NOTES.md"));
    }

    #[test]
    fn test_legacy_mount_preferred() {
        let dir = TempDir::new().expect("tempdir");
        write(dir.path(), "mnt/project/R1-NOTES.md", "# Inner\nx\n");
        write(dir.path(), "R1-OUTER.md", "# Outer\ny\n");
        let sections = parse(dir.path()).expect("parse");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "Inner");
        assert_eq!(sections[0].file, "mnt/project/R1-NOTES.md");
    }

    #[test]
    fn test_empty_legacy_mount_falls_back() {
        let dir = TempDir::new().expect("tempdir");
        fs::create_dir_all(dir.path().join("mnt/project")).expect("mkdir");
        write(dir.path(), "R1-NOTES.md", "# Outer\ny\n");
        let sections = parse(dir.path()).expect("parse");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "Outer");
    }

    #[test]
    fn test_invalid_utf8_fails() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(dir.path().join("R1-NOTES.md"), [0xff, 0xfe, 0x00]).expect("write");
        let err = parse(dir.path()).expect_err("should fail");
        assert!(matches!(
            err,
            Error::Parse(ParseError::InvalidUtf8 { .. })
        ));
    }

    #[test]
    fn test_missing_root_fails() {
        let err = parse(Path::new("/nonexistent/docrag-root")).expect_err("should fail");
        assert!(matches!(err, Error::Parse(ParseError::RootNotFound { .. })));
    }

    #[test]
    fn test_heading_levels_one_through_six() {
        let dir = TempDir::new().expect("tempdir");
        write(
            dir.path(),
            "R1-NOTES.md",
            "###### Deep\nbody\n####### NotAHeading\n",
        );
        let sections = parse(dir.path()).expect("parse");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].heading, "Deep");
        assert!(sections[0].content.contains("####### NotAHeading"));
    }
}
