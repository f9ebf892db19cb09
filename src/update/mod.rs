//! Corpus update agent.
//!
//! Turns an edit intent into a concrete suggestion (target file, diff,
//! rationale, citations) with a fact-level preflight, then applies accepted
//! suggestions atomically: write to a sibling temp file, rename over the
//! target, invalidate the section and fact caches, and emit lifecycle
//! events with the document event always ahead of `reindex_triggered`.
//!
//! The apply strategy is append; hunk-level patching is a future extension
//! that must preserve the same atomicity and reindex contract.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::{DocEvent, EventBus, Fact};
use crate::error::{Error, IoError, Result, UpdateError};
use crate::facts::{FactIndexCache, extract_from_diff};
use crate::index::{DocIndexCache, IndexOptions};
use crate::rag::Citation;
use crate::search::{SearchFilters, score_sections};

/// Citations attached to a suggestion.
const SUGGESTION_CITATIONS: usize = 3;

/// Release prefix used when the intent names none.
const DEFAULT_RELEASE: &str = "R1";

/// Keyword → document-type suffix inference table.
const SUFFIX_KEYWORDS: [(&str, &str); 4] = [
    ("architecture", "ARCHITECTURE"),
    ("service", "SERVICE_CONTRACTS"),
    ("config", "CONFIGURATION"),
    ("migration", "MIGRATION_NOTES"),
];

/// Fallback document-type suffix.
const DEFAULT_SUFFIX: &str = "NOTES";

/// An edit request from a caller.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdateIntent {
    /// What the caller wants documented.
    pub intent: String,
    /// Body text for the new or updated document.
    #[serde(default)]
    pub context: Option<String>,
    /// Explicit target file relative to the root, overriding inference.
    #[serde(rename = "targetFile", default)]
    pub target_file: Option<String>,
    /// Release prefix for the inferred filename.
    #[serde(rename = "targetRelease", default)]
    pub target_release: Option<String>,
}

/// Whether the suggestion writes a new file or appends to an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    /// Append to an existing document.
    Update,
    /// Create a new document.
    Create,
}

/// Flattened duplicate record attached to a suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateRecord {
    /// Duplicated subject.
    pub subject: String,
    /// Canonical value both facts agree on.
    pub value: String,
    /// File already documenting the fact.
    pub file: String,
    /// Line of the existing occurrence, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

/// Conflict record attached to a suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    /// Conflicting subject.
    pub subject: String,
    /// Object value already documented.
    pub existing: String,
    /// Object value the diff introduces.
    pub incoming: String,
    /// File documenting the existing value.
    pub file: String,
    /// Explanation naming both values.
    pub reason: String,
}

/// A proposed corpus edit with its preflight results.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateSuggestion {
    /// Create or update.
    pub action: UpdateAction,
    /// Absolute target path.
    #[serde(rename = "targetPath")]
    pub target_path: PathBuf,
    /// Proposed content change.
    pub diff: String,
    /// Why this target and action were chosen.
    pub rationale: String,
    /// Sections related to the intent.
    pub citations: Vec<Citation>,
    /// Facts the diff restates.
    pub duplicates: Vec<DuplicateRecord>,
    /// Facts the diff contradicts.
    pub conflicts: Vec<ConflictRecord>,
    /// `true` whenever `conflicts` is non-empty.
    pub blocked: bool,
}

/// Result of applying a suggestion.
#[derive(Debug, Clone, Serialize)]
pub struct ApplyOutcome {
    /// `"success"` or `"error"`.
    pub status: &'static str,
    /// Target path of the write.
    pub path: PathBuf,
    /// Whether caches were invalidated for a rebuild.
    pub reindexed: bool,
    /// Error text when `status` is `"error"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Suggests and applies corpus edits for one root.
pub struct DocUpdateAgent {
    root: PathBuf,
    index_cache: Arc<DocIndexCache>,
    fact_cache: Arc<FactIndexCache>,
    events: EventBus,
    index_options: IndexOptions,
}

impl DocUpdateAgent {
    /// Creates an agent for `root`.
    #[must_use]
    pub fn new(
        root: impl Into<PathBuf>,
        index_cache: Arc<DocIndexCache>,
        fact_cache: Arc<FactIndexCache>,
        events: EventBus,
        index_options: IndexOptions,
    ) -> Self {
        Self {
            root: root.into(),
            index_cache,
            fact_cache,
            events,
            index_options,
        }
    }

    /// Builds a suggestion for the intent, including the fact preflight.
    ///
    /// A failed preflight lookup logs and leaves the suggestion unblocked;
    /// `apply_update` re-checks before writing.
    pub async fn suggest_update(&self, intent: &UpdateIntent) -> Result<UpdateSuggestion> {
        let (file_name, inferred) = self.target_file_name(intent);
        let target_path = self.root.join(&file_name);
        let action = if target_path.exists() {
            UpdateAction::Update
        } else {
            UpdateAction::Create
        };
        let diff = build_diff(action, intent);
        let rationale = if inferred {
            format!("Inferred {file_name} from the intent wording; action {action:?} because the file {} exist.",
                if action == UpdateAction::Update { "does" } else { "does not" })
        } else {
            format!("Using the requested target {file_name}.")
        };

        let citations = self.related_citations(intent).await;
        let facts = extract_from_diff(&diff, &file_name);
        let (duplicates, conflicts) = self.preflight(&facts).await;
        let blocked = !conflicts.is_empty();

        Ok(UpdateSuggestion {
            action,
            target_path,
            diff,
            rationale,
            citations,
            duplicates,
            conflicts,
            blocked,
        })
    }

    /// Applies a suggestion: re-checks conflicts, writes atomically,
    /// invalidates caches, and emits events.
    ///
    /// # Errors
    ///
    /// Fails with [`UpdateError::Conflicts`] when conflicts remain and
    /// `force` is not set; I/O failures surface as [`IoError`].
    pub async fn apply_update(
        &self,
        suggestion: &UpdateSuggestion,
        force: bool,
    ) -> Result<ApplyOutcome> {
        let relative = suggestion
            .target_path
            .strip_prefix(&self.root)
            .unwrap_or(&suggestion.target_path)
            .to_string_lossy()
            .replace('\\', "/");
        let facts = extract_from_diff(&suggestion.diff, &relative);
        let (_, conflicts) = self.preflight(&facts).await;
        if !conflicts.is_empty() && !force {
            return Err(Error::Update(UpdateError::Conflicts {
                count: conflicts.len(),
            }));
        }

        let path = suggestion.target_path.clone();
        let created = !path.exists();
        let contents = if created {
            suggestion.diff.clone()
        } else {
            let existing = tokio::fs::read_to_string(&path).await.map_err(|e| {
                Error::Io(IoError::ReadFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })
            })?;
            format!("{existing}\n{}", suggestion.diff)
        };
        write_atomic(&path, &contents).await?;
        info!(path = %path.display(), created, "applied corpus update");

        if created {
            self.events.emit(DocEvent::Created { path: path.clone() });
        } else {
            self.events.emit(DocEvent::Updated { path: path.clone() });
        }
        self.index_cache.invalidate(&self.root);
        self.fact_cache.invalidate(&self.root);
        self.events.emit(DocEvent::ReindexTriggered {
            root: self.root.clone(),
        });

        Ok(ApplyOutcome {
            status: "success",
            path,
            reindexed: true,
            error: None,
        })
    }

    /// Resolves the target file name; returns `(name, inferred)`.
    fn target_file_name(&self, intent: &UpdateIntent) -> (String, bool) {
        if let Some(target) = &intent.target_file {
            return (target.clone(), false);
        }
        let lowered = intent.intent.to_lowercase();
        let suffix = SUFFIX_KEYWORDS
            .iter()
            .find(|(keyword, _)| lowered.contains(keyword))
            .map_or(DEFAULT_SUFFIX, |(_, suffix)| *suffix);
        let release = intent.target_release.as_deref().unwrap_or(DEFAULT_RELEASE);
        (format!("{release}-{suffix}.md"), true)
    }

    /// Top lexical hits for the intent, as suggestion citations.
    async fn related_citations(&self, intent: &UpdateIntent) -> Vec<Citation> {
        let index = match self.index_cache.get(&self.root, self.index_options).await {
            Ok(index) => index,
            Err(err) => {
                warn!(error = %err, "skipping suggestion citations");
                return Vec::new();
            }
        };
        score_sections(
            &index.sections,
            &intent.intent,
            &SearchFilters::default(),
            SUGGESTION_CITATIONS,
        )
        .into_iter()
        .map(|hit| Citation {
            file: hit.section.file.clone(),
            heading: hit.section.heading.clone(),
            line_start: hit.section.line_start,
            line_end: hit.section.line_end,
            snippet: hit.snippet().to_string(),
            relevance: hit.score,
        })
        .collect()
    }

    /// Duplicate and conflict lookup; failures pass through unblocked.
    async fn preflight(&self, facts: &[Fact]) -> (Vec<DuplicateRecord>, Vec<ConflictRecord>) {
        let index = match self
            .fact_cache
            .get(&self.root, &self.index_cache, self.index_options)
            .await
        {
            Ok(index) => index,
            Err(err) => {
                warn!(error = %err, "fact preflight unavailable, passing through");
                return (Vec::new(), Vec::new());
            }
        };
        let duplicates = index
            .find_duplicates(facts)
            .into_iter()
            .map(|m| DuplicateRecord {
                subject: m.existing.subject.clone(),
                value: m.existing.canonical_object.clone(),
                file: m.existing.file.clone(),
                line: m.existing.line_start,
            })
            .collect();
        let conflicts = index
            .find_conflicts(facts)
            .into_iter()
            .map(|m| ConflictRecord {
                subject: m.existing.subject.clone(),
                existing: m.existing.object.clone(),
                incoming: m.conflicting.object.clone(),
                file: m.existing.file.clone(),
                reason: m.reason,
            })
            .collect();
        (duplicates, conflicts)
    }
}

/// Builds the append or create diff for an intent.
fn build_diff(action: UpdateAction, intent: &UpdateIntent) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    let context = intent.context.as_deref().unwrap_or("");
    match action {
        UpdateAction::Update => format!(
            "\n\n## Update: {}\n\n**Added:** {timestamp}\n\n{context}\n",
            intent.intent
        ),
        UpdateAction::Create => format!(
            "# {}\n\n**Created:** {timestamp}\n\n{context}\n",
            intent.intent
        ),
    }
}

/// Writes contents to a sibling temp file, then renames over the target.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let path = path.to_path_buf();
    let contents = contents.to_string();
    tokio::task::spawn_blocking(move || {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&parent).map_err(|e| {
            Error::Io(IoError::DirectoryFailed {
                path: parent.clone(),
                reason: e.to_string(),
            })
        })?;
        let mut temp = tempfile::NamedTempFile::new_in(&parent).map_err(|e| {
            Error::Io(IoError::WriteFailed {
                path: path.clone(),
                reason: e.to_string(),
            })
        })?;
        temp.write_all(contents.as_bytes()).map_err(|e| {
            Error::Io(IoError::WriteFailed {
                path: path.clone(),
                reason: e.to_string(),
            })
        })?;
        temp.persist(&path).map_err(|e| {
            Error::Io(IoError::WriteFailed {
                path: path.clone(),
                reason: e.to_string(),
            })
        })?;
        Ok(())
    })
    .await
    .map_err(|_| Error::Cancelled)?
}
