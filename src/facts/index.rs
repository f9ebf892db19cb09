//! Keyed fact index with duplicate and conflict detection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::core::Fact;
use crate::error::Result;
use crate::facts::extract_from_markdown;
use crate::index::{DocIndexCache, IndexOptions};

/// A fact agreeing with an existing one on every canonical component.
#[derive(Debug, Clone)]
pub struct DuplicateMatch {
    /// Fact already in the index.
    pub existing: Fact,
    /// Incoming fact that duplicates it.
    pub duplicate: Fact,
}

/// A fact agreeing on `(subject, predicate)` but not on the object.
#[derive(Debug, Clone)]
pub struct ConflictMatch {
    /// Fact already in the index.
    pub existing: Fact,
    /// Incoming fact with a different canonical object.
    pub conflicting: Fact,
    /// Explanation naming both object values.
    pub reason: String,
}

/// Mapping `normalize(subject)::normalize(predicate)` → canonical object →
/// occurrences.
#[derive(Debug, Default)]
pub struct FactIndex {
    by_key: HashMap<String, HashMap<String, Vec<Fact>>>,
    fact_count: usize,
}

impl FactIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fact, appending to its `(key, canonical object)` bucket.
    pub fn insert(&mut self, fact: Fact) {
        self.by_key
            .entry(fact.normalized_key.clone())
            .or_default()
            .entry(fact.canonical_object.clone())
            .or_default()
            .push(fact);
        self.fact_count += 1;
    }

    /// Number of inserted facts.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.fact_count
    }

    /// Returns `true` when no facts are indexed.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fact_count == 0
    }

    /// For each input fact, every existing fact under the same
    /// `(key, canonical object)`.
    #[must_use]
    pub fn find_duplicates(&self, facts: &[Fact]) -> Vec<DuplicateMatch> {
        let mut matches = Vec::new();
        for fact in facts {
            if let Some(values) = self.by_key.get(&fact.normalized_key)
                && let Some(existing_facts) = values.get(&fact.canonical_object)
            {
                for existing in existing_facts {
                    matches.push(DuplicateMatch {
                        existing: existing.clone(),
                        duplicate: fact.clone(),
                    });
                }
            }
        }
        matches
    }

    /// For each input fact, every existing fact under the same key but a
    /// different canonical object. Disjoint from
    /// [`find_duplicates`](Self::find_duplicates) by construction.
    #[must_use]
    pub fn find_conflicts(&self, facts: &[Fact]) -> Vec<ConflictMatch> {
        let mut matches = Vec::new();
        for fact in facts {
            let Some(values) = self.by_key.get(&fact.normalized_key) else {
                continue;
            };
            for (canonical_object, existing_facts) in values {
                if *canonical_object == fact.canonical_object {
                    continue;
                }
                for existing in existing_facts {
                    matches.push(ConflictMatch {
                        existing: existing.clone(),
                        conflicting: fact.clone(),
                        reason: format!(
                            "'{}' is already documented as '{}' but the incoming change says '{}'",
                            existing.subject, existing.object, fact.object
                        ),
                    });
                }
            }
        }
        matches
    }
}

/// Per-root cache of built fact indexes.
///
/// Invalidation is explicit: the update agent and the watcher drop the
/// entry whenever the corpus changes.
#[derive(Default)]
pub struct FactIndexCache {
    cache: Mutex<HashMap<PathBuf, Arc<FactIndex>>>,
}

impl FactIndexCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the fact index for `root`, building it from the section
    /// index on miss.
    ///
    /// # Errors
    ///
    /// Propagates section-index build errors.
    pub async fn get(
        &self,
        root: &Path,
        index_cache: &DocIndexCache,
        options: IndexOptions,
    ) -> Result<Arc<FactIndex>> {
        if let Ok(cache) = self.cache.lock()
            && let Some(index) = cache.get(root)
        {
            return Ok(Arc::clone(index));
        }

        let doc_index = index_cache.get(root, options).await?;
        let mut index = FactIndex::new();
        for section in &doc_index.sections {
            // Section content starts on the line after the heading.
            for fact in extract_from_markdown(
                &section.content,
                &section.file,
                Some(&section.heading),
                section.line_start + 1,
            ) {
                index.insert(fact);
            }
        }
        debug!(root = %root.display(), facts = index.len(), "built fact index");

        let index = Arc::new(index);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(root.to_path_buf(), Arc::clone(&index));
        }
        Ok(index)
    }

    /// Drops the cached index for `root`.
    pub fn invalidate(&self, root: &Path) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.remove(root);
        }
    }
}
