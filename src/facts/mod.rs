//! Fact extraction and the keyed fact index.
//!
//! Facts are `(subject, "is", object)` triples pulled from declarative
//! lines in corpus sections and proposed diffs. The index groups them by
//! normalized `(subject, predicate)` and canonical object so duplicate and
//! conflicting statements are detected before any write.

mod extract;
mod index;

pub use extract::{extract_from_diff, extract_from_markdown};
pub use index::{ConflictMatch, DuplicateMatch, FactIndex, FactIndexCache};
