//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros. The CLI is a thin
//! local transport over the service operations.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// docrag: grounded documentation retrieval for coding agents.
///
/// Indexes a corpus of `R<digits>-<DOCTYPE>.md` documents, answers
/// questions with citations, and maintains the corpus with fact-checked
/// updates.
#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Corpus root directory.
    #[arg(short, long, env = "DOCRAG_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse, chunk, embed, and upsert the corpus into the vector store.
    Index,

    /// Rank corpus sections against a query.
    Search {
        /// Free-text query.
        query: String,

        /// Restrict to one release (e.g. R2).
        #[arg(long)]
        release: Option<String>,

        /// Require a service name in heading or content.
        #[arg(long)]
        service: Option<String>,

        /// Restrict to document types (repeatable).
        #[arg(long = "doc-type")]
        doc_types: Vec<String>,

        /// Maximum results.
        #[arg(short = 'n', long, default_value = "5")]
        max_results: usize,
    },

    /// Answer a question with citations grounded in the corpus.
    Answer {
        /// Free-text question.
        query: String,

        /// Restrict to one release.
        #[arg(long)]
        release: Option<String>,

        /// Restrict to one service.
        #[arg(long)]
        service: Option<String>,

        /// Restrict to one document type.
        #[arg(long = "doc-type")]
        doc_type: Option<String>,

        /// Generation budget in tokens.
        #[arg(long)]
        max_tokens: Option<u32>,

        /// Retrieval breadth.
        #[arg(short, long)]
        k: Option<usize>,
    },

    /// Propose a corpus edit with duplicate and conflict preflight.
    Suggest {
        /// What should be documented.
        intent: String,

        /// Body text (reads stdin when `-` is given).
        #[arg(long)]
        context: Option<String>,

        /// Explicit target file, relative to the root.
        #[arg(long)]
        target_file: Option<String>,

        /// Release prefix for an inferred target (default R1).
        #[arg(long)]
        target_release: Option<String>,
    },

    /// Apply a diff to a corpus file, with fact-conflict protection.
    Apply {
        /// Target file, relative to the root.
        target: PathBuf,

        /// File holding the diff (reads stdin when omitted).
        #[arg(long)]
        diff_file: Option<PathBuf>,

        /// Apply even when conflicting facts are detected.
        #[arg(short, long)]
        force: bool,
    },

    /// Summarize how each release documents a feature.
    Compare {
        /// Feature text to compare.
        feature: String,

        /// Releases to include (default: all).
        #[arg(long)]
        releases: Vec<String>,
    },

    /// Show inbound/outbound dependencies of a service in a release.
    Deps {
        /// Service name.
        service: String,

        /// Release to scan.
        #[arg(long, default_value = "R1")]
        release: String,

        /// Include raw data-flow lines.
        #[arg(long)]
        data_flow: bool,
    },

    /// Invalidate every cache for the corpus root.
    Refresh,

    /// Watch the corpus and keep caches fresh until interrupted.
    Watch,

    /// Service liveness report.
    #[command(name = "health")]
    Health,

    /// Request counters and latency.
    Metrics,
}
