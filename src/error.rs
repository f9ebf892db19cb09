//! Error types for docrag operations.
//!
//! This module provides the error hierarchy using `thiserror` for all
//! corpus, retrieval, provider, and update operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for docrag operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum accepted request payload in bytes (1 MiB).
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Top-level error type for docrag operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Corpus parsing errors.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Search and query-cache errors.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// Embedding, reranking, or generation provider errors.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Vector store errors.
    #[error("vector store error: {0}")]
    Store(#[from] StoreError),

    /// Corpus update errors.
    #[error("update error: {0}")]
    Update(#[from] UpdateError),

    /// File I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Configuration errors.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Request payload exceeds the accepted maximum.
    #[error("payload of {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        size: usize,
        /// Maximum accepted size in bytes.
        max: usize,
    },

    /// Operation cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,
}

/// Corpus parsing errors.
#[derive(Error, Debug)]
pub enum ParseError {
    /// A selected corpus file was not valid UTF-8.
    #[error("invalid UTF-8 in {path}")]
    InvalidUtf8 {
        /// Path of the offending file.
        path: PathBuf,
    },

    /// The corpus root does not exist or is not a directory.
    #[error("corpus root not found: {path}")]
    RootNotFound {
        /// Missing root path.
        path: PathBuf,
    },
}

/// Search and query-cache errors.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The query was empty after trimming.
    #[error("query must not be empty")]
    EmptyQuery,

    /// A deduplicated fetch shared across concurrent callers failed.
    #[error("query fetch failed: {message}")]
    FetchFailed {
        /// Error text from the elected fetch.
        message: String,
    },
}

/// Remote provider errors (embedding, reranking, generation).
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No API key was found for the configured provider.
    #[error("no API key configured for provider {provider}")]
    ApiKeyMissing {
        /// Provider name.
        provider: String,
    },

    /// The provider name is not supported.
    #[error("unsupported provider: {name}")]
    Unsupported {
        /// Unknown provider name.
        name: String,
    },

    /// A provider API request failed.
    #[error("provider request failed: {message}")]
    ApiRequest {
        /// Error text from the provider SDK.
        message: String,
    },

    /// The provider returned an embedding of unexpected dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimensionality.
        expected: usize,
        /// Dimensionality actually returned.
        actual: usize,
    },
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// The store was used before `connect` was called.
    #[error("vector store not connected")]
    NotConnected,

    /// Delete requires at least one filter predicate.
    #[error("delete requires at least one filter predicate")]
    DeleteWithoutFilter,

    /// Upsert received mismatched chunk and embedding counts.
    #[error("upsert received {chunks} chunks but {embeddings} embeddings")]
    UpsertMismatch {
        /// Number of chunks.
        chunks: usize,
        /// Number of embeddings.
        embeddings: usize,
    },
}

/// Corpus update errors.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Fact-level conflicts were detected and `force` was not set.
    #[error("Conflicting facts detected ({count}). Use force=true to override.")]
    Conflicts {
        /// Number of conflicting facts.
        count: usize,
    },

    /// The resolved target path escapes the corpus root.
    #[error("target path escapes corpus root: {path}")]
    TargetOutsideRoot {
        /// Offending path.
        path: PathBuf,
    },
}

/// File I/O errors.
#[derive(Error, Debug)]
pub enum IoError {
    /// Failed to read a file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write a file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to create a directory.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(StoreError::Database(err.to_string()))
    }
}

impl From<async_openai::error::OpenAIError> for ProviderError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Self::ApiRequest {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Config {
            message: "missing root".to_string(),
        };
        assert_eq!(err.to_string(), "configuration error: missing root");
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::InvalidUtf8 {
            path: PathBuf::from("/docs/R1-NOTES.md"),
        };
        assert_eq!(err.to_string(), "invalid UTF-8 in /docs/R1-NOTES.md");
    }

    #[test]
    fn test_conflict_error_message() {
        let err = UpdateError::Conflicts { count: 2 };
        assert_eq!(
            err.to_string(),
            "Conflicting facts detected (2). Use force=true to override."
        );
    }

    #[test]
    fn test_payload_too_large() {
        let err = Error::PayloadTooLarge {
            size: 2_000_000,
            max: MAX_PAYLOAD_BYTES,
        };
        assert!(err.to_string().contains("2000000"));
        assert!(err.to_string().contains("1048576"));
    }

    #[test]
    fn test_store_error_variants() {
        assert!(
            StoreError::DeleteWithoutFilter
                .to_string()
                .contains("filter predicate")
        );
        let err = StoreError::UpsertMismatch {
            chunks: 3,
            embeddings: 2,
        };
        assert!(err.to_string().contains('3'));
        assert!(err.to_string().contains('2'));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(err, Error::Store(StoreError::Database(_))));
    }

    #[test]
    fn test_provider_error_api_key() {
        let err = ProviderError::ApiKeyMissing {
            provider: "openai".to_string(),
        };
        assert!(err.to_string().contains("openai"));
    }

    #[test]
    fn test_search_error_empty_query() {
        let err: Error = SearchError::EmptyQuery.into();
        assert!(matches!(err, Error::Search(SearchError::EmptyQuery)));
    }
}
