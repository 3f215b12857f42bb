//! Error types for the quality harness library.
//!
//! Library modules return [`Result<T>`] with a [`QualityError`]; the CLI and
//! server glue wrap these in `anyhow` with additional context.
//!
//! Not every variant aborts an operation. Connection, timeout and check
//! execution failures are folded into a check's `error` status by the
//! assessment aggregator, and [`QualityError::IndexNotBuilt`] is surfaced by
//! the ranker as an empty result plus a diagnostic.

use thiserror::Error;

/// Main error type for quality harness operations.
#[derive(Debug, Error)]
pub enum QualityError {
    /// The data source could not be reached or refused the request.
    #[error("connection to '{source_name}' failed: {message}")]
    Connection {
        source_name: String,
        message: String,
    },

    /// A single check failed while executing.
    #[error("check '{check}' failed: {message}")]
    CheckExecution { check: String, message: String },

    /// A search was issued before any index build.
    #[error("index '{collection}' has not been built")]
    IndexNotBuilt { collection: String },

    /// A bounded operation exceeded its deadline.
    #[error("{what} timed out after {secs}s")]
    Timeout { what: String, secs: u64 },

    /// The catalog could not be enumerated at all.
    #[error("catalog error: {0}")]
    Catalog(String),

    /// Invalid or inconsistent configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The embedding provider failed or is disabled.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// No source is configured or registered under this name.
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// Report format not supported.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QualityError {
    /// Shorthand for a [`QualityError::Connection`].
    pub fn connection(source_name: impl Into<String>, message: impl ToString) -> Self {
        QualityError::Connection {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for quality harness operations.
pub type Result<T> = std::result::Result<T, QualityError>;
