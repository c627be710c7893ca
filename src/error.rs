//! Error types for the playlist-history library.
//!
//! This module provides custom error types using `thiserror`. Variants fall
//! into three groups: configuration errors that abort a run, collaborator I/O
//! failures that are surfaced unchanged, and a catch-all. Data-quality issues
//! are never errors; they are counted in the run summary instead.

use thiserror::Error;

/// Errors that can occur while building or persisting a run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The requested time-bucket size is not implemented
    #[error("granularity {0} is not supported")]
    UnsupportedGranularity(String),

    /// A log builder received intervals partitioned at a different granularity
    #[error("granularity mismatch: builder expects {expected}, intervals are {actual}")]
    GranularityMismatch {
        /// Granularity the builder was configured with
        expected: String,
        /// Granularity of the interval sequence it was given
        actual: String,
    },

    /// A join references an identifier registry that was never built
    #[error("identifier registry not built: {0}")]
    MissingRegistry(String),

    /// A row lacks an attribute that a required join depends on
    #[error("row {row} is missing required attribute {column}")]
    MissingAttribute {
        /// Attribute name
        column: String,
        /// Position of the row in the input
        row: usize,
    },

    /// A table definition references a column nothing produces
    #[error("table {table} references unknown column {column}")]
    UnknownColumn {
        /// Table being defined
        table: String,
        /// Offending column
        column: String,
    },

    /// A declarative definition is malformed
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    /// A value cannot be used as a key (for example a float)
    #[error("column {column} holds a value that cannot be used as a key: {value}")]
    UnkeyableValue {
        /// Attribute name
        column: String,
        /// Rendered value
        value: String,
    },

    /// No ingestor is registered under the requested name
    #[error("ingestor_type must be one of {valid:?}, got {name}")]
    UnknownIngestor {
        /// Requested name
        name: String,
        /// Registered names
        valid: Vec<String>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The raw input location does not exist or cannot be opened
    #[error("source {0} is unavailable")]
    SourceUnavailable(String),

    /// The raw input could be read but not understood
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// An observation timestamp could not be parsed
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reading or writing errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A concurrently running log builder failed to complete
    #[error("log builder task failed: {0}")]
    Task(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// True for errors caused by definitions or settings rather than data or I/O.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedGranularity(_)
                | Self::GranularityMismatch { .. }
                | Self::MissingRegistry(_)
                | Self::MissingAttribute { .. }
                | Self::UnknownColumn { .. }
                | Self::InvalidDefinition(_)
                | Self::UnkeyableValue { .. }
                | Self::UnknownIngestor { .. }
                | Self::InvalidConfig(_)
        )
    }
}

/// Convenience type alias for Result with `PipelineError`
pub type Result<T> = std::result::Result<T, PipelineError>;

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Task(err.to_string())
    }
}
