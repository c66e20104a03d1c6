//! Error types for svip-migrate.
//!
//! Errors fall into three scopes. Setup errors (connection, health check,
//! cursor open, and a strict count) abort the whole run. Decode errors skip a
//! single closure record. Insert errors and timeouts affect a single write and
//! never leave the worker that produced them.

use thiserror::Error;

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a migration run.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (config file, report file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error.
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Could not connect to the store or the health check failed.
    #[error("Source connection error: {0}")]
    SourceConnection(String),

    /// Counting the source collection failed.
    #[error("Count of '{collection}' failed: {message}")]
    Count {
        /// Source collection name.
        collection: String,
        /// Store error message.
        message: String,
    },

    /// Opening the streaming cursor failed.
    #[error("Cursor open on '{collection}' failed: {message}")]
    CursorOpen {
        /// Source collection name.
        collection: String,
        /// Store error message.
        message: String,
    },

    /// The cursor failed while the stream was being consumed.
    #[error("Cursor read failed: {0}")]
    CursorRead(String),

    /// A single source document could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// A target document could not be encoded.
    #[error("Encode error: {0}")]
    Encode(String),

    /// A single insert was rejected by the store.
    #[error("Insert into '{collection}' failed: {message}")]
    Insert {
        /// Destination collection name.
        collection: String,
        /// Store error message.
        message: String,
    },

    /// A single insert did not finish within the configured timeout.
    #[error("Insert into '{collection}' timed out after {timeout:?}")]
    InsertTimeout {
        /// Destination collection name.
        collection: String,
        /// Configured timeout.
        timeout: std::time::Duration,
    },
}

impl Error {
    /// Returns `true` for errors that terminate the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Decode(_)
                | Error::Encode(_)
                | Error::Insert { .. }
                | Error::InsertTimeout { .. }
        )
    }

    /// Builds an [`Error::Insert`] from any displayable store error.
    pub fn insert(collection: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Error::Insert {
            collection: collection.into(),
            message: err.to_string(),
        }
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::Decode(err.to_string())
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Error::Encode(err.to_string())
    }
}
