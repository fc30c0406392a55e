//! Error type definitions for the EPG reconciliation engine
//!
//! The hierarchy mirrors the engine's failure surfaces: the persistent
//! match store, upstream sources (feed download, XMLTV parse), and
//! configuration. Non-fatal errors are accumulated by the orchestrator
//! rather than propagated; only configuration and store-open failures
//! abort the run.

use thiserror::Error;

/// Top-level application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Match store errors
    #[error("Store error: {0}")]
    Store(#[from] sqlx::Error),

    /// Source handling errors
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source handling specific errors
#[derive(Error, Debug)]
pub enum SourceError {
    /// Parsing errors for XMLTV source data
    #[error("Parse error: {source_name} - {message}")]
    Parse { source_name: String, message: String },

    /// A required attribute was absent from a source element
    #[error("Missing attribute: {attribute} on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    /// Timestamp that does not follow the XMLTV `YYYYMMDDHHMMSS +hhmm` form
    #[error("Invalid datetime: '{input}'")]
    InvalidDateTime { input: String },

    /// HTTP errors from the sports feed endpoint
    #[error("HTTP error: {status} fetching {url}")]
    Http { status: u16, url: String },
}

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
