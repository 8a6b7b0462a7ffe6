//! Error types for rw-calendar

use thiserror::Error;

/// Calendar feed ingestion error
#[derive(Error, Debug)]
pub enum IngestError {
    /// Payload is not a calendar document
    #[error("Malformed feed: {0}")]
    MalformedFeed(String),

    /// Feed could not be retrieved
    #[error("Feed source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, IngestError>;
