//! Error types for rw-schedule

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Configuration error: {0}")]
    Config(#[from] rw_core::Error),

    #[error("Feed error: {0}")]
    Feed(#[from] rw_calendar::IngestError),

    #[error("Venue error: {0}")]
    Venue(#[from] rw_venue::FetchError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, PollError>;
