//! Error types for rw-venue

use chrono::NaiveDate;
use rw_core::{Room, WeekNumber};
use thiserror::Error;

/// Failure retrieving one booking page
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Transport failure, including timeouts
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected HTTP status: {0}")]
    BadStatus(u16),

    #[error("Room {0} has no booking page")]
    UnknownRoom(Room),
}

/// Booking page markup did not have the expected shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Week start marker not found")]
    MissingWeekStart,

    #[error("Invalid week start date: {0}")]
    InvalidWeekStart(String),

    #[error("No slot buttons found")]
    NoSlots,

    #[error("Invalid selector: {0}")]
    Selector(String),
}

/// Why a single week could not be refreshed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WeekError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Week {0} lies before the current week")]
    PastWeek(WeekNumber),

    /// The venue served a different week than the one asked for
    #[error("Requested week {requested}, venue served week starting {reported}")]
    WeekMismatch {
        requested: WeekNumber,
        reported: NaiveDate,
    },
}

/// Outcome of a grid refresh that did not fully succeed
///
/// Weeks listed in `failed` keep their previous slots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("{} week(s) failed, {refreshed} refreshed", .failed.len())]
    PartialFailure {
        failed: Vec<WeekNumber>,
        refreshed: usize,
    },

    #[error("All {} tracked week(s) failed", .failed.len())]
    AllWeeksFailed { failed: Vec<WeekNumber> },

    /// Another refresh of the same grid is still running
    #[error("Refresh already in progress")]
    Busy,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, FetchError>;
