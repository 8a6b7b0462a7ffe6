//! Availability polling
//!
//! Keeps the shift schedule and the venue grids fresh on their own
//! intervals and reports slot status changes as they are observed.

mod error;
mod poller;

pub use error::{PollError, Result};
pub use poller::{Poller, PollerHandle, SourceFactory};
