//! rw-core: shared building blocks for roomwhen
//!
//! Domain types that flow between the calendar, venue and matcher crates,
//! plus configuration loading.

pub mod config;
pub mod error;
pub mod models;

pub use config::{Config, FeedConfig, PollConfig, VenueConfig};
pub use error::{Error, Result};
pub use models::{BookingSlot, Room, ShiftEvent, SlotStatus, WeekNumber, slot_label};
