//! rw-venue: venue booking availability for roomwhen
//!
//! The venue publishes its bookings only as server-rendered weekly pages.
//! This crate fetches those pages, rebuilds a dated slot grid per room and
//! answers range queries over it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rw_venue::{AvailabilityGrid, SlotSource, VenueClient};
//!
//! let client = Arc::new(VenueClient::new(&config.venue)?);
//! let grid = AvailabilityGrid::new(Room::Bunker, weeks, client);
//!
//! if let Err(e) = grid.refresh().await {
//!     tracing::warn!("Serving stale slots: {}", e);
//! }
//! let slots = grid.find_slots(shift.start, shift.end);
//! ```

pub mod client;
pub mod error;
pub mod grid;
pub mod markup;

pub use client::{RawWeekPage, VenueClient, WeekSource};
pub use error::{FetchError, ParseError, RefreshError, WeekError};
pub use grid::{
    AvailabilityGrid, ROW_STEP, SlotSource, build_week_slots, filter_by_room, filter_by_status,
    slot_times_for_index,
};
pub use markup::{WeekPage, parse_week_page};
