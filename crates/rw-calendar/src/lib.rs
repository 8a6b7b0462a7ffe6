//! rw-calendar: personal shift calendar for roomwhen
//!
//! Fetches the shift calendar feed, normalizes its timestamps to naive local
//! time and keeps the list of shifts that have not ended yet.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rw_calendar::{FeedClient, ScheduleStore};
//!
//! let client = FeedClient::new("https://example.com/shifts.ics", Duration::from_secs(20))?;
//! let mut store = ScheduleStore::new();
//! store.refresh(&client).await?;
//!
//! for (room, weeks) in store.list_room_weeks() {
//!     println!("{room}: {weeks:?}");
//! }
//! ```

pub mod client;
pub mod error;
mod feed;
pub mod store;

pub use client::FeedClient;
pub use error::{IngestError, Result};
pub use store::ScheduleStore;
