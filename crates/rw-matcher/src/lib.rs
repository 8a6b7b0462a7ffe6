//! rw-matcher: shift-to-slot matching and change detection
//!
//! Joins the shifts from `rw-calendar` with the per-room grids from
//! `rw-venue`, and remembers what each slot looked like last time so that
//! status transitions can be reported.

mod matcher;

pub use matcher::{AvailabilityMatcher, ChangeEvent, MATCH_SLACK, MatchResult};
