//! Availability matcher

use chrono::{Duration, NaiveDate, NaiveDateTime};
use dashmap::DashMap;
use rw_core::{BookingSlot, Room, ShiftEvent, SlotStatus};
use rw_venue::SlotSource;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

/// Added to a shift's end when querying slots, to absorb clock skew between
/// the feed and the venue
pub const MATCH_SLACK: Duration = Duration::minutes(5);

/// Slots overlapping one shift
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub room: Room,
    pub window_start: NaiveDateTime,
    /// Shift end plus `MATCH_SLACK`
    pub window_end: NaiveDateTime,
    pub slots: Vec<BookingSlot>,
    /// False when the room is unknown or no grid is tracked for it
    pub has_grid: bool,
}

impl MatchResult {
    fn empty(room: Room, window_start: NaiveDateTime, window_end: NaiveDateTime) -> Self {
        Self {
            room,
            window_start,
            window_end,
            slots: Vec::new(),
            has_grid: false,
        }
    }

    /// Slots currently open for booking
    pub fn bookable(&self) -> impl Iterator<Item = &BookingSlot> {
        self.slots
            .iter()
            .filter(|s| matches!(s.status, SlotStatus::Available | SlotStatus::LastMinute))
    }
}

/// A slot whose status differs from the previous observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    pub room: Room,
    pub slot_label: String,
    /// Date the slot takes place on
    pub shift_date: NaiveDate,
    pub old_status: SlotStatus,
    pub new_status: SlotStatus,
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {} -> {}",
            self.shift_date, self.room, self.slot_label, self.old_status, self.new_status
        )
    }
}

type SlotKey = (NaiveDate, String);

/// Matches shifts against availability grids and tracks slot statuses
/// between polls
///
/// Last-seen statuses are partitioned by room; detection for one room never
/// blocks another.
#[derive(Debug, Default)]
pub struct AvailabilityMatcher {
    last_seen: DashMap<Room, HashMap<SlotKey, SlotStatus>>,
}

impl AvailabilityMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slots starting inside the shift window, widened by `MATCH_SLACK`
    pub fn match_shift<S: SlotSource>(
        &self,
        event: &ShiftEvent,
        grids: &HashMap<Room, S>,
    ) -> MatchResult {
        let room = event.room();
        let window_start = event.start;
        let window_end = event.end + MATCH_SLACK;

        if !room.is_known() {
            debug!(summary = %event.summary, "Shift has no known room");
            return MatchResult::empty(room, window_start, window_end);
        }

        let Some(grid) = grids.get(&room) else {
            debug!(room = %room, "No grid tracked for room");
            return MatchResult::empty(room, window_start, window_end);
        };

        MatchResult {
            room,
            window_start,
            window_end,
            slots: grid.find_slots(window_start, window_end),
            has_grid: true,
        }
    }

    /// Compare the shift's slots with their last seen statuses
    ///
    /// A slot seen for the first time is recorded without producing an
    /// event. The stored status is always overwritten.
    pub fn detect_changes<S: SlotSource>(
        &self,
        event: &ShiftEvent,
        grids: &HashMap<Room, S>,
    ) -> Vec<ChangeEvent> {
        let matched = self.match_shift(event, grids);
        self.record(matched.room, &matched.slots)
    }

    /// Record statuses of `slots` and return the transitions
    pub fn record(&self, room: Room, slots: &[BookingSlot]) -> Vec<ChangeEvent> {
        if slots.is_empty() {
            return Vec::new();
        }

        let mut seen = self.last_seen.entry(room).or_default();
        let mut changes = Vec::new();

        for slot in slots {
            let key = (slot.date(), slot.label.clone());
            match seen.insert(key, slot.status) {
                Some(old) if old != slot.status => {
                    info!(
                        room = %room,
                        slot = %slot.label,
                        date = %slot.date(),
                        "Slot changed: {} -> {}",
                        old,
                        slot.status
                    );
                    changes.push(ChangeEvent {
                        room,
                        slot_label: slot.label.clone(),
                        shift_date: slot.date(),
                        old_status: old,
                        new_status: slot.status,
                    });
                }
                _ => {}
            }
        }

        changes
    }

    /// Last recorded status of a slot
    pub fn last_status(&self, room: Room, date: NaiveDate, label: &str) -> Option<SlotStatus> {
        self.last_seen
            .get(&room)
            .and_then(|seen| seen.get(&(date, label.to_string())).copied())
    }

    /// Drop remembered statuses of slots dated before `date`
    pub fn forget_before(&self, date: NaiveDate) {
        for mut seen in self.last_seen.iter_mut() {
            seen.retain(|(slot_date, _), _| *slot_date >= date);
        }
    }
}
