//! Domain models shared by the schedule, venue and matcher crates

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue room a shift is worked in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Room {
    ZombieLab,
    Bank,
    Bunker,
    /// Summary matched no keyword. Never has a grid.
    Unknown,
}

/// Scanned in order, first hit wins.
const ROOM_KEYWORDS: [(&str, Room); 3] = [
    ("zombie", Room::ZombieLab),
    ("bank", Room::Bank),
    ("bunker", Room::Bunker),
];

impl Room {
    /// Every room the venue takes bookings for
    pub const KNOWN: [Room; 3] = [Room::ZombieLab, Room::Bank, Room::Bunker];

    /// Classify a free-text calendar summary
    ///
    /// Case-insensitive keyword scan. Total: anything unmatched is `Unknown`.
    pub fn classify(summary: &str) -> Self {
        let lower = summary.to_lowercase();
        ROOM_KEYWORDS
            .iter()
            .find(|(keyword, _)| lower.contains(keyword))
            .map(|(_, room)| *room)
            .unwrap_or(Room::Unknown)
    }

    /// Identifier the venue uses for this room in its booking URLs
    pub fn game_slug(&self) -> Option<&'static str> {
        match self {
            Room::ZombieLab => Some("zombie_lab"),
            Room::Bank => Some("bank"),
            Room::Bunker => Some("bunker"),
            Room::Unknown => None,
        }
    }

    /// First bookable interval of the day
    pub fn opening_interval(&self) -> Option<(NaiveTime, NaiveTime)> {
        let (hour, minute) = match self {
            Room::Bank | Room::Bunker => (9, 30),
            Room::ZombieLab => (10, 0),
            Room::Unknown => return None,
        };
        let start = NaiveTime::from_hms_opt(hour, minute, 0)?;
        Some((start, start + Duration::hours(1)))
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Room::Unknown)
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.game_slug().unwrap_or("unknown"))
    }
}

/// One shift from the personal calendar feed
///
/// Timestamps are naive local wall-clock times.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftEvent {
    /// Raw feed summary, drives room classification
    pub summary: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl ShiftEvent {
    /// Create a new shift event
    pub fn new(summary: impl Into<String>, start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self {
            summary: summary.into(),
            start,
            end,
        }
    }

    /// Room this shift takes place in
    pub fn room(&self) -> Room {
        Room::classify(&self.summary)
    }

    /// ISO week containing the end of the shift
    pub fn week(&self) -> WeekNumber {
        WeekNumber::from_date(self.end.date())
    }
}

/// Booking status of a single slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Reserved,
    Unavailable,
    LastMinute,
    #[default]
    Unknown,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SlotStatus::Available => "Available",
            SlotStatus::Reserved => "Reserved",
            SlotStatus::Unavailable => "Unavailable",
            SlotStatus::LastMinute => "Last Minute",
            SlotStatus::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

/// One reservable interval at a venue room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingSlot {
    pub room: Room,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub status: SlotStatus,
    /// `HH:MM-HH:MM`, equal for the same row in every week
    pub label: String,
}

impl BookingSlot {
    /// Create a slot; the label is derived from the times of day
    pub fn new(room: Room, start: NaiveDateTime, end: NaiveDateTime, status: SlotStatus) -> Self {
        Self {
            room,
            start,
            end,
            status,
            label: slot_label(start.time(), end.time()),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.start.date()
    }
}

/// Format a slot label from its start and end time of day
pub fn slot_label(start: NaiveTime, end: NaiveTime) -> String {
    format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
}

/// Year-qualified ISO 8601 week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WeekNumber {
    pub year: i32,
    pub week: u32,
}

impl WeekNumber {
    pub fn new(year: i32, week: u32) -> Self {
        Self { year, week }
    }

    /// ISO week containing `date`
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Monday of this week, `None` if the week does not exist in its year
    pub fn monday(&self) -> Option<NaiveDate> {
        NaiveDate::from_isoywd_opt(self.year, self.week, Weekday::Mon)
    }

    /// Whole weeks from `origin` to `self` (negative when `self` is earlier)
    pub fn weeks_since(&self, origin: WeekNumber) -> Option<i64> {
        let days = (self.monday()? - origin.monday()?).num_days();
        Some(days / 7)
    }
}

impl fmt::Display for WeekNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-W{:02}", self.year, self.week)
    }
}
