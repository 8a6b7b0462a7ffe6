//! iCalendar feed decoding

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ical::parser::ical::component::IcalEvent;
use rw_core::ShiftEvent;
use std::io::BufReader;
use tracing::debug;

use crate::error::{IngestError, Result};

/// A DTSTART/DTEND value before local normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedTime {
    /// `...Z` values
    Utc(NaiveDateTime),
    /// Floating, TZID-qualified or date-only values
    Local(NaiveDateTime),
}

impl FeedTime {
    fn parse(value: &str) -> Option<Self> {
        let value = value.trim();

        if let Some(utc) = value.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                .ok()
                .map(FeedTime::Utc);
        }

        if value.contains('T') {
            return NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
                .ok()
                .map(FeedTime::Local);
        }

        NaiveDate::parse_from_str(value, "%Y%m%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(FeedTime::Local)
    }

    fn to_local(self, offset: Duration) -> NaiveDateTime {
        match self {
            FeedTime::Utc(t) => t + offset,
            FeedTime::Local(t) => t,
        }
    }
}

/// Decode every VEVENT of a feed into shifts
///
/// UTC timestamps are moved by `offset` (local minus UTC). Events without a
/// usable SUMMARY/DTSTART/DTEND, or ending before they start, are skipped.
pub(crate) fn parse_feed(feed: &[u8], offset: Duration) -> Result<Vec<ShiftEvent>> {
    let parser = ical::IcalParser::new(BufReader::new(feed));

    let mut calendars = 0usize;
    let mut shifts = Vec::new();

    for calendar in parser {
        let calendar = calendar.map_err(|e| IngestError::MalformedFeed(e.to_string()))?;
        calendars += 1;

        for event in &calendar.events {
            match shift_from_event(event, offset) {
                Some(shift) => shifts.push(shift),
                None => debug!("Skipping calendar event without a usable time range"),
            }
        }
    }

    if calendars == 0 {
        return Err(IngestError::MalformedFeed(
            "no VCALENDAR component found".to_string(),
        ));
    }

    Ok(shifts)
}

fn shift_from_event(event: &IcalEvent, offset: Duration) -> Option<ShiftEvent> {
    let mut summary = String::new();
    let mut start = None;
    let mut end = None;

    for property in &event.properties {
        let Some(value) = property.value.as_deref() else {
            continue;
        };
        match property.name.as_str() {
            "SUMMARY" => summary = value.to_string(),
            "DTSTART" => start = FeedTime::parse(value),
            "DTEND" => end = FeedTime::parse(value),
            _ => {}
        }
    }

    let start = start?.to_local(offset);
    let end = end?.to_local(offset);

    if end <= start {
        return None;
    }

    Some(ShiftEvent::new(summary, start, end))
}
