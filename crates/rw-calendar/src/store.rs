//! Shift schedule store

use chrono::{Duration, Local, NaiveDateTime, Utc};
use rw_core::{Room, ShiftEvent, WeekNumber};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use crate::client::FeedClient;
use crate::error::Result;
use crate::feed::parse_feed;

/// Upcoming shifts parsed from the calendar feed
///
/// The event list is replaced as a whole on every successful ingest and kept
/// untouched when an ingest fails.
#[derive(Debug, Clone, Default)]
pub struct ScheduleStore {
    events: Vec<ShiftEvent>,
}

impl ScheduleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `events` as given
    pub fn from_events(events: Vec<ShiftEvent>) -> Self {
        Self { events }
    }

    /// Parse a feed payload and replace the event list
    ///
    /// The local-vs-UTC offset and "now" are sampled once for the whole call.
    pub fn ingest(&mut self, feed: &[u8]) -> Result<&[ShiftEvent]> {
        let now_utc = Utc::now();
        let now_local = now_utc.with_timezone(&Local).naive_local();
        let offset = now_local - now_utc.naive_utc();

        self.ingest_with_offset(feed, offset, now_local)
    }

    /// Parse a feed payload using an explicit offset and clock
    ///
    /// Only shifts whose end is strictly after `now` are kept.
    pub fn ingest_with_offset(
        &mut self,
        feed: &[u8],
        offset: Duration,
        now: NaiveDateTime,
    ) -> Result<&[ShiftEvent]> {
        let parsed = parse_feed(feed, offset)?;
        let total = parsed.len();

        let mut events: Vec<ShiftEvent> = parsed.into_iter().filter(|e| e.end > now).collect();
        events.sort_by_key(|e| e.end);

        info!(
            "Ingested {} upcoming shifts ({} already ended)",
            events.len(),
            total - events.len()
        );

        self.events = events;
        Ok(&self.events)
    }

    /// Fetch the feed and ingest it
    ///
    /// On any failure the previous events stay in place.
    pub async fn refresh(&mut self, client: &FeedClient) -> Result<&[ShiftEvent]> {
        let fetched = client.fetch().await;
        self.ingest_fetched(fetched)
    }

    /// Ingest the outcome of a feed fetch made elsewhere
    ///
    /// Lets callers fetch without holding a lock on the store. A failed fetch
    /// or ingest leaves the previous events in place.
    pub fn ingest_fetched(&mut self, fetched: Result<Vec<u8>>) -> Result<&[ShiftEvent]> {
        let body = match fetched {
            Ok(body) => body,
            Err(e) => {
                warn!("Keeping {} cached shifts: {}", self.events.len(), e);
                return Err(e);
            }
        };

        if let Err(e) = self.ingest(&body) {
            warn!("Keeping {} cached shifts: {}", self.events.len(), e);
            return Err(e);
        }

        Ok(&self.events)
    }

    /// Retained events in their stored order
    pub fn events(&self) -> &[ShiftEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events ordered by end time, ties keep insertion order
    pub fn sort_by_end(&self) -> Vec<&ShiftEvent> {
        let mut sorted: Vec<&ShiftEvent> = self.events.iter().collect();
        sorted.sort_by_key(|e| e.end);
        sorted
    }

    /// Drop every event whose end is at or before `now`
    ///
    /// Returns the number of events removed.
    pub fn prune(&mut self, now: NaiveDateTime) -> usize {
        let before = self.events.len();
        self.events.retain(|e| e.end > now);

        let removed = before - self.events.len();
        if removed > 0 {
            debug!("Pruned {} ended shifts", removed);
        }
        removed
    }

    /// `prune` against the local wall clock
    pub fn prune_now(&mut self) -> usize {
        self.prune(Local::now().naive_local())
    }

    /// Room an event takes place in
    pub fn classify_room(event: &ShiftEvent) -> Room {
        event.room()
    }

    /// Events taking place in `room`
    pub fn events_for_room(&self, room: Room) -> impl Iterator<Item = &ShiftEvent> {
        self.events.iter().filter(move |e| e.room() == room)
    }

    /// ISO weeks (of each event's end date) that hold a shift, per room
    pub fn list_room_weeks(&self) -> BTreeMap<Room, BTreeSet<WeekNumber>> {
        let mut weeks: BTreeMap<Room, BTreeSet<WeekNumber>> = BTreeMap::new();
        for event in &self.events {
            weeks.entry(event.room()).or_default().insert(event.week());
        }
        weeks
    }

    /// The earliest-starting retained shift
    pub fn next_event(&self) -> Option<&ShiftEvent> {
        self.events.iter().min_by_key(|e| e.start)
    }
}
