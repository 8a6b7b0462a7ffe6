//! Availability grid reconstruction
//!
//! The booking page carries no per-slot timestamps. Slots arrive as a flat,
//! row-major run of buttons: seven per row (one per weekday), each row one
//! fixed step later than the previous. Dates and times are rebuilt from the
//! button's position, the room's opening interval and the week start date
//! stated on the page.

use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use futures::future::join_all;
use rw_core::{BookingSlot, Room, SlotStatus, WeekNumber};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::client::{RawWeekPage, WeekSource};
use crate::error::{RefreshError, WeekError};
use crate::markup::parse_week_page;

/// Columns per row on the booking page
pub const DAYS_PER_WEEK: usize = 7;

/// Time between consecutive rows
pub const ROW_STEP: Duration = Duration::minutes(90);

/// Start and end of the slot at `index` in a week starting on `week_start`
///
/// Row `index / 7` is the opening interval moved forward by one row step per
/// completed row. Rows running past midnight carry over to the next date.
pub fn slot_times_for_index(
    index: usize,
    week_start: NaiveDate,
    opening: (NaiveTime, NaiveTime),
) -> (NaiveDateTime, NaiveDateTime) {
    let rows = (index / DAYS_PER_WEEK) as i32;
    let start = date_for_index(index, week_start).and_time(opening.0) + ROW_STEP * rows;
    (start, start + (opening.1 - opening.0))
}

/// Date of the slot at `index`
pub fn date_for_index(index: usize, week_start: NaiveDate) -> NaiveDate {
    week_start + Duration::days((index % DAYS_PER_WEEK) as i64)
}

/// Turn one page's status markers into dated, timed slots
///
/// Output is in document (row-major) order. Rooms without an opening
/// interval produce no slots.
pub fn build_week_slots(room: Room, week_start: NaiveDate, markers: &[SlotStatus]) -> Vec<BookingSlot> {
    let Some(opening) = room.opening_interval() else {
        return Vec::new();
    };

    markers
        .iter()
        .enumerate()
        .map(|(index, status)| {
            let (start, end) = slot_times_for_index(index, week_start, opening);
            BookingSlot::new(room, start, end, *status)
        })
        .collect()
}

/// Slots with `status`, order preserved
pub fn filter_by_status(slots: &[BookingSlot], status: SlotStatus) -> Vec<BookingSlot> {
    slots.iter().filter(|s| s.status == status).cloned().collect()
}

/// Slots in `room`, order preserved
pub fn filter_by_room(slots: &[BookingSlot], room: Room) -> Vec<BookingSlot> {
    slots.iter().filter(|s| s.room == room).cloned().collect()
}

/// Anything that can answer slot range queries
pub trait SlotSource: Send + Sync {
    /// Slots starting inside `[start, end)`, ordered by date then time
    fn find_slots(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<BookingSlot>;
}

impl<T: SlotSource + ?Sized> SlotSource for Arc<T> {
    fn find_slots(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<BookingSlot> {
        (**self).find_slots(start, end)
    }
}

/// Booking slots of one room across its tracked weeks
///
/// Each week's slots are replaced as a unit. A week that fails to refresh
/// keeps what it had.
pub struct AvailabilityGrid {
    room: Room,
    source: Arc<dyn WeekSource>,
    weeks: RwLock<BTreeSet<WeekNumber>>,
    slots: RwLock<BTreeMap<WeekNumber, Vec<BookingSlot>>>,
    /// Held for the duration of a refresh
    refreshing: Mutex<()>,
}

impl AvailabilityGrid {
    /// Create a grid tracking `weeks` of `room`
    pub fn new(
        room: Room,
        weeks: impl IntoIterator<Item = WeekNumber>,
        source: Arc<dyn WeekSource>,
    ) -> Self {
        Self {
            room,
            source,
            weeks: RwLock::new(weeks.into_iter().collect()),
            slots: RwLock::new(BTreeMap::new()),
            refreshing: Mutex::new(()),
        }
    }

    pub fn room(&self) -> Room {
        self.room
    }

    /// Currently tracked weeks
    pub fn weeks(&self) -> BTreeSet<WeekNumber> {
        self.weeks.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the tracked week set
    ///
    /// Slots of weeks no longer tracked are dropped.
    pub fn track_weeks(&self, weeks: BTreeSet<WeekNumber>) {
        // Lock order: weeks, then slots
        let mut tracked = self.weeks.write().unwrap_or_else(PoisonError::into_inner);
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|week, _| weeks.contains(week));
        *tracked = weeks;
    }

    /// Fetch the raw booking page of one tracked week
    pub async fn fetch_week(&self, week: WeekNumber) -> Result<RawWeekPage, WeekError> {
        let current = WeekNumber::from_date(Local::now().date_naive());
        self.fetch_week_from(week, current).await
    }

    async fn fetch_week_from(
        &self,
        week: WeekNumber,
        current: WeekNumber,
    ) -> Result<RawWeekPage, WeekError> {
        let offset = week
            .weeks_since(current)
            .filter(|offset| *offset >= 0)
            .ok_or(WeekError::PastWeek(week))?;

        Ok(self.source.fetch_week(self.room, offset).await?)
    }

    async fn load_week(
        &self,
        week: WeekNumber,
        current: WeekNumber,
    ) -> Result<Vec<BookingSlot>, WeekError> {
        let page = self.fetch_week_from(week, current).await?;
        let decoded = parse_week_page(&page.html)?;

        if WeekNumber::from_date(decoded.week_start) != week {
            return Err(WeekError::WeekMismatch {
                requested: week,
                reported: decoded.week_start,
            });
        }

        Ok(build_week_slots(self.room, decoded.week_start, &decoded.markers))
    }

    /// Refresh every tracked week relative to today's date
    pub async fn refresh(&self) -> Result<(), RefreshError> {
        self.refresh_at(Local::now().date_naive()).await
    }

    /// Refresh every tracked week, treating `today` as the current date
    ///
    /// Weeks are fetched concurrently. Successful weeks are swapped in
    /// together under one lock; failed weeks keep their previous slots.
    pub async fn refresh_at(&self, today: NaiveDate) -> Result<(), RefreshError> {
        let _guard = self.refreshing.try_lock().map_err(|_| RefreshError::Busy)?;

        let weeks = self.weeks();
        if weeks.is_empty() {
            debug!(room = %self.room, "No weeks tracked, nothing to refresh");
            return Ok(());
        }

        if let Err(e) = self.source.open_session(self.room).await {
            warn!(room = %self.room, "Could not open booking session: {}", e);
            return Err(RefreshError::AllWeeksFailed {
                failed: weeks.into_iter().collect(),
            });
        }

        let current = WeekNumber::from_date(today);
        let results = join_all(weeks.iter().map(|week| async move {
            (*week, self.load_week(*week, current).await)
        }))
        .await;

        let mut fresh = Vec::new();
        let mut failed = Vec::new();
        for (week, result) in results {
            match result {
                Ok(slots) => fresh.push((week, slots)),
                Err(e) => {
                    warn!(room = %self.room, week = %week, "Keeping stale slots: {}", e);
                    failed.push(week);
                }
            }
        }

        let refreshed = fresh.len();
        {
            let tracked = self.weeks.read().unwrap_or_else(PoisonError::into_inner);
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            for (week, week_slots) in fresh {
                if tracked.contains(&week) {
                    slots.insert(week, week_slots);
                }
            }
        }

        if failed.is_empty() {
            info!(room = %self.room, "Refreshed {} week(s)", refreshed);
            Ok(())
        } else if refreshed == 0 {
            Err(RefreshError::AllWeeksFailed { failed })
        } else {
            Err(RefreshError::PartialFailure { failed, refreshed })
        }
    }

    /// Every slot, ordered by date then time
    pub fn slots(&self) -> Vec<BookingSlot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut all: Vec<BookingSlot> = slots.values().flatten().cloned().collect();
        all.sort_by_key(|s| s.start);
        all
    }

    /// Slots of one week in document order
    pub fn week_slots(&self, week: WeekNumber) -> Vec<BookingSlot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(&week).cloned().unwrap_or_default()
    }
}

impl SlotSource for AvailabilityGrid {
    fn find_slots(&self, start: NaiveDateTime, end: NaiveDateTime) -> Vec<BookingSlot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut found: Vec<BookingSlot> = slots
            .values()
            .flatten()
            .filter(|s| s.start >= start && s.start < end)
            .cloned()
            .collect();
        found.sort_by_key(|s| s.start);
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    fn time(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
    }

    fn page_html(week_start: &str, classes: &[&str]) -> String {
        let mut html = format!("<html><body><span data-week-start=\"{}\"></span>", week_start);
        for class in classes {
            html.push_str(&format!(
                "<div class=\"col-lg-12-5 text-center\"><div class=\"well {}\"></div></div>",
                class
            ));
        }
        html.push_str("</body></html>");
        html
    }

    /// Serves canned pages keyed by week offset; missing offsets fail
    struct CannedSource {
        pages: std::sync::Mutex<HashMap<i64, std::result::Result<String, FetchError>>>,
        session: std::result::Result<(), FetchError>,
    }

    impl CannedSource {
        fn new(pages: Vec<(i64, std::result::Result<String, FetchError>)>) -> Self {
            Self {
                pages: std::sync::Mutex::new(pages.into_iter().collect()),
                session: Ok(()),
            }
        }

        fn set(&self, offset: i64, page: std::result::Result<String, FetchError>) {
            self.pages.lock().unwrap().insert(offset, page);
        }
    }

    #[async_trait]
    impl WeekSource for CannedSource {
        async fn open_session(&self, _room: Room) -> crate::error::Result<()> {
            self.session.clone()
        }

        async fn fetch_week(&self, room: Room, week_offset: i64) -> crate::error::Result<RawWeekPage> {
            let page = self
                .pages
                .lock()
                .unwrap()
                .get(&week_offset)
                .cloned()
                .unwrap_or(Err(FetchError::BadStatus(404)))?;
            Ok(RawWeekPage {
                room,
                week_offset,
                html: page,
            })
        }
    }

    #[test]
    fn test_slot_times_for_index() {
        let opening = (time("09:30"), time("10:30"));
        let monday = date("2026-10-19");

        assert_eq!(
            slot_times_for_index(0, monday, opening),
            (at("2026-10-19 09:30"), at("2026-10-19 10:30"))
        );
        assert_eq!(
            slot_times_for_index(6, monday, opening),
            (at("2026-10-25 09:30"), at("2026-10-25 10:30"))
        );
        assert_eq!(
            slot_times_for_index(7, monday, opening),
            (at("2026-10-19 11:00"), at("2026-10-19 12:00"))
        );
        assert_eq!(
            slot_times_for_index(14, monday, opening),
            (at("2026-10-19 12:30"), at("2026-10-19 13:30"))
        );
        assert_eq!(
            slot_times_for_index(7, monday, opening).0 - slot_times_for_index(0, monday, opening).0,
            ROW_STEP
        );
    }

    #[test]
    fn test_date_for_index_wraps_every_seven() {
        let start = date("2026-10-19");
        assert_eq!(date_for_index(0, start), start);
        assert_eq!(date_for_index(6, start), date("2026-10-25"));
        assert_eq!(date_for_index(7, start), start);
        assert_eq!(date_for_index(15, start), date("2026-10-20"));
    }

    #[test]
    fn test_build_week_slots() {
        let markers = vec![SlotStatus::Available; 21];
        let slots = build_week_slots(Room::Bunker, date("2026-10-19"), &markers);

        assert_eq!(slots.len(), 21);
        assert_eq!(slots[0].start, at("2026-10-19 09:30"));
        assert_eq!(slots[0].label, "09:30-10:30");
        assert_eq!(slots[1].start, at("2026-10-20 09:30"));
        assert_eq!(slots[7].start, at("2026-10-19 11:00"));
        assert_eq!(slots[14].start, at("2026-10-19 12:30"));
        assert_eq!(slots[20].label, "12:30-13:30");
        assert_eq!(slots[20].date(), date("2026-10-25"));
    }

    #[test]
    fn test_build_week_slots_zombie_lab_opening() {
        let slots = build_week_slots(Room::ZombieLab, date("2026-10-19"), &[SlotStatus::Reserved; 8]);
        assert_eq!(slots[0].label, "10:00-11:00");
        assert_eq!(slots[7].label, "11:30-12:30");
    }

    #[test]
    fn test_build_week_slots_across_year_boundary() {
        let slots = build_week_slots(Room::Bank, date("2026-12-28"), &[SlotStatus::Available; 7]);
        assert_eq!(slots[4].date(), date("2027-01-01"));
        assert_eq!(slots[6].date(), date("2027-01-03"));
    }

    #[test]
    fn test_build_week_slots_past_midnight() {
        // Row 9 of a 09:30 room runs 23:00-00:00 and ends on the next date
        let slots = build_week_slots(Room::Bank, date("2026-10-19"), &[SlotStatus::Available; 64]);
        let late = &slots[63];
        assert_eq!(late.label, "23:00-00:00");
        assert_eq!(late.start, at("2026-10-19 23:00"));
        assert_eq!(late.end, at("2026-10-20 00:00"));
    }

    #[test]
    fn test_build_week_slots_rows_after_midnight_keep_order() {
        // Row 10 of a 09:30 room starts at 00:30 on the following date
        let slots = build_week_slots(Room::Bank, date("2026-10-19"), &[SlotStatus::Available; 71]);
        let after = &slots[70];
        assert_eq!(after.label, "00:30-01:30");
        assert_eq!(after.start, at("2026-10-20 00:30"));
        assert_eq!(after.end, at("2026-10-20 01:30"));
        assert!(after.start > slots[63].start);
    }

    #[test]
    fn test_build_week_slots_unknown_room() {
        assert!(build_week_slots(Room::Unknown, date("2026-10-19"), &[SlotStatus::Available]).is_empty());
    }

    #[test]
    fn test_filters_preserve_order() {
        let mut slots = build_week_slots(
            Room::Bank,
            date("2026-10-19"),
            &[
                SlotStatus::Available,
                SlotStatus::Reserved,
                SlotStatus::Available,
                SlotStatus::LastMinute,
            ],
        );
        slots.extend(build_week_slots(Room::Bunker, date("2026-10-19"), &[SlotStatus::Available]));

        let available = filter_by_status(&slots, SlotStatus::Available);
        assert_eq!(available.len(), 3);
        assert_eq!(available[0].start, at("2026-10-19 09:30"));
        assert_eq!(available[1].start, at("2026-10-21 09:30"));

        let bank = filter_by_room(&slots, Room::Bank);
        assert_eq!(bank.len(), 4);
        assert!(filter_by_status(&slots, SlotStatus::Unavailable).is_empty());
    }

    #[tokio::test]
    async fn test_refresh_builds_grid() {
        let source = Arc::new(CannedSource::new(vec![(
            0,
            Ok(page_html(
                "2026-10-19",
                &["cp reservationAvailableButton"; 14],
            )),
        )]));
        let grid = AvailabilityGrid::new(Room::Bunker, [WeekNumber::new(2026, 43)], source);

        grid.refresh_at(date("2026-10-21")).await.unwrap();

        let slots = grid.slots();
        assert_eq!(slots.len(), 14);
        assert!(slots.iter().all(|s| s.status == SlotStatus::Available));
        // Date-then-time order
        assert_eq!(slots[0].start, at("2026-10-19 09:30"));
        assert_eq!(slots[1].start, at("2026-10-19 11:00"));
        assert_eq!(slots[2].start, at("2026-10-20 09:30"));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_stale_week() {
        // 2026-W05 starts 2026-01-26, W06 starts 2026-02-02
        let w5 = WeekNumber::new(2026, 5);
        let w6 = WeekNumber::new(2026, 6);
        let today = date("2026-01-27");

        let source = Arc::new(CannedSource::new(vec![
            (0, Ok(page_html("2026-01-26", &["reservationReservedButton"; 7]))),
            (1, Ok(page_html("2026-02-02", &["reservationReservedButton"; 7]))),
        ]));
        let grid = AvailabilityGrid::new(Room::Bank, [w5, w6], source.clone());
        grid.refresh_at(today).await.unwrap();
        assert_eq!(grid.week_slots(w5).len(), 7);

        source.set(0, Err(FetchError::Network("connection reset".to_string())));
        source.set(1, Ok(page_html("2026-02-02", &["cp reservationAvailableButton"; 7])));

        let result = grid.refresh_at(today).await;
        assert_eq!(
            result,
            Err(RefreshError::PartialFailure {
                failed: vec![w5],
                refreshed: 1
            })
        );

        let week5 = grid.week_slots(w5);
        assert_eq!(week5.len(), 7);
        assert!(week5.iter().all(|s| s.status == SlotStatus::Reserved));

        let week6 = grid.week_slots(w6);
        assert!(week6.iter().all(|s| s.status == SlotStatus::Available));
    }

    #[tokio::test]
    async fn test_week_served_for_wrong_offset_is_rejected() {
        // Venue ignores the week parameter and always serves W43
        let w43 = WeekNumber::new(2026, 43);
        let w44 = WeekNumber::new(2026, 44);
        let page = page_html("2026-10-19", &["cp reservationAvailableButton"; 14]);
        let source = Arc::new(CannedSource::new(vec![(0, Ok(page.clone())), (1, Ok(page))]));
        let grid = AvailabilityGrid::new(Room::Bank, [w43, w44], source);

        let result = grid.refresh_at(date("2026-10-21")).await;
        assert_eq!(
            result,
            Err(RefreshError::PartialFailure {
                failed: vec![w44],
                refreshed: 1
            })
        );
        assert!(grid.week_slots(w44).is_empty());

        let tuesday = grid.find_slots(at("2026-10-20 00:00"), at("2026-10-21 00:00"));
        let labels: Vec<&str> = tuesday.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["09:30-10:30", "11:00-12:00"]);
    }

    #[tokio::test]
    async fn test_partial_failure_with_empty_previous_week() {
        let w5 = WeekNumber::new(2026, 5);
        let w6 = WeekNumber::new(2026, 6);

        let source = Arc::new(CannedSource::new(vec![
            (0, Err(FetchError::Network("timed out".to_string()))),
            (1, Ok(page_html("2026-02-02", &["cp reservationAvailableButton"; 7]))),
        ]));
        let grid = AvailabilityGrid::new(Room::Bank, [w5, w6], source);

        let result = grid.refresh_at(date("2026-01-26")).await;
        assert!(matches!(result, Err(RefreshError::PartialFailure { .. })));
        assert!(grid.week_slots(w5).is_empty());
        assert_eq!(grid.week_slots(w6).len(), 7);
    }

    #[tokio::test]
    async fn test_unparsable_week_keeps_stale_slots() {
        let w43 = WeekNumber::new(2026, 43);
        let source = Arc::new(CannedSource::new(vec![(
            0,
            Ok(page_html("2026-10-19", &["reservationReservedButton"; 7])),
        )]));
        let grid = AvailabilityGrid::new(Room::Bank, [w43], source.clone());
        grid.refresh_at(date("2026-10-19")).await.unwrap();

        source.set(0, Ok("<html><body>Under maintenance</body></html>".to_string()));
        let result = grid.refresh_at(date("2026-10-19")).await;

        assert_eq!(result, Err(RefreshError::AllWeeksFailed { failed: vec![w43] }));
        assert_eq!(grid.week_slots(w43).len(), 7);
    }

    #[tokio::test]
    async fn test_failed_session_keeps_everything() {
        let w43 = WeekNumber::new(2026, 43);
        let mut source = CannedSource::new(vec![]);
        source.session = Err(FetchError::BadStatus(500));
        let grid = AvailabilityGrid::new(Room::Bank, [w43], Arc::new(source));

        let result = grid.refresh_at(date("2026-10-19")).await;
        assert_eq!(result, Err(RefreshError::AllWeeksFailed { failed: vec![w43] }));
    }

    #[tokio::test]
    async fn test_past_week_is_not_fetched() {
        let w42 = WeekNumber::new(2026, 42);
        let source = Arc::new(CannedSource::new(vec![]));
        let grid = AvailabilityGrid::new(Room::Bank, [w42], source);

        let result = grid.fetch_week_from(w42, WeekNumber::new(2026, 43)).await;
        assert_eq!(result, Err(WeekError::PastWeek(w42)));
    }

    #[tokio::test]
    async fn test_refresh_is_skipped_while_busy() {
        let source = Arc::new(CannedSource::new(vec![]));
        let grid = AvailabilityGrid::new(Room::Bank, [WeekNumber::new(2026, 43)], source);

        let _held = grid.refreshing.lock().await;
        let result = grid.refresh_at(date("2026-10-19")).await;
        assert_eq!(result, Err(RefreshError::Busy));
    }

    #[tokio::test]
    async fn test_track_weeks_drops_untracked_slots() {
        let w43 = WeekNumber::new(2026, 43);
        let w44 = WeekNumber::new(2026, 44);
        let source = Arc::new(CannedSource::new(vec![
            (0, Ok(page_html("2026-10-19", &["reservationReservedButton"; 7]))),
            (1, Ok(page_html("2026-10-26", &["reservationReservedButton"; 7]))),
        ]));
        let grid = AvailabilityGrid::new(Room::Bank, [w43, w44], source);
        grid.refresh_at(date("2026-10-19")).await.unwrap();
        assert_eq!(grid.slots().len(), 14);

        grid.track_weeks(BTreeSet::from([w44]));
        assert_eq!(grid.weeks(), BTreeSet::from([w44]));
        assert!(grid.week_slots(w43).is_empty());
        assert_eq!(grid.slots().len(), 7);
    }

    #[tokio::test]
    async fn test_find_slots_window() {
        let source = Arc::new(CannedSource::new(vec![(
            0,
            Ok(page_html("2026-10-19", &["cp reservationAvailableButton"; 42])),
        )]));
        let grid = AvailabilityGrid::new(Room::Bunker, [WeekNumber::new(2026, 43)], source);
        grid.refresh_at(date("2026-10-19")).await.unwrap();

        // Bunker rows: 09:30 11:00 12:30 14:00 15:30 17:00
        let found = grid.find_slots(at("2026-10-20 12:30"), at("2026-10-20 18:00"));
        let labels: Vec<&str> = found.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["12:30-13:30", "14:00-15:00", "15:30-16:30", "17:00-18:00"]);
        assert!(found.iter().all(|s| s.date() == date("2026-10-20")));

        assert!(grid.find_slots(at("2026-10-20 18:00"), at("2026-10-20 20:00")).is_empty());
    }
}
