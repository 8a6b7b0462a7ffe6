//! Booking page markup
//!
//! Everything that depends on the venue's HTML lives here. The page is a
//! week table rendered as a flat run of slot buttons in row-major order,
//! plus one element stating the date the week starts on.

use chrono::NaiveDate;
use rw_core::SlotStatus;
use scraper::{ElementRef, Html, Selector};

use crate::error::ParseError;

/// One slot button per bookable interval
const SLOT_SELECTOR: &str = "div.col-lg-12-5.text-center";

/// Element stating the first date of the rendered week
const WEEK_START_SELECTOR: &str = "[data-week-start]";
const WEEK_START_ATTR: &str = "data-week-start";

/// Checked in order against the button's class tokens
const STATUS_TOKENS: [(&str, SlotStatus); 4] = [
    ("reservationUnavailableButton", SlotStatus::Unavailable),
    ("reservationReservedButton", SlotStatus::Reserved),
    ("reservationAvailableButton", SlotStatus::Available),
    ("reservationLastMinuteButton", SlotStatus::LastMinute),
];

/// Decoded content of one weekly booking page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekPage {
    /// Date of the first column, as stated by the venue
    pub week_start: NaiveDate,
    /// One status per slot button, in document order
    pub markers: Vec<SlotStatus>,
}

/// Decode a weekly booking page
pub fn parse_week_page(html: &str) -> Result<WeekPage, ParseError> {
    let document = Html::parse_document(html);

    let week_start = extract_week_start(&document)?;

    let slot_selector = selector(SLOT_SELECTOR)?;
    let markers: Vec<SlotStatus> = document.select(&slot_selector).map(marker_status).collect();

    if markers.is_empty() {
        return Err(ParseError::NoSlots);
    }

    Ok(WeekPage { week_start, markers })
}

/// Map a class attribute string to a status
///
/// Unmatched or empty input is `Unknown`.
pub fn classify_marker(classes: &str) -> SlotStatus {
    STATUS_TOKENS
        .iter()
        .find(|(token, _)| classes.contains(token))
        .map(|(_, status)| *status)
        .unwrap_or(SlotStatus::Unknown)
}

fn selector(css: &str) -> Result<Selector, ParseError> {
    Selector::parse(css).map_err(|e| ParseError::Selector(format!("{}: {:?}", css, e)))
}

fn extract_week_start(document: &Html) -> Result<NaiveDate, ParseError> {
    let marker_selector = selector(WEEK_START_SELECTOR)?;
    let marker = document
        .select(&marker_selector)
        .next()
        .ok_or(ParseError::MissingWeekStart)?;

    let raw = match marker.value().attr(WEEK_START_ATTR).map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => marker.text().collect::<String>().trim().to_string(),
    };

    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|_| ParseError::InvalidWeekStart(raw))
}

/// Status of a slot button, judged from its own and its children's classes
fn marker_status(button: ElementRef<'_>) -> SlotStatus {
    let classes = button
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter_map(|e| e.value().attr("class"))
        .collect::<Vec<_>>()
        .join(" ");

    classify_marker(&classes)
}
