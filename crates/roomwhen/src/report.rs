//! Plain text rendering of match results and changes

use rw_matcher::{ChangeEvent, MatchResult};
use std::fmt::Write;

/// One block per shift: a `YYYY-MM-DD ROOM` header and a line per slot
pub fn render_matches(results: &[MatchResult]) -> String {
    if results.is_empty() {
        return "No upcoming shifts\n".to_string();
    }

    let mut out = String::new();
    for result in results {
        let _ = writeln!(
            out,
            "{} {}",
            result.window_start.format("%Y-%m-%d"),
            result.room.to_string().to_uppercase()
        );

        if !result.has_grid {
            out.push_str("  no availability for this room\n");
        } else if result.slots.is_empty() {
            out.push_str("  no slots during this shift\n");
        }

        for slot in &result.slots {
            let _ = writeln!(out, "  {}  {}", slot.label, slot.status);
        }
    }
    out
}

pub fn render_change(change: &ChangeEvent) -> String {
    format!(
        "{} {} {}  {} -> {}",
        change.shift_date,
        change.room.to_string().to_uppercase(),
        change.slot_label,
        change.old_status,
        change.new_status
    )
}
