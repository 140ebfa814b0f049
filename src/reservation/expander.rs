//! Expansion of an availability window into fixed-size slots.

use chrono::{Duration, NaiveDate, NaiveTime, Timelike};
use uuid::Uuid;

use super::ReservationError;
use crate::models::{hhmm, NewSlot};

/// Length of one slot.
pub const GRANULARITY_MINUTES: i64 = 15;

pub fn granularity() -> Duration {
    Duration::minutes(GRANULARITY_MINUTES)
}

/// Where a window closes. `24:00` is only meaningful as an end boundary and
/// has no `NaiveTime` of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowEnd {
    At(NaiveTime),
    Midnight,
}

fn is_end_of_day(raw: &str) -> bool {
    matches!(raw.trim(), "24:00" | "24:00:00")
}

/// Parses the raw window boundaries and expands them. The end may be `24:00`,
/// which closes the window at midnight.
pub fn expand_raw_window(
    owner_id: Uuid,
    day: NaiveDate,
    window_start: &str,
    window_end: &str,
) -> Result<Vec<NewSlot>, ReservationError> {
    let start = hhmm::parse(window_start).ok_or(ReservationError::InvalidWindow)?;
    let end = if is_end_of_day(window_end) {
        WindowEnd::Midnight
    } else {
        WindowEnd::At(hhmm::parse(window_end).ok_or(ReservationError::InvalidWindow)?)
    };
    expand(owner_id, day, start, end)
}

/// Covers `[start, end)` with contiguous slots. A trailing remainder shorter
/// than one slot is dropped.
pub fn expand_window(
    owner_id: Uuid,
    day: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<Vec<NewSlot>, ReservationError> {
    expand(owner_id, day, start, WindowEnd::At(end))
}

fn expand(
    owner_id: Uuid,
    day: NaiveDate,
    start: NaiveTime,
    end: WindowEnd,
) -> Result<Vec<NewSlot>, ReservationError> {
    if let WindowEnd::At(end) = end {
        if start >= end {
            return Err(ReservationError::InvalidWindow);
        }
    }

    let step = granularity();
    let mut slots = Vec::new();
    let mut cursor = start;

    loop {
        // overflowing_add_signed reports a wrap past midnight as a non-zero
        // day offset. Only a step landing exactly on midnight fits, and only
        // when the window runs to the end of the day.
        let (next, wrapped) = cursor.overflowing_add_signed(step);
        let fits = match end {
            WindowEnd::At(end) => wrapped == 0 && next <= end,
            WindowEnd::Midnight => wrapped == 0 || next.num_seconds_from_midnight() == 0,
        };
        if !fits {
            break;
        }

        slots.push(NewSlot {
            owner_id,
            day,
            start_time: cursor,
            end_time: next,
        });
        if wrapped != 0 {
            break;
        }
        cursor = next;
    }

    Ok(slots)
}
