//! Time-window policy: "is this event over" and "can it still be booked".
//!
//! Everything here is a pure function of the event's schedule fields, the
//! current instant and the venue's UTC offset. Schedule fields are stored as
//! venue-local wall-clock values, so every instant is resolved through the
//! configured [`FixedOffset`] before it is compared with `now`.

use crate::types::Event;
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::fmt;

/// Booking closes this many minutes before the event starts.
pub const BOOKING_CUTOFF_MINUTES: i64 = 30;

/// Why booking is open or closed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowReason {
    /// Booking is open
    Open,
    /// Start date or start time is absent
    MissingSchedule,
    /// Start time could not be parsed
    InvalidStartTime,
    /// Inside the cutoff, or the event already started
    Closed,
}

impl fmt::Display for WindowReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Open => "booking is allowed",
            Self::MissingSchedule => "missing schedule",
            Self::InvalidStartTime => "invalid event start time",
            Self::Closed => "booking closed: event starts in less than 30 minutes",
        };
        f.write_str(text)
    }
}

/// Result of [`booking_window`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BookingWindow {
    /// Whether tickets may be sold right now
    pub allowed: bool,
    /// Why
    pub reason: WindowReason,
}

impl BookingWindow {
    const fn open() -> Self {
        Self {
            allowed: true,
            reason: WindowReason::Open,
        }
    }

    const fn closed(reason: WindowReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

#[derive(Clone, Copy)]
enum Meridiem {
    Am,
    Pm,
}

/// Parse a time of day in `"HH:MM"` (24-hour) or `"h:MM AM"` (12-hour) form.
///
/// The AM/PM suffix is case-insensitive and may be separated by whitespace;
/// surrounding whitespace is ignored. `12 AM` is midnight and `12 PM` is noon.
/// The 12-hour form also accepts a bare hour (`"7 PM"`). Anything else
/// yields `None`.
#[must_use]
pub fn parse_time_of_day(input: &str) -> Option<NaiveTime> {
    let normalized = input.trim().to_ascii_lowercase();

    let (clock, meridiem) = if let Some(rest) = normalized.strip_suffix("am") {
        (rest.trim_end(), Some(Meridiem::Am))
    } else if let Some(rest) = normalized.strip_suffix("pm") {
        (rest.trim_end(), Some(Meridiem::Pm))
    } else {
        (normalized.as_str(), None)
    };

    let (hour_part, minute_part) = match (clock.split_once(':'), meridiem) {
        (Some((hour, minute)), _) => (hour, minute),
        (None, Some(_)) => (clock, "00"),
        (None, None) => return None,
    };

    let hour = parse_digits(hour_part, 1..=2)?;
    let minute = parse_digits(minute_part, 2..=2)?;

    let hour = match meridiem {
        None => hour,
        Some(_) if !(1..=12).contains(&hour) => return None,
        Some(Meridiem::Am) => hour % 12,
        Some(Meridiem::Pm) => hour % 12 + 12,
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn parse_digits(part: &str, len: std::ops::RangeInclusive<usize>) -> Option<u32> {
    if !len.contains(&part.len()) || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

fn at_local(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    date.and_time(time)
        .and_local_timezone(offset)
        .single()
        .map(|instant| instant.with_timezone(&Utc))
}

fn last_instant_of(date: NaiveDate, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999)?;
    at_local(date, last, offset)
}

/// Start instant of the event, `None` if the date or time is absent or unparseable.
#[must_use]
pub fn start_instant(event: &Event, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let date = event.start_date?;
    let time = parse_time_of_day(event.start_time.as_deref()?)?;
    at_local(date, time, offset)
}

/// Instant after which the event is over.
///
/// The fallback chain is applied strictly in order:
/// 1. end date, with the end time if it parses, else the end date's last instant
/// 2. end time on the start date
/// 3. start date and start time
/// 4. the start date's last instant, when no time of day is known at all
///
/// `None` means the end is unknown.
#[must_use]
pub fn effective_end(event: &Event, offset: FixedOffset) -> Option<DateTime<Utc>> {
    if let Some(end_date) = event.end_date {
        return match event.end_time.as_deref().and_then(parse_time_of_day) {
            Some(end_time) => at_local(end_date, end_time, offset),
            None => last_instant_of(end_date, offset),
        };
    }

    let start_date = event.start_date?;

    if let Some(end_time) = event.end_time.as_deref() {
        return at_local(start_date, parse_time_of_day(end_time)?, offset);
    }

    if let Some(start_time) = event.start_time.as_deref() {
        return at_local(start_date, parse_time_of_day(start_time)?, offset);
    }

    last_instant_of(start_date, offset)
}

/// An event is past once `now` is strictly after its effective end.
///
/// Events whose end cannot be determined are never past.
#[must_use]
pub fn is_event_past(event: &Event, now: DateTime<Utc>, offset: FixedOffset) -> bool {
    effective_end(event, offset).is_some_and(|end| now > end)
}

/// Decide whether tickets may be sold at `now`.
///
/// Booking is open iff `now` is strictly before `start - 30 minutes`.
#[must_use]
pub fn booking_window(event: &Event, now: DateTime<Utc>, offset: FixedOffset) -> BookingWindow {
    let (Some(date), Some(time)) = (event.start_date, event.start_time.as_deref()) else {
        return BookingWindow::closed(WindowReason::MissingSchedule);
    };

    let Some(start) = parse_time_of_day(time).and_then(|time| at_local(date, time, offset)) else {
        return BookingWindow::closed(WindowReason::InvalidStartTime);
    };

    if now < start - Duration::minutes(BOOKING_CUTOFF_MINUTES) {
        BookingWindow::open()
    } else {
        BookingWindow::closed(WindowReason::Closed)
    }
}

/// Gates close (and booking stops) 30 minutes before the start instant.
#[must_use]
pub fn gate_closing_time(event: &Event, offset: FixedOffset) -> Option<DateTime<Utc>> {
    start_instant(event, offset).map(|start| start - Duration::minutes(BOOKING_CUTOFF_MINUTES))
}
