//! Quiet-hours evaluation.
//!
//! Windows are inclusive at both ends. A window whose start is later than
//! its end spans midnight (`22:00`–`08:00`).

use chrono::{NaiveTime, Timelike};

use crate::models::NotificationSettings;

/// Parse `"HH:MM"` (24h) into minutes since midnight.
pub fn parse_hh_mm(value: &str) -> Option<u32> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()?;
    Some(time.hour() * 60 + time.minute())
}

/// Minutes since midnight for a time of day. Seconds are dropped.
pub fn minutes_of_day(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Window membership on minute-of-day values.
pub fn is_within_window(start: u32, end: u32, now: u32) -> bool {
    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}

/// Whether `now` (local time of day) falls inside the configured quiet hours.
///
/// An unparseable window never silences anything.
pub fn is_in_quiet_hours(settings: &NotificationSettings, now: NaiveTime) -> bool {
    if !settings.quiet_hours_enabled {
        return false;
    }

    let (Some(start), Some(end)) = (
        parse_hh_mm(&settings.quiet_hours_start),
        parse_hh_mm(&settings.quiet_hours_end),
    ) else {
        tracing::warn!(
            start = %settings.quiet_hours_start,
            end = %settings.quiet_hours_end,
            "Quiet hours window is not HH:MM, ignoring it"
        );
        return false;
    };

    is_within_window(start, end, minutes_of_day(now))
}
