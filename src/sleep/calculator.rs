//! Sleep timing arithmetic.
//!
//! Everything here is a pure function of its arguments. The current time is
//! always passed in; callers that want the wall clock use
//! `Local::now().time()` at the call site.

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use tracing::debug;

use crate::sleep::model::{BedtimeRecord, SleepQuality, TimeDifference, WakeTimeSource};

/// Number of history entries folded into the average bedtime.
pub const AVERAGE_WINDOW: usize = 7;

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TimeParseError {
    #[error("invalid time '{0}', expected HH:MM or HH:MM:SS")]
    Time(String),
    #[error("invalid local datetime '{0}', expected YYYY-MM-DDTHH:MM[:SS]")]
    DateTime(String),
}

/// Picks the wake time the prediction counts down to.
///
/// The user-configured string is parsed first (degrading to `fallback`) so
/// that a missing system alarm can fall back to it.
pub fn resolve_wake_time(
    use_system_alarm: bool,
    next_system_alarm: Option<NaiveTime>,
    user_time: Option<&str>,
    fallback: NaiveTime,
) -> (NaiveTime, WakeTimeSource) {
    let parsed = parse_time(user_time, Some(fallback));

    if !use_system_alarm {
        return (parsed, WakeTimeSource::UserDefined);
    }

    debug!(?next_system_alarm, "resolving wake time from system alarm");
    match next_system_alarm {
        Some(alarm) => (alarm, WakeTimeSource::SystemAlarm),
        None => (parsed, WakeTimeSource::UserDefined),
    }
}

pub fn parse_time(input: Option<&str>, fallback: Option<NaiveTime>) -> NaiveTime {
    parse_time_or_none(input).unwrap_or(fallback.unwrap_or(NaiveTime::MIN))
}

pub fn parse_time_or_none(input: Option<&str>) -> Option<NaiveTime> {
    parse_time_strict(input?).ok()
}

pub fn parse_time_strict(input: &str) -> Result<NaiveTime, TimeParseError> {
    if !has_clock_shape(input) {
        return Err(TimeParseError::Time(input.to_string()));
    }
    NaiveTime::parse_from_str(input, "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M:%S"))
        .or_else(|_| NaiveTime::parse_from_str(input, "%H:%M"))
        .ok()
        // chrono encodes second 60 as nanos past 1e9.
        .filter(|time| time.nanosecond() < 1_000_000_000)
        .ok_or_else(|| TimeParseError::Time(input.to_string()))
}

/// Accepts ISO local datetimes with or without seconds, the way stored
/// bedtimes are written.
pub fn parse_date_time_strict(input: &str) -> Result<NaiveDateTime, TimeParseError> {
    NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(input, "%Y-%m-%dT%H:%M"))
        .map_err(|_| TimeParseError::DateTime(input.to_string()))
}

fn has_clock_shape(input: &str) -> bool {
    let bytes = input.as_bytes();
    let two_digits = |at: usize| {
        bytes
            .get(at..at + 2)
            .is_some_and(|pair| pair.iter().all(u8::is_ascii_digit))
    };
    if !(two_digits(0) && bytes.get(2) == Some(&b':') && two_digits(3)) {
        return false;
    }
    match bytes.get(5) {
        None => true,
        Some(b':') => two_digits(6),
        Some(_) => false,
    }
}

/// Time remaining until the next occurrence of `target`.
///
/// A target earlier in the day than `now` is taken to mean tomorrow.
pub fn time_until(target: NaiveTime, now: NaiveTime) -> TimeDifference {
    let mut duration = target.signed_duration_since(now);
    if target < now {
        duration = duration + chrono::Duration::days(1);
    }
    split_rounding_up(duration)
}

/// Elapsed time between two same-day events. No day wraparound: a `later`
/// that precedes `earlier` counts as zero elapsed time.
pub fn elapsed_between(earlier: NaiveTime, later: NaiveTime) -> TimeDifference {
    let duration = later
        .signed_duration_since(earlier)
        .max(chrono::Duration::zero());
    split_rounding_up(duration)
}

// Minutes are shown rounded up to the next whole minute.
fn split_rounding_up(duration: chrono::Duration) -> TimeDifference {
    let hours = duration.num_hours();
    let minutes = (duration - chrono::Duration::hours(hours)).num_minutes() + 1;
    let hours = u32::try_from(hours).unwrap_or(0);
    if minutes >= 60 {
        TimeDifference::new(hours + 1, 0)
    } else {
        TimeDifference::new(hours, u32::try_from(minutes).unwrap_or(0))
    }
}

pub fn classify_sleep_quality(sleep_time: TimeDifference) -> SleepQuality {
    match sleep_time.hours {
        8.. => SleepQuality::Good,
        7 => SleepQuality::Medium,
        _ => SleepQuality::Poor,
    }
}

/// Mean time-of-day of the first [`AVERAGE_WINDOW`] entries.
///
/// Unreadable (`None`) entries contribute nothing to the sum but still count
/// towards the divisor.
pub fn average_bedtime(bedtimes: &[Option<BedtimeRecord>]) -> Option<NaiveTime> {
    if bedtimes.is_empty() {
        return None;
    }
    let window = &bedtimes[..bedtimes.len().min(AVERAGE_WINDOW)];
    let total_seconds: u64 = window
        .iter()
        .flatten()
        .map(|record| u64::from(record.timestamp.time().num_seconds_from_midnight()))
        .sum();
    let average_seconds = total_seconds / window.len() as u64;
    NaiveTime::from_num_seconds_from_midnight_opt(u32::try_from(average_seconds).ok()?, 0)
}

/// `7:30 AM`
pub fn format_clock_time(time: NaiveTime) -> String {
    time.format("%-I:%M %p").to_string()
}

/// `Fri 16`
pub fn format_day(timestamp: NaiveDateTime) -> String {
    timestamp.format("%a %-d").to_string()
}

/// `Fri 11:41 PM`
pub fn format_day_time(timestamp: NaiveDateTime) -> String {
    timestamp.format("%a %-I:%M %p").to_string()
}

/// Storage form for times-of-day kept in settings.
pub fn format_storage_time(time: NaiveTime) -> String {
    time.format("%H:%M:%S").to_string()
}
