//! Timestamp parsing and grid alignment helpers.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};

/// Base grid resolution in minutes.
pub const BASE_STEP_MINUTES: i64 = 5;

/// Canonical text form used in exports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ACCEPTED_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// The base grid step as a `Duration`.
pub fn base_step() -> Duration {
    Duration::minutes(BASE_STEP_MINUTES)
}

/// Parses a wall-clock timestamp. RFC 3339 offsets are dropped, keeping local time.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn from_epoch_seconds(secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Rounds to the nearest 5-minute boundary; exact halves go to the even multiple.
pub fn round_to_step(ts: NaiveDateTime) -> NaiveDateTime {
    let step = BASE_STEP_MINUTES * 60;
    let secs = ts.and_utc().timestamp();
    let mut q = secs.div_euclid(step);
    let r = secs.rem_euclid(step);
    if r * 2 > step || (r * 2 == step && q.rem_euclid(2) == 1) {
        q += 1;
    }
    from_epoch_seconds(q * step)
}

/// Floors to the enclosing 5-minute boundary.
pub fn floor_to_step(ts: NaiveDateTime) -> NaiveDateTime {
    let step = BASE_STEP_MINUTES * 60;
    let secs = ts.and_utc().timestamp();
    from_epoch_seconds(secs.div_euclid(step) * step)
}

pub fn floor_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_hms_opt(ts.hour(), 0, 0).unwrap_or(ts)
}

pub fn floor_to_day(ts: NaiveDateTime) -> NaiveDateTime {
    ts.date().and_time(chrono::NaiveTime::MIN)
}

pub fn floor_to_month(ts: NaiveDateTime) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(ts.year(), ts.month(), 1)
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .unwrap_or(ts)
}

/// First instant of the month following `ts`'s month.
pub fn next_month(ts: NaiveDateTime) -> NaiveDateTime {
    let (y, m) = if ts.month() == 12 {
        (ts.year() + 1, 1)
    } else {
        (ts.year(), ts.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .map(|d| d.and_time(chrono::NaiveTime::MIN))
        .unwrap_or(ts)
}

/// Hours between two instants as a float.
pub fn hours_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}
