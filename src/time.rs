//! Wall-clock helpers and window arithmetic.
//!
//! Every timestamp inside siphon is an `i64` count of nanoseconds since the
//! Unix epoch, UTC. Windows are computed by flooring toward the resolution
//! boundary, which keeps pre-epoch times and sub-second resolutions on the
//! same rule.

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// Nanoseconds in one second.
pub const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Layout of the reserved time key, e.g. `1983-02-21T01:23:45+0200`.
pub const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// The current time, in nanoseconds since the epoch.
pub fn now() -> i64 {
    timestamp(&Utc::now())
}

fn timestamp<Tz: TimeZone>(dt: &DateTime<Tz>) -> i64 {
    dt.timestamp()
        .saturating_mul(NANOS_PER_SEC)
        .saturating_add(i64::from(dt.timestamp_subsec_nanos()))
}

/// Parse `s` against `FORMAT`, returning nanoseconds since the epoch.
///
/// Times that do not fit in an `i64` of nanoseconds, roughly those before
/// 1677 or after 2262, are rejected.
pub fn parse(s: &str) -> Option<i64> {
    let dt = DateTime::parse_from_str(s, FORMAT).ok()?;
    dt.timestamp()
        .checked_mul(NANOS_PER_SEC)?
        .checked_add(i64::from(dt.timestamp_subsec_nanos()))
}

/// Convert a `Duration` into nanoseconds, saturating at `i64::MAX`.
pub fn nanos(d: Duration) -> i64 {
    let secs = if d.as_secs() > i64::max_value() as u64 {
        i64::max_value()
    } else {
        d.as_secs() as i64
    };
    secs.saturating_mul(NANOS_PER_SEC)
        .saturating_add(i64::from(d.subsec_nanos()))
}

/// Floor `ts` to the start of its window.
///
/// `resolution` must be positive. Windows that would start before
/// `i64::MIN` are clamped to it.
#[inline]
pub fn quantize(ts: i64, resolution: i64) -> i64 {
    ts.saturating_sub(ts.rem_euclid(resolution))
}

/// The newest window that is closed at `now`.
///
/// A window is closed once a full resolution plus one second of grace has
/// passed since the start of the current window. Windows at or before the
/// watermark are swept; observations for them arriving later are late.
#[inline]
pub fn watermark(now: i64, resolution: i64) -> i64 {
    quantize(now, resolution).saturating_sub(resolution.saturating_add(NANOS_PER_SEC))
}
