//! Timestamp parsing and formatting.
//!
//! - [`parse_ts_to_utc`]: RFC-3339 with an explicit offset, converted to UTC.
//! - [`to_rfc3339_millis`]: the one format timestamps are stored in.
//! - [`from_local_naive`]: a wall-clock time in an IANA zone, converted to UTC.
//! - [`parse_cli_instant`]: what `--from`/`--to` accept on the command line.
//!
//! Local times are only accepted at the CLI edge. Everything stored or compared is UTC.

use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// RFC-3339 with offset -> UTC.
///
/// Example:
/// - "2024-03-10T09:30:00-05:00" -> "2024-03-10T14:30:00Z"
pub fn parse_ts_to_utc(s: &str) -> anyhow::Result<DateTime<Utc>> {
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("bad rfc3339: {s}"))?;
    Ok(dt.with_timezone(&Utc))
}

/// Format a UTC datetime as an RFC-3339 string with millisecond precision.
///
/// Fixed width, so lexical order of stored strings equals chronological order.
pub fn to_rfc3339_millis(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Converts a wall-clock time in `tz` to UTC.
///
/// An ambiguous (fall-back) time takes the earlier instant. A time skipped by a
/// spring-forward gap moves forward minute by minute, at most 2 hours, to the first
/// time that exists.
pub fn from_local_naive(naive: NaiveDateTime, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    use chrono::offset::LocalResult::*;
    match tz.from_local_datetime(&naive) {
        Single(dt) => Ok(dt.with_timezone(&Utc)),
        Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        None => {
            let mut t = naive;
            for _ in 0..120 {
                t += chrono::Duration::minutes(1);
                if let Single(dt) = tz.from_local_datetime(&t) {
                    return Ok(dt.with_timezone(&Utc));
                }
            }
            Err(anyhow::anyhow!("nonexistent local time {naive} in {tz}"))
        }
    }
}

/// Parses a CLI instant: full RFC-3339, or a bare `YYYY-MM-DD` meaning local midnight in `tz`.
///
/// A few zones move their clocks at 00:00; see [`from_local_naive`] for how that resolves.
pub fn parse_cli_instant(s: &str, tz: Tz) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(utc) = parse_ts_to_utc(s) {
        return Ok(utc);
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("expected RFC-3339 or YYYY-MM-DD, got {s:?}"))?;
    from_local_naive(date.and_time(chrono::NaiveTime::MIN), tz)
}
