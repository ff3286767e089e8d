use anyhow::{anyhow, Result};
use chrono::{
    DateTime, Duration, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    TimeZone, Utc,
};

/// Chunk directories are named after their UTC start so that lexical order is chronological.
pub fn chunk_name(start: DateTime<Utc>) -> String {
    start.format("%Y%m%dT%H%M%SZ").to_string()
}

/// This is the standard way of storing a point in time in the database. Second precision and a
/// fixed `Z` suffix keep string comparison equal to time comparison.
pub fn to_db_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn from_db_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|v| v.with_timezone(&Utc))
        .map_err(|e| anyhow!("invalid datetime '{value}': {e}"))
}

/// Converts a naive local time into UTC. Ambiguous times take the earlier instant, times that
/// don't exist (DST gaps) are shifted forward by an hour.
pub fn local_to_utc(time: NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(&time) {
        LocalResult::Single(v) => v.to_utc(),
        LocalResult::Ambiguous(earliest, _) => earliest.to_utc(),
        LocalResult::None => local_to_utc(time + Duration::hours(1)),
    }
}

/// Returns the UTC interval `[start, end)` covering a local calendar day.
pub fn local_day_bounds(day: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = local_to_utc(day.and_time(NaiveTime::MIN));
    let end = local_to_utc(
        day.succ_opt()
            .unwrap_or(NaiveDate::MAX)
            .and_time(NaiveTime::MIN),
    );
    (start, end)
}

/// Inclusive iterator over calendar days.
pub fn days_between(start: NaiveDate, end: NaiveDate) -> impl Iterator<Item = NaiveDate> {
    start.iter_days().take_while(move |day| *day <= end)
}
