use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RangePreset {
    Today,
    Yesterday,
    ThisWeek,
    LastWeek,
    ThisMonth,
}

impl RangePreset {
    /// Inclusive local days of the preset. Weeks start on Monday.
    pub fn bounds(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let since_monday = Duration::days(today.weekday().num_days_from_monday() as i64);
        match self {
            RangePreset::Today => (today, today),
            RangePreset::Yesterday => {
                let yesterday = today - Duration::days(1);
                (yesterday, yesterday)
            }
            RangePreset::ThisWeek => (today - since_monday, today),
            RangePreset::LastWeek => {
                let monday = today - since_monday - Duration::days(7);
                (monday, monday + Duration::days(6))
            }
            RangePreset::ThisMonth => (today.with_day(1).unwrap_or(today), today),
        }
    }
}

#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    #[arg(
        long,
        value_enum,
        conflicts_with_all = ["start_date", "end_date"],
        help = "Predefined range of days"
    )]
    range: Option<RangePreset>,
    #[arg(
        long = "start",
        short,
        help = "First day of the range. Examples are \"yesterday\", \"3 days ago\", \"15/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "Last day of the range. Examples are \"yesterday\", \"3 days ago\", \"15/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
}

impl RangeArgs {
    pub fn resolve(&self) -> Result<(NaiveDate, NaiveDate)> {
        self.resolve_at(Local::now())
    }

    /// Without any options the range is today. A lone `--end` starts on the same day.
    pub fn resolve_at(&self, now: DateTime<Local>) -> Result<(NaiveDate, NaiveDate)> {
        let today = now.date_naive();
        if let Some(range) = self.range {
            return Ok(range.bounds(today));
        }

        let dialect: chrono_english::Dialect = self.date_style.into();
        let parse = |value: &String, name: &str| {
            parse_date_string(value, now, dialect)
                .map(|v| v.with_timezone(&Local).date_naive())
                .map_err(|e| {
                    Args::command().error(
                        clap::error::ErrorKind::ValueValidation,
                        format!("Failed to validate {name} date {e}"),
                    )
                })
        };

        let end = match &self.end_date {
            Some(v) => parse(v, "end")?,
            None => today,
        };
        let start = match &self.start_date {
            Some(v) => parse(v, "start")?,
            None => end,
        };
        if start > end {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Start {start} is after end {end}"),
                )
                .into());
        }
        Ok((start, end))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn now() -> DateTime<Local> {
        // Thursday
        Local.with_ymd_and_hms(2025, 3, 20, 15, 0, 0).unwrap()
    }

    fn args(range: Option<RangePreset>, start: Option<&str>, end: Option<&str>) -> RangeArgs {
        RangeArgs {
            range,
            start_date: start.map(String::from),
            end_date: end.map(String::from),
            date_style: DateStyle::Uk,
        }
    }

    #[test]
    fn presets_resolve_around_today() {
        let today = date(3, 20);
        assert_eq!(RangePreset::Today.bounds(today), (today, today));
        assert_eq!(RangePreset::Yesterday.bounds(today), (date(3, 19), date(3, 19)));
        assert_eq!(RangePreset::ThisWeek.bounds(today), (date(3, 17), today));
        assert_eq!(RangePreset::LastWeek.bounds(today), (date(3, 10), date(3, 16)));
        assert_eq!(RangePreset::ThisMonth.bounds(today), (date(3, 1), today));
    }

    #[test]
    fn monday_is_the_first_day_of_week() {
        let monday = date(3, 17);
        assert_eq!(RangePreset::ThisWeek.bounds(monday), (monday, monday));
        assert_eq!(RangePreset::LastWeek.bounds(monday), (date(3, 10), date(3, 16)));
    }

    #[test]
    fn defaults_to_today() {
        let (start, end) = args(None, None, None).resolve_at(now()).unwrap();
        assert_eq!((start, end), (date(3, 20), date(3, 20)));
    }

    #[test]
    fn explicit_dates_are_parsed() {
        let (start, end) = args(None, Some("15/03/2025"), Some("yesterday"))
            .resolve_at(now())
            .unwrap();
        assert_eq!((start, end), (date(3, 15), date(3, 19)));

        let (start, end) = args(None, None, Some("18/03/2025")).resolve_at(now()).unwrap();
        assert_eq!((start, end), (date(3, 18), date(3, 18)));
    }

    #[test]
    fn start_after_end_is_rejected() {
        assert!(args(None, Some("19/03/2025"), Some("16/03/2025"))
            .resolve_at(now())
            .is_err());
        assert!(args(None, Some("not a date at all"), None)
            .resolve_at(now())
            .is_err());
    }
}
