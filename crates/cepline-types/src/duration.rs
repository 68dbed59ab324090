//! Aggregation granularities and bucket truncation

use crate::time::TimeError;
use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A time-bucket width, ordered finest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Duration {
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

const SECOND: i64 = 1_000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

impl Duration {
    /// All granularities, finest first
    pub const ALL: [Duration; 6] = [
        Self::Seconds,
        Self::Minutes,
        Self::Hours,
        Self::Days,
        Self::Months,
        Self::Years,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Seconds => "SECONDS",
            Self::Minutes => "MINUTES",
            Self::Hours => "HOURS",
            Self::Days => "DAYS",
            Self::Months => "MONTHS",
            Self::Years => "YEARS",
        }
    }

    /// Width in milliseconds for fixed-width granularities
    pub const fn fixed_millis(&self) -> Option<i64> {
        match self {
            Self::Seconds => Some(SECOND),
            Self::Minutes => Some(MINUTE),
            Self::Hours => Some(HOUR),
            Self::Days => Some(DAY),
            Self::Months | Self::Years => None,
        }
    }

    /// Start of the bucket containing `timestamp` (UTC calendar)
    pub fn start_time(&self, timestamp: i64) -> Result<i64, TimeError> {
        if let Some(width) = self.fixed_millis() {
            return timestamp
                .checked_sub(timestamp.rem_euclid(width))
                .ok_or(TimeError::OutOfRange { millis: timestamp });
        }
        let date = utc_date(timestamp)?;
        let first = match self {
            Self::Months => NaiveDate::from_ymd_opt(date.year(), date.month(), 1),
            _ => NaiveDate::from_ymd_opt(date.year(), 1, 1),
        };
        first
            .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
            .ok_or(TimeError::OutOfRange { millis: timestamp })
    }

    /// Start of the bucket following the one containing `timestamp`
    pub fn next_start_time(&self, timestamp: i64) -> Result<i64, TimeError> {
        let start = self.start_time(timestamp)?;
        if let Some(width) = self.fixed_millis() {
            return start
                .checked_add(width)
                .ok_or(TimeError::OutOfRange { millis: timestamp });
        }
        let months = if *self == Self::Months { 1 } else { 12 };
        utc_date(start)?
            .checked_add_months(Months::new(months))
            .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
            .ok_or(TimeError::OutOfRange { millis: timestamp })
    }
}

fn utc_date(timestamp: i64) -> Result<NaiveDate, TimeError> {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .map(|dt| dt.date_naive())
        .ok_or(TimeError::OutOfRange { millis: timestamp })
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Duration {
    type Err = TimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sec" | "secs" | "second" | "seconds" => Ok(Self::Seconds),
            "min" | "mins" | "minute" | "minutes" => Ok(Self::Minutes),
            "hour" | "hours" => Ok(Self::Hours),
            "day" | "days" => Ok(Self::Days),
            "month" | "months" => Ok(Self::Months),
            "year" | "years" => Ok(Self::Years),
            _ => Err(TimeError::UnknownGranularity {
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::parse_timestamp;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("minutes", Duration::Minutes)]
    #[case("MINUTE", Duration::Minutes)]
    #[case("min", Duration::Minutes)]
    #[case(" Seconds ", Duration::Seconds)]
    #[case("years", Duration::Years)]
    fn test_parse_names(#[case] name: &str, #[case] expected: Duration) {
        assert_eq!(name.parse::<Duration>().unwrap(), expected);
    }

    #[rstest]
    #[case(Duration::Seconds)]
    #[case(Duration::Days)]
    #[case(Duration::Years)]
    fn test_start_time_at_lower_limit(#[case] duration: Duration) {
        assert_eq!(
            duration.start_time(i64::MIN),
            Err(TimeError::OutOfRange { millis: i64::MIN })
        );
    }

    #[test]
    fn test_unknown_name() {
        assert!(matches!(
            "fortnights".parse::<Duration>(),
            Err(TimeError::UnknownGranularity { .. })
        ));
    }

    #[test]
    fn test_ordering_finest_first() {
        assert!(Duration::Seconds < Duration::Minutes);
        assert!(Duration::Months < Duration::Years);
        assert_eq!(Duration::ALL.iter().max(), Some(&Duration::Years));
    }

    #[test]
    fn test_fixed_truncation() {
        let ts = parse_timestamp("2017-06-01 10:01:45").unwrap();
        let minute = parse_timestamp("2017-06-01 10:01:00").unwrap();
        assert_eq!(Duration::Minutes.start_time(ts).unwrap(), minute);
        assert_eq!(Duration::Minutes.next_start_time(ts).unwrap(), minute + MINUTE);
        assert_eq!(Duration::Seconds.start_time(ts).unwrap(), ts);
    }

    #[test]
    fn test_negative_timestamps_truncate_down() {
        assert_eq!(Duration::Seconds.start_time(-1).unwrap(), -1_000);
    }

    #[test]
    fn test_calendar_truncation() {
        let ts = parse_timestamp("2017-02-14 08:30:00").unwrap();
        assert_eq!(
            Duration::Months.start_time(ts).unwrap(),
            parse_timestamp("2017-02-01 00:00:00").unwrap()
        );
        assert_eq!(
            Duration::Months.next_start_time(ts).unwrap(),
            parse_timestamp("2017-03-01 00:00:00").unwrap()
        );
        assert_eq!(
            Duration::Years.next_start_time(ts).unwrap(),
            parse_timestamp("2018-01-01 00:00:00").unwrap()
        );
    }
}
