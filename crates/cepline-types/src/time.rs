//! Timestamp parsing for `within` bounds and `time:toMillis`

use crate::duration::Duration;
use chrono::{Datelike, DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone};
use thiserror::Error;

/// Errors raised by granularity and timestamp handling
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    #[error("Unknown granularity: {name}")]
    UnknownGranularity { name: String },

    #[error("Timestamp {millis} is outside the supported calendar range")]
    OutOfRange { millis: i64 },

    #[error("Invalid timestamp '{text}': expected yyyy-MM-dd HH:mm:ss with an optional offset")]
    InvalidTimestamp { text: String },

    #[error("Invalid within pattern '{pattern}'")]
    InvalidPattern { pattern: String },
}

const DATE_TIME_LEN: usize = 19;
const FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse `yyyy-MM-dd HH:mm:ss` (UTC) or `yyyy-MM-dd HH:mm:ss +hh:mm` into
/// epoch milliseconds
pub fn parse_timestamp(text: &str) -> Result<i64, TimeError> {
    let text = text.trim();
    let invalid = || TimeError::InvalidTimestamp {
        text: text.to_string(),
    };

    if text.len() == DATE_TIME_LEN {
        return NaiveDateTime::parse_from_str(text, FORMAT)
            .map(|naive| naive.and_utc().timestamp_millis())
            .map_err(|_| invalid());
    }

    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %z")
        .or_else(|_| DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S %:z"))
        .map(|dt| dt.timestamp_millis())
        .map_err(|_| invalid())
}

fn parse_offset(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if text.is_empty() {
        return FixedOffset::east_opt(0);
    }
    let (sign, digits) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = digits.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Expand a wildcard pattern such as `2017-06-** **:**:**` into the
/// `[start, end)` millisecond range it denotes.
///
/// Wildcards must fill every field from the first wildcarded field to the
/// seconds field. The year field cannot be wildcarded.
pub fn expand_pattern(pattern: &str) -> Result<(i64, i64), TimeError> {
    let invalid = || TimeError::InvalidPattern {
        pattern: pattern.to_string(),
    };
    let pattern = pattern.trim();
    if pattern.len() < DATE_TIME_LEN || !pattern.is_char_boundary(DATE_TIME_LEN) {
        return Err(invalid());
    }
    let (date_time, offset) = pattern.split_at(DATE_TIME_LEN);
    let offset = parse_offset(offset).ok_or_else(invalid)?;

    let first = date_time.find('*').ok_or_else(invalid)?;
    // Field start offsets in `yyyy-MM-dd HH:mm:ss`
    let (unit, field_start) = match first {
        5 => (Duration::Years, 5),
        8 => (Duration::Months, 8),
        11 => (Duration::Days, 11),
        14 => (Duration::Hours, 14),
        17 => (Duration::Minutes, 17),
        _ => return Err(invalid()),
    };

    let mut filled = String::with_capacity(DATE_TIME_LEN);
    for (index, c) in date_time.char_indices() {
        if index < field_start {
            if c == '*' {
                return Err(invalid());
            }
            filled.push(c);
        } else if matches!(c, '-' | ' ' | ':') {
            filled.push(c);
        } else if c == '*' {
            // Month and day fields start at 1
            let one_based = (5..10).contains(&index);
            let last_digit = index == 6 || index == 9;
            filled.push(if one_based && last_digit { '1' } else { '0' });
        } else {
            return Err(invalid());
        }
    }

    let start = NaiveDateTime::parse_from_str(&filled, FORMAT).map_err(|_| invalid())?;
    let end = match unit {
        Duration::Years => {
            NaiveDate::from_ymd_opt(start.year() + 1, 1, 1).map(|d| d.and_time(NaiveTime::MIN))
        }
        Duration::Months => start.checked_add_months(chrono::Months::new(1)),
        Duration::Days => start.checked_add_signed(TimeDelta::days(1)),
        Duration::Hours => start.checked_add_signed(TimeDelta::hours(1)),
        _ => start.checked_add_signed(TimeDelta::minutes(1)),
    }
    .ok_or_else(invalid)?;

    let to_millis = |naive: NaiveDateTime| {
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.timestamp_millis())
            .ok_or_else(invalid)
    };
    Ok((to_millis(start)?, to_millis(end)?))
}
