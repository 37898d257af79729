// deadline.rs — Free-text deadline parsing.
//
// Two forms are accepted:
//   "2099-01-01"  an absolute date, taken as 00:00 UTC on that day
//   "7"           a positive number of calendar days from now
//
// All interpretation is in UTC; per-user timezones are not inferred.

use chrono::{DateTime, Days, NaiveDate, Utc};

use crate::error::EngineError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a deadline relative to `now`.
pub fn parse_deadline(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, EngineError> {
    let trimmed = input.trim();
    let invalid = || EngineError::InvalidDeadline(input.to_string());

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, DATE_FORMAT) {
        return date
            .and_hms_opt(0, 0, 0)
            .map(|midnight| midnight.and_utc())
            .ok_or_else(invalid);
    }

    let days: i64 = trimmed.parse().map_err(|_| invalid())?;
    if days <= 0 {
        return Err(invalid());
    }
    now.checked_add_days(Days::new(days as u64))
        .ok_or_else(invalid)
}
