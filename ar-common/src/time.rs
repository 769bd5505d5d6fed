//! Calendar helpers for weekly data
//!
//! All month-denominated horizons (trailing averages, historical ranges) are
//! converted to a whole number of weeks through [`WEEKS_PER_MONTH`].

use chrono::{DateTime, Duration, NaiveDate, Utc};

/// Weeks per calendar month used for every month-based window
pub const WEEKS_PER_MONTH: f64 = 4.33;

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Number of weekly slots covered by `months` months (3 -> 13, 6 -> 26, 12 -> 52)
pub fn weeks_for_months(months: u32) -> u32 {
    (f64::from(months) * WEEKS_PER_MONTH).round() as u32
}

/// The week exactly seven days before `week`
pub fn previous_week(week: NaiveDate) -> NaiveDate {
    week - Duration::days(7)
}

/// Earliest week start included in a window of `weeks` slots ending at `as_of`
pub fn window_start(as_of: NaiveDate, weeks: u32) -> NaiveDate {
    as_of - Duration::days(7 * i64::from(weeks.saturating_sub(1)))
}

/// Parse a `M/D/YYYY` week cell into a calendar date.
///
/// Month and day may be one or two digits; the year must be exactly four.
/// Returns `None` for anything else, including impossible dates such as 2/30/2023.
pub fn parse_week_date(raw: &str) -> Option<NaiveDate> {
    let mut parts = raw.trim().split('/');
    let (month, day, year) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }

    let is_digits = |s: &str, min: usize, max: usize| {
        (min..=max).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit())
    };
    if !is_digits(month, 1, 2) || !is_digits(day, 1, 2) || !is_digits(year, 4, 4) {
        return None;
    }

    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}
