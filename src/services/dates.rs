// src/services/dates.rs
use chrono::{DateTime, Months, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parses a calendar date, dropping any time of day and timezone.
///
/// Timezone-aware stamps keep their local calendar date, so
/// `2024-03-01T00:00:00-05:00` is 2024-03-01 rather than being shifted to UTC.
pub fn parse_naive_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local().date());
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.naive_local().date());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(dt.date());
        }
    }

    None
}

/// Same calendar day `years` earlier; Feb 29 clamps to Feb 28.
pub fn years_before(date: NaiveDate, years: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(years.saturating_mul(12)))
        .unwrap_or(NaiveDate::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_plain_and_zoned_dates() {
        assert_eq!(parse_naive_date("2024-03-01"), Some(d(2024, 3, 1)));
        assert_eq!(parse_naive_date("03/01/2024"), Some(d(2024, 3, 1)));
        assert_eq!(parse_naive_date("2024-03-01T00:00:00-05:00"), Some(d(2024, 3, 1)));
        assert_eq!(parse_naive_date("2024-03-01 23:30:00+09:00"), Some(d(2024, 3, 1)));
        assert_eq!(parse_naive_date("2024-03-01 16:00:00"), Some(d(2024, 3, 1)));
        assert_eq!(parse_naive_date("not a date"), None);
    }

    #[test]
    fn years_before_clamps_leap_day() {
        assert_eq!(years_before(d(2024, 2, 29), 1), d(2023, 2, 28));
        assert_eq!(years_before(d(2024, 6, 30), 5), d(2019, 6, 30));
        assert_eq!(years_before(d(2024, 6, 30), 0), d(2024, 6, 30));
    }
}
