//! ISO-8601 helpers shared by value classification and the date functions.
//!
//! Two textual forms are recognised: calendar dates (`YYYY-MM-DD`) and
//! RFC 3339 timestamps. Values travel as strings; these helpers are the
//! single place that parses and re-renders them.

use std::sync::OnceLock;
use time::{
    Date, Duration, Month, OffsetDateTime,
    format_description::{self, FormatItem, well_known::Rfc3339},
};

static DATE_FORMAT: OnceLock<Vec<FormatItem<'static>>> = OnceLock::new();

fn date_format() -> &'static Vec<FormatItem<'static>> {
    DATE_FORMAT
        .get_or_init(|| format_description::parse("[year]-[month]-[day]").expect("static format"))
}

/// Parse a calendar date in `YYYY-MM-DD` form.
#[must_use]
pub fn parse_date(s: &str) -> Option<Date> {
    Date::parse(s, date_format()).ok()
}

/// Parse an RFC 3339 timestamp.
#[must_use]
pub fn parse_datetime(s: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).ok()
}

/// Returns true when the text is a recognised date or timestamp literal.
#[must_use]
pub fn is_date_literal(s: &str) -> bool {
    parse_date(s).is_some() || parse_datetime(s).is_some()
}

/// Render a calendar date back to `YYYY-MM-DD`.
#[must_use]
pub fn format_date(date: Date) -> String {
    date.format(date_format())
        .unwrap_or_else(|_| date.to_string())
}

/// Render a timestamp back to RFC 3339.
#[must_use]
pub fn format_datetime(datetime: OffsetDateTime) -> String {
    datetime
        .format(&Rfc3339)
        .unwrap_or_else(|_| datetime.to_string())
}

/// Calendar date for a unix-millisecond instant (UTC).
#[must_use]
pub fn date_from_ms(ms: i64) -> Option<Date> {
    OffsetDateTime::from_unix_timestamp(ms.div_euclid(1_000))
        .ok()
        .map(OffsetDateTime::date)
}

/// Shift a date by whole months, clamping the day to the target month's end.
#[must_use]
pub fn add_months(date: Date, months: i64) -> Date {
    let zero_based = i64::from(date.year()) * 12 + i64::from(u8::from(date.month())) - 1 + months;
    let year = zero_based.div_euclid(12);
    let month = zero_based.rem_euclid(12) + 1;

    let Ok(year) = i32::try_from(year) else {
        return date;
    };
    let Ok(month) = u8::try_from(month).map(Month::try_from) else {
        return date;
    };
    let Ok(month) = month else {
        return date;
    };

    let day = date.day().min(month.length(year));
    Date::from_calendar_date(year, month, day).unwrap_or(date)
}

/// Shift a date by whole days.
#[must_use]
pub fn add_days(date: Date, days: i64) -> Date {
    date.checked_add(Duration::days(days)).unwrap_or(date)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_formats_calendar_dates() {
        let date = parse_date("2024-02-29").expect("leap day");
        assert_eq!(format_date(date), "2024-02-29");
        assert!(parse_date("2024-13-01").is_none());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn recognises_both_literal_forms() {
        assert!(is_date_literal("2024-01-15"));
        assert!(is_date_literal("2024-01-15T10:30:00Z"));
        assert!(!is_date_literal("15/01/2024"));
    }

    #[test]
    fn month_shift_clamps_to_month_end() {
        let date = parse_date("2024-01-31").expect("date");
        assert_eq!(format_date(add_months(date, 1)), "2024-02-29");
        assert_eq!(format_date(add_months(date, 13)), "2025-02-28");
        assert_eq!(format_date(add_months(date, -2)), "2023-11-30");
    }

    #[test]
    fn day_shift_crosses_year_boundaries() {
        let date = parse_date("2023-12-30").expect("date");
        assert_eq!(format_date(add_days(date, 3)), "2024-01-02");
    }
}
