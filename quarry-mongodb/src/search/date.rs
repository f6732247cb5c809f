//! Date helpers for search translation.
//!
//! Input dates are always `DD/MM/YYYY` and are interpreted as UTC calendar
//! days. Output formats use moment-style tokens (`YYYY-MM-DD`), converted to
//! chrono format strings here.

use std::fmt::Write;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

/// Separator between the two halves of a range value.
pub const RANGE_SEPARATOR: &str = " - ";

/// Parse a `DD/MM/YYYY` date. Anything after the first whitespace is ignored.
pub fn parse_day(input: &str) -> Option<NaiveDate> {
    let token = input.split_whitespace().next()?;
    NaiveDate::parse_from_str(token, "%d/%m/%Y").ok()
}

/// Split `"start - end"` into its halves.
pub fn split_range(input: &str) -> Option<(&str, &str)> {
    let (start, end) = input.split_once(RANGE_SEPARATOR)?;
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() || end.is_empty() {
        return None;
    }
    Some((start, end))
}

/// Parse `"DD/MM/YYYY - DD/MM/YYYY"` into its two days.
pub fn parse_day_range(input: &str) -> Option<(NaiveDate, NaiveDate)> {
    let (start, end) = split_range(input)?;
    Some((parse_day(start)?, parse_day(end)?))
}

/// First instant of a day.
pub fn start_of_day(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

/// Last millisecond of a day.
pub fn end_of_day(day: NaiveDate) -> Option<NaiveDateTime> {
    day.and_hms_milli_opt(23, 59, 59, 999)
}

/// Convert a UTC wall-clock time to a BSON datetime.
pub fn to_bson_datetime(at: NaiveDateTime) -> bson::DateTime {
    bson::DateTime::from_millis(Utc.from_utc_datetime(&at).timestamp_millis())
}

/// Translate a moment-style format into a chrono format string.
///
/// Supported tokens: `YYYY YY MMMM MMM MM M DD D HH H hh h mm m ss s A a`.
/// Text inside `[...]` is copied literally.
pub fn moment_to_chrono(format: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MMMM", "%B"),
        ("MMM", "%b"),
        ("MM", "%m"),
        ("M", "%-m"),
        ("DD", "%d"),
        ("D", "%-d"),
        ("HH", "%H"),
        ("H", "%-H"),
        ("hh", "%I"),
        ("h", "%-I"),
        ("mm", "%M"),
        ("m", "%-M"),
        ("ss", "%S"),
        ("s", "%-S"),
        ("A", "%p"),
        ("a", "%P"),
    ];

    let mut out = String::with_capacity(format.len() * 2);
    let mut rest = format;

    'outer: while !rest.is_empty() {
        if let Some(literal) = rest.strip_prefix('[') {
            let (text, tail) = literal.split_once(']').unwrap_or((literal, ""));
            out.push_str(&text.replace('%', "%%"));
            rest = tail;
            continue;
        }

        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }

    out
}

/// Format a wall-clock time with a moment-style format.
///
/// Returns `None` if the format cannot be rendered.
pub fn format_moment(at: NaiveDateTime, format: &str) -> Option<String> {
    let pattern = moment_to_chrono(format);
    let mut out = String::new();
    write!(out, "{}", at.format(&pattern)).ok()?;
    Some(out)
}

/// Format a day with a moment-style format.
pub fn format_day(day: NaiveDate, format: &str) -> Option<String> {
    format_moment(start_of_day(day), format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_day() {
        assert_eq!(parse_day("25/12/2024"), Some(day(2024, 12, 25)));
        assert_eq!(parse_day(" 01/02/2024 10:30"), Some(day(2024, 2, 1)));
        assert_eq!(parse_day("2024-12-25"), None);
        assert_eq!(parse_day("31/02/2024"), None);
        assert_eq!(parse_day(""), None);
    }

    #[test]
    fn test_parse_day_range() {
        assert_eq!(
            parse_day_range("01/01/2024 - 31/01/2024"),
            Some((day(2024, 1, 1), day(2024, 1, 31)))
        );
        assert_eq!(parse_day_range("01/01/2024"), None);
        assert_eq!(parse_day_range("01/01/2024 - "), None);
    }

    #[test]
    fn test_moment_to_chrono() {
        assert_eq!(moment_to_chrono("YYYY-MM-DD"), "%Y-%m-%d");
        assert_eq!(moment_to_chrono("DD/MM/YY HH:mm:ss"), "%d/%m/%y %H:%M:%S");
        assert_eq!(moment_to_chrono("[Day] D"), "Day %-d");
        assert_eq!(moment_to_chrono("100%"), "100%%");
    }

    #[test]
    fn test_format_day() {
        let d = day(2024, 3, 5);
        assert_eq!(format_day(d, "YYYY-MM-DD").as_deref(), Some("2024-03-05"));
        assert_eq!(format_day(d, "D/M/YYYY").as_deref(), Some("5/3/2024"));
        assert_eq!(format_day(d, "DD-MM-YYYY HH:mm").as_deref(), Some("05-03-2024 00:00"));
    }

    #[test]
    fn test_day_bounds_are_utc() {
        let d = day(2024, 1, 1);
        assert_eq!(
            to_bson_datetime(start_of_day(d)).timestamp_millis(),
            1_704_067_200_000
        );
        assert_eq!(
            to_bson_datetime(end_of_day(d).unwrap()).timestamp_millis(),
            1_704_067_200_000 + 86_400_000 - 1
        );
    }
}
