//! Date handling: ARC 14-digit timestamps and legacy HTTP `Date` values.

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::ArcError;

const DATE14_FORMAT: &str = "%Y%m%d%H%M%S";

/// Parse a `YYYYMMDDHHMMSS` ARC date as UTC.
pub fn parse_date14(value: &str) -> Result<DateTime<Utc>, ArcError> {
    let malformed = || ArcError::MalformedDate { value: value.to_string() };
    if value.len() != 14 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    NaiveDateTime::parse_from_str(value, DATE14_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| malformed())
}

pub fn to_date14(time: &DateTime<Utc>) -> String {
    time.format(DATE14_FORMAT).to_string()
}

/// Layouts tried after RFC 2822, in order.  Zone names are skipped by
/// `%Z` and the time is taken as UTC.
const HTTP_DATE_LAYOUTS: &[&str] = &[
    "%a, %d %b %Y %H:%M:%S %Z",  // RFC 1123 with a non-GMT zone name
    "%A, %d-%b-%y %H:%M:%S %Z",  // RFC 850
    "%A, %d-%b-%Y %H:%M:%S %Z",  // RFC 850, four-digit year
    "%a, %d-%b-%Y %H:%M:%S %Z",
    "%a %b %e %H:%M:%S %Y",      // ANSI C asctime
    "%a %b %e %H:%M:%S %Z %Y",   // Unix date
    "%a, %d %b %y %H:%M:%S %Z",  // RFC 822, two-digit year
];

/// Parse an HTTP `Date` header the way old servers wrote it.
///
/// Accepts RFC 1123/2822 (with or without a leading weekday zero, numeric
/// or named zone), RFC 850, asctime and `date(1)` output.
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(t) = DateTime::parse_from_rfc2822(value) {
        return Some(t.with_timezone(&Utc));
    }
    HTTP_DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
        .map(|naive| naive.and_utc())
}
