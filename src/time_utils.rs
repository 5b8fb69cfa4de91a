use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt::Display;

/// Shown in place of a missing timestamp.
pub const MISSING_TIMESTAMP: &str = "-";

// Year, short month, 2-digit day, 2-digit hour and minute.
const DISPLAY_FORMAT: &str = "%b %d, %Y, %I:%M %p";

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Parses an API timestamp into an instant.
///
/// Strings that carry their own offset (`Z`, `+02:00`) are honoured; the
/// usual `YYYY-MM-DD HH:MM:SS` form has none and is read as UTC.
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let text = raw.trim();
    if let Result::Ok(dt) = DateTime::parse_from_rfc3339(&text.replacen(' ', "T", 1)) {
        return Some(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Formats a `last_scored_at` value for display in `tz`.
///
/// Never fails: a missing value becomes [`MISSING_TIMESTAMP`] and anything
/// that does not parse is returned untouched.
pub fn format_timestamp<Tz>(raw: Option<&str>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let raw = match raw {
        Some(r) if !r.trim().is_empty() => r,
        _ => return MISSING_TIMESTAMP.to_string(),
    };
    match parse_utc(raw) {
        Some(instant) => instant.with_timezone(tz).format(DISPLAY_FORMAT).to_string(),
        None => raw.to_string(),
    }
}
