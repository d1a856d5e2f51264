//! The date representations in play: the entry form's `dd/MM/yyyy`, the wire format
//! `yyyy-MM-dd`, and the HTTP-date rendering the list endpoint sometimes falls back to.

use chrono::{DateTime, NaiveDate};

/// Format used by the entry form and the edit screen.
pub const FORM_FORMAT: &str = "%d/%m/%Y";

/// Format sent to and usually received from the backend.
pub const WIRE_FORMAT: &str = "%Y-%m-%d";

pub fn format_form(date: NaiveDate) -> String {
    date.format(FORM_FORMAT).to_string()
}

pub fn format_wire(date: NaiveDate) -> String {
    date.format(WIRE_FORMAT).to_string()
}

/// Parses a date typed by the user. Both `dd/MM/yyyy` and `yyyy-MM-dd` are accepted.
pub fn parse_input(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, FORM_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(s, WIRE_FORMAT))
        .ok()
}

/// Parses an `orderdate` as sent by the backend: `yyyy-MM-dd`, an ISO timestamp, or an HTTP date
/// such as `Sun, 13 Apr 2025 00:00:00 GMT`.
pub fn parse_wire(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, WIRE_FORMAT) {
        return Some(date);
    }
    if s.contains(',') {
        return DateTime::parse_from_rfc2822(s).ok().map(|dt| dt.date_naive());
    }
    // e.g. 2025-05-03T10:11:27.740+02:00, where only the calendar day matters
    s.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, WIRE_FORMAT).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_form_to_wire() {
        let date = parse_input("01/06/2024").unwrap();
        assert_eq!(format_wire(date), "2024-06-01");
        assert_eq!(format_form(date), "01/06/2024");
    }

    #[test]
    fn test_input_accepts_wire_format() {
        assert_eq!(parse_input("2024-06-01"), Some(ymd(2024, 6, 1)));
    }

    #[test]
    fn test_input_rejects_nonsense() {
        assert_eq!(parse_input("31/02/2024"), None);
        assert_eq!(parse_input("yesterday"), None);
        assert_eq!(parse_input(""), None);
    }

    #[test]
    fn test_wire_http_date() {
        assert_eq!(
            parse_wire("Sun, 13 Apr 2025 00:00:00 GMT"),
            Some(ymd(2025, 4, 13))
        );
    }

    #[test]
    fn test_wire_timestamp() {
        assert_eq!(
            parse_wire("2025-05-03T10:11:27.740+02:00"),
            Some(ymd(2025, 5, 3))
        );
    }

    #[test]
    fn test_wire_garbage() {
        assert_eq!(parse_wire("13.04.2025"), None);
        assert_eq!(parse_wire("Sun, 99 Foo 2025"), None);
    }
}
