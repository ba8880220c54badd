//! Sync window boundaries.
//!
//! A boundary token is empty, an RFC3339 timestamp, or a `YYYY-MM-DD` date.
//! Date-only end boundaries are inclusive of that day, so they resolve to
//! midnight UTC of the following day.
//!
//! The strict parsers are for the command line, where a bad token is fatal.
//! The lenient ones are for the trigger endpoint, which falls back to the
//! default instead of rejecting the request.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::error::{Error, Result};
use crate::model::SyncWindow;

/// Which side of the half-open interval a token describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Start,
    End,
}

impl Boundary {
    fn flag(self) -> &'static str {
        match self {
            Boundary::Start => "from",
            Boundary::End => "to",
        }
    }
}

/// Parse one boundary token. Returns `Ok(None)` for an empty token.
pub fn parse_boundary(token: &str, boundary: Boundary) -> Result<Option<DateTime<Utc>>> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(None);
    }

    if let Ok(t) = DateTime::parse_from_rfc3339(token) {
        return Ok(Some(t.with_timezone(&Utc)));
    }

    if let Ok(d) = NaiveDate::parse_from_str(token, "%Y-%m-%d") {
        let day = match boundary {
            Boundary::Start => d,
            Boundary::End => d + Duration::days(1),
        };
        return Ok(Some(day.and_time(chrono::NaiveTime::MIN).and_utc()));
    }

    Err(Error::WindowParse(format!(
        "invalid --{} {token:?}, expected RFC3339 or YYYY-MM-DD",
        boundary.flag()
    )))
}

/// Strict start boundary: empty → `default`, malformed → error.
pub fn parse_start(token: &str, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Ok(parse_boundary(token, Boundary::Start)?.unwrap_or(default))
}

/// Strict end boundary: empty → `default`, malformed → error.
pub fn parse_end(token: &str, default: DateTime<Utc>) -> Result<DateTime<Utc>> {
    Ok(parse_boundary(token, Boundary::End)?.unwrap_or(default))
}

/// Lenient start boundary: anything unparseable → `default`.
pub fn parse_start_lenient(token: &str, default: DateTime<Utc>) -> DateTime<Utc> {
    match parse_boundary(token, Boundary::Start) {
        Ok(t) => t.unwrap_or(default),
        Err(e) => {
            log::debug!("ignoring {e}, using default {default}");
            default
        }
    }
}

/// Lenient end boundary: anything unparseable → `default`.
pub fn parse_end_lenient(token: &str, default: DateTime<Utc>) -> DateTime<Utc> {
    match parse_boundary(token, Boundary::End) {
        Ok(t) => t.unwrap_or(default),
        Err(e) => {
            log::debug!("ignoring {e}, using default {default}");
            default
        }
    }
}

/// Resolve command-line tokens into a window.
///
/// The end defaults to `now`; the start defaults to 24 hours before the
/// resolved end. Malformed tokens and inverted windows are errors.
pub fn resolve(from: &str, to: &str, now: DateTime<Utc>) -> Result<SyncWindow> {
    let end = parse_end(to, now)?;
    let start = parse_start(from, end - Duration::hours(24))?;
    SyncWindow::new(start, end)
}

/// Resolve trigger-endpoint tokens into a window. Never fails.
///
/// Malformed tokens fall back to the defaults. A start at or after the end
/// falls back to the 24 hours before the end.
pub fn resolve_lenient(from: &str, to: &str, now: DateTime<Utc>) -> SyncWindow {
    let end = parse_end_lenient(to, now);
    let default_start = end - Duration::hours(24);
    let start = parse_start_lenient(from, default_start);
    SyncWindow::new(start, end).unwrap_or_else(|_| SyncWindow::trailing_day(end))
}
