use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::{Error, Result};

/// A Toggl time entry as mirrored into the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeEntry {
    pub id: i64,
    pub description: String,
    pub project_id: Option<i64>,
    pub workspace_id: Option<i64>,
    pub tags: Vec<String>,
    pub start: DateTime<Utc>,
    /// `None` while the entry is still running at the source.
    pub stop: Option<DateTime<Utc>>,
    /// Negative while running (Toggl's sentinel). Stored verbatim.
    pub duration_sec: i64,
}

impl TimeEntry {
    pub fn is_running(&self) -> bool {
        self.stop.is_none() || self.duration_sec < 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub id: i64,
    pub workspace_id: i64,
    pub name: String,
    pub active: bool,
    pub is_private: bool,
    pub color: String,
    pub client_id: Option<i64>,
    /// Last modification time reported by Toggl.
    pub updated_at: DateTime<Utc>,
}

/// Half-open UTC interval `[from, to)` that a single sync covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl SyncWindow {
    /// Build a window, rejecting empty or inverted intervals.
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
        if from >= to {
            return Err(Error::WindowParse(format!(
                "window start {} must be before end {}",
                format_instant(&from),
                format_instant(&to)
            )));
        }
        Ok(Self { from, to })
    }

    /// The 24 hours ending at `end`.
    pub fn trailing_day(end: DateTime<Utc>) -> Self {
        Self {
            from: end - Duration::hours(24),
            to: end,
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.from <= t && t < self.to
    }
}

impl std::fmt::Display for SyncWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", format_instant(&self.from), format_instant(&self.to))
    }
}

/// RFC3339 in UTC at second precision with a trailing `Z`, so stored values
/// sort lexicographically. Used for storage and the wire.
pub fn format_instant(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}
