use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use chrono_tz::Tz;
use regex::Regex;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.track.toggl.com";

static RE_DURATION_PART: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(ms|h|m|s)").unwrap());

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_token: String,
    /// Scopes project listing to one workspace when set.
    pub workspace_id: Option<i64>,
    pub base_url: url::Url,
    /// `None` means the default path under the home directory.
    pub db_path: Option<PathBuf>,
    /// Zone whose midnight drives the daily schedule.
    pub timezone: Tz,
    pub http_addr: Option<SocketAddr>,
}

impl Config {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary lookup. Empty values count as unset.
    ///
    /// - `TOGGL_API_TOKEN` (required)
    /// - `TOGGL_WORKSPACE_ID`
    /// - `TOGGL_BASE_URL` (default `https://api.track.toggl.com`)
    /// - `TOGGLDW_DB`
    /// - `SYNC_TZ` (default `UTC`)
    /// - `TOGGLDW_HTTP_ADDR`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_token =
            get("TOGGL_API_TOKEN").ok_or_else(|| Error::Config("TOGGL_API_TOKEN is required".into()))?;

        let workspace_id = get("TOGGL_WORKSPACE_ID")
            .map(|ws| {
                ws.parse::<i64>()
                    .map_err(|_| Error::Config("TOGGL_WORKSPACE_ID must be an integer".into()))
            })
            .transpose()?;

        let base_url = get("TOGGL_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = url::Url::parse(&base_url)
            .map_err(|e| Error::Config(format!("invalid TOGGL_BASE_URL {base_url:?}: {e}")))?;

        let timezone = parse_timezone(&get("SYNC_TZ").unwrap_or_else(|| "UTC".to_string()))?;

        let http_addr = get("TOGGLDW_HTTP_ADDR")
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .map_err(|e| Error::Config(format!("invalid TOGGLDW_HTTP_ADDR {addr:?}: {e}")))
            })
            .transpose()?;

        Ok(Self {
            api_token,
            workspace_id,
            base_url,
            db_path: get("TOGGLDW_DB").map(PathBuf::from),
            timezone,
            http_addr,
        })
    }
}

/// Parse an IANA zone name such as `Europe/Berlin`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| Error::Config(format!("invalid SYNC_TZ {name:?}")))
}

/// Parse durations like `15m`, `1h30m`, `90s` or `250ms`.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    let invalid = || Error::Config(format!("invalid duration {s:?}, expected e.g. 15m, 1h30m, 90s"));
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total = Duration::ZERO;
    let mut consumed = 0;
    for caps in RE_DURATION_PART.captures_iter(s) {
        let whole = caps.get(0).ok_or_else(invalid)?;
        if whole.start() != consumed {
            return Err(invalid());
        }
        consumed = whole.end();

        let n: u64 = caps[1].parse().map_err(|_| invalid())?;
        let part = match &caps[2] {
            "h" => Duration::from_secs(n.checked_mul(3600).ok_or_else(invalid)?),
            "m" => Duration::from_secs(n.checked_mul(60).ok_or_else(invalid)?),
            "s" => Duration::from_secs(n),
            _ => Duration::from_millis(n),
        };
        total = total.checked_add(part).ok_or_else(invalid)?;
    }
    if consumed != s.len() {
        return Err(invalid());
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::from_lookup(env(&[("TOGGL_API_TOKEN", "secret")])).unwrap();
        assert_eq!(cfg.api_token, "secret");
        assert_eq!(cfg.workspace_id, None);
        assert_eq!(cfg.base_url.as_str(), "https://api.track.toggl.com/");
        assert_eq!(cfg.timezone, Tz::UTC);
        assert!(cfg.db_path.is_none());
        assert!(cfg.http_addr.is_none());
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = Config::from_lookup(env(&[("TOGGL_API_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("TOGGL_API_TOKEN")));
    }

    #[test]
    fn test_full_config() {
        let cfg = Config::from_lookup(env(&[
            ("TOGGL_API_TOKEN", "secret"),
            ("TOGGL_WORKSPACE_ID", "4242"),
            ("TOGGL_BASE_URL", "http://localhost:8080"),
            ("TOGGLDW_DB", "/tmp/toggl.db"),
            ("SYNC_TZ", "Europe/Berlin"),
            ("TOGGLDW_HTTP_ADDR", "127.0.0.1:8088"),
        ]))
        .unwrap();
        assert_eq!(cfg.workspace_id, Some(4242));
        assert_eq!(cfg.base_url.as_str(), "http://localhost:8080/");
        assert_eq!(cfg.db_path, Some(PathBuf::from("/tmp/toggl.db")));
        assert_eq!(cfg.timezone, chrono_tz::Europe::Berlin);
        assert_eq!(cfg.http_addr, Some("127.0.0.1:8088".parse().unwrap()));
    }

    #[test]
    fn test_invalid_values_are_fatal() {
        assert!(Config::from_lookup(env(&[
            ("TOGGL_API_TOKEN", "secret"),
            ("TOGGL_WORKSPACE_ID", "abc"),
        ]))
        .is_err());
        assert!(Config::from_lookup(env(&[
            ("TOGGL_API_TOKEN", "secret"),
            ("SYNC_TZ", "Mars/Olympus"),
        ]))
        .is_err());
        assert!(Config::from_lookup(env(&[
            ("TOGGL_API_TOKEN", "secret"),
            ("TOGGLDW_HTTP_ADDR", "localhost"),
        ]))
        .is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("15m").unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("m15").is_err());
        assert!(parse_duration("1h 30m").is_err());
        assert!(parse_duration("5d").is_err());
        assert!(parse_duration("10mx").is_err());
    }
}
