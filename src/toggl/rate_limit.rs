use std::time::Duration;

use crate::error::Error;

pub const MAX_RETRIES: u32 = 3;
pub const BACKOFF: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(4),
];

/// Toggl answers 429 when the per-second request quota is exceeded.
pub fn is_rate_limited(e: &Error) -> bool {
    matches!(e, Error::Api { status: 429, .. })
}

/// Wait before retry `attempt` (0-based), or `None` once retries are spent.
pub fn backoff_for(attempt: u32, schedule: &[Duration]) -> Option<Duration> {
    if attempt >= MAX_RETRIES {
        return None;
    }
    schedule
        .get(attempt as usize)
        .or(schedule.last())
        .copied()
}

/// Sleep for the backoff duration.
pub async fn backoff_sleep(attempt: u32, wait: Duration) {
    log::warn!(
        "Rate limited (429). Waiting {wait:?} before retry {}/{}",
        attempt + 1,
        MAX_RETRIES
    );
    tokio::time::sleep(wait).await;
}
