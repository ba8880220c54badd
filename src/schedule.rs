//! When syncs run.
//!
//! Every mode funnels into [`TogglDW::run_once`]; modes differ only in how
//! they pick windows and cadence. Waiting points watch the shutdown signal,
//! and a shutdown never starts a new run.

use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::model::SyncWindow;
use crate::TogglDW;

/// Flipped to `true` to stop the scheduling loop.
pub type Shutdown = watch::Receiver<bool>;

#[derive(Debug, Clone)]
pub enum Schedule {
    /// One run for an explicit window. Its error is the caller's error.
    Once(SyncWindow),
    /// `initial` runs immediately, then every `every` over the trailing 24h.
    Interval { every: Duration, initial: SyncWindow },
    /// At each local midnight in the zone, over the 24h before it.
    Daily(Tz),
    /// No timer; runs come from the trigger endpoint only.
    OnDemand,
}

pub struct Scheduler {
    dw: TogglDW,
    shutdown: Shutdown,
}

impl Scheduler {
    pub fn new(dw: TogglDW, shutdown: Shutdown) -> Self {
        Self { dw, shutdown }
    }

    /// Drive `schedule` until it finishes or shutdown is signalled.
    ///
    /// Only [`Schedule::Once`] returns a sync error; the looping modes log
    /// failures and wait for the next cycle.
    pub async fn run(mut self, schedule: Schedule) -> Result<()> {
        match schedule {
            Schedule::Once(window) => {
                let report = self.dw.run_once(window).await?;
                log::info!(
                    "sync completed window={} projects={} entries={}",
                    report.window,
                    report.projects_synced,
                    report.entries_synced
                );
                Ok(())
            }
            Schedule::Interval { every, initial } => {
                if every.is_zero() {
                    return Err(Error::Config("sync interval must be positive".into()));
                }
                self.run_interval(every, initial).await;
                Ok(())
            }
            Schedule::Daily(tz) => {
                self.run_daily(tz).await;
                Ok(())
            }
            Schedule::OnDemand => {
                log::info!("waiting for trigger requests");
                wait_shutdown(&mut self.shutdown).await;
                log::info!("shutting down");
                Ok(())
            }
        }
    }

    async fn run_interval(&mut self, every: Duration, initial: SyncWindow) {
        log::info!("starting periodic sync interval={every:?}");
        if self.is_shutdown() {
            log::info!("shutting down");
            return;
        }
        self.run_logged("initial", initial).await;

        let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = wait_shutdown(&mut self.shutdown) => {
                    log::info!("shutting down");
                    return;
                }
                _ = ticker.tick() => {}
            }
            // Fixed 24h lookback regardless of `every`; upserts absorb the overlap.
            self.run_logged("periodic", SyncWindow::trailing_day(Utc::now()))
                .await;
        }
    }

    async fn run_daily(&mut self, tz: Tz) {
        log::info!("starting daily sync at midnight tz={tz}");
        let mut last_fired: Option<DateTime<Tz>> = None;
        loop {
            let now = Utc::now().with_timezone(&tz);
            // Never fire the same midnight twice, even if the timer wakes early.
            let reference = match last_fired {
                Some(prev) if prev >= now => prev,
                _ => now,
            };
            let next = next_midnight(&reference);
            let wait = (next - Utc::now().with_timezone(&tz))
                .to_std()
                .unwrap_or_default();
            log::info!("sleeping until next midnight next={next} sleep={wait:?}");

            if !self.sleep_or_shutdown(wait).await {
                log::info!("shutting down");
                return;
            }
            last_fired = Some(next);
            self.run_logged("daily", daily_window(&next)).await;
        }
    }

    /// `false` if shutdown arrived first.
    async fn sleep_or_shutdown(&mut self, wait: Duration) -> bool {
        if self.is_shutdown() {
            return false;
        }
        tokio::select! {
            biased;
            _ = wait_shutdown(&mut self.shutdown) => false,
            _ = tokio::time::sleep(wait) => true,
        }
    }

    fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run_logged(&self, label: &str, window: SyncWindow) {
        match self.dw.run_once(window).await {
            Ok(report) => log::info!(
                "{label} sync completed window={} projects={} entries={}",
                report.window,
                report.projects_synced,
                report.entries_synced
            ),
            Err(Error::AlreadyRunning) => {
                log::info!("{label} sync skipped, another sync is running")
            }
            Err(e) => log::error!("{label} sync failed window={window}: {e}"),
        }
    }
}

/// Resolves once shutdown is `true`, or the sender is gone.
async fn wait_shutdown(shutdown: &mut Shutdown) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// The first local midnight strictly after `now`.
///
/// Where a DST change skips midnight, the first instant of that day is used.
pub fn next_midnight(now: &DateTime<Tz>) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = start_of_day(&tz, now.date_naive());
    if today > *now {
        return today;
    }
    let tomorrow = now
        .date_naive()
        .succ_opt()
        .unwrap_or(NaiveDate::MAX);
    start_of_day(&tz, tomorrow)
}

fn start_of_day(tz: &Tz, date: NaiveDate) -> DateTime<Tz> {
    let mut local = date.and_time(NaiveTime::MIN);
    // Gaps are at most a few hours; step forward until the local time exists.
    for _ in 0..24 * 4 {
        if let Some(t) = tz.from_local_datetime(&local).earliest() {
            return t;
        }
        local += chrono::Duration::minutes(15);
    }
    tz.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

/// `[midnight - 24h, midnight)` in UTC.
pub fn daily_window(midnight: &DateTime<Tz>) -> SyncWindow {
    SyncWindow::trailing_day(midnight.with_timezone(&Utc))
}
