pub mod config;
pub mod error;
pub mod model;
pub mod schedule;
pub mod server;
pub mod storage;
pub mod sync;
pub mod toggl;
pub mod window;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Project, SyncWindow, TimeEntry};
pub use schedule::{Schedule, Scheduler};
pub use storage::Database;
pub use sync::{Sink, Source, SyncReport};
pub use toggl::TogglClient;

use std::sync::Arc;
use std::time::Duration;

use sync::executor::SyncExecutor;
use sync::guard::SingleFlight;

/// Main entry point for the Toggl data warehouse.
///
/// Every trigger (command line, timer, HTTP) goes through [`TogglDW::run_once`],
/// so at most one sync runs at a time regardless of where it was started.
#[derive(Clone)]
pub struct TogglDW {
    executor: SyncExecutor,
    flight: SingleFlight,
}

impl TogglDW {
    pub fn new(source: Arc<dyn Source>, sink: Arc<dyn Sink>) -> Self {
        Self {
            executor: SyncExecutor::new(source, sink),
            flight: SingleFlight::new(),
        }
    }

    /// Wire the Toggl API client to a SQLite warehouse.
    pub fn from_parts(client: TogglClient, db: Database) -> Self {
        Self::new(Arc::new(client), Arc::new(db))
    }

    /// Run one sync for `window`.
    ///
    /// Returns [`Error::AlreadyRunning`] without touching the in-flight run
    /// when another sync holds the guard.
    pub async fn run_once(&self, window: SyncWindow) -> Result<SyncReport> {
        let Some(_guard) = self.flight.try_begin() else {
            log::warn!("sync already running, rejecting window {window}");
            return Err(Error::AlreadyRunning);
        };
        self.executor.run(&window).await
    }

    /// Like [`TogglDW::run_once`], bounded by `timeout`.
    ///
    /// The guard is released when the timed-out run is dropped.
    pub async fn run_with_timeout(
        &self,
        window: SyncWindow,
        timeout: Option<Duration>,
    ) -> Result<SyncReport> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.run_once(window))
                .await
                .unwrap_or(Err(Error::Timeout(limit))),
            None => self.run_once(window).await,
        }
    }
}
