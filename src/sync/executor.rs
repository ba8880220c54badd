use std::sync::Arc;

use crate::error::Result;
use crate::model::SyncWindow;
use crate::sync::{Sink, Source, SyncReport};

/// Runs one sync: projects first, then the window's time entries.
///
/// No retries happen here. A source or sink error ends the run and is
/// returned as-is; projects written before an entry failure stay written.
#[derive(Clone)]
pub struct SyncExecutor {
    source: Arc<dyn Source>,
    sink: Arc<dyn Sink>,
}

impl SyncExecutor {
    pub fn new(source: Arc<dyn Source>, sink: Arc<dyn Sink>) -> Self {
        Self { source, sink }
    }

    pub async fn run(&self, window: &SyncWindow) -> Result<SyncReport> {
        log::info!("fetching projects");
        let projects = self.source.list_projects().await?;
        log::info!("fetched projects count={}", projects.len());

        if projects.is_empty() {
            log::info!("no projects to sync");
        } else {
            self.sink.upsert_projects(&projects).await?;
        }

        log::info!(
            "fetching time entries from={} to={}",
            crate::model::format_instant(&window.from),
            crate::model::format_instant(&window.to)
        );
        let entries = self.source.list_time_entries(window).await?;
        log::info!("fetched time entries count={}", entries.len());

        if entries.is_empty() {
            log::info!("no entries to sync");
        } else {
            self.sink.upsert_entries(&entries).await?;
            log::info!("sync completed count={}", entries.len());
        }

        Ok(SyncReport {
            window: *window,
            projects_synced: projects.len(),
            entries_synced: entries.len(),
        })
    }
}
