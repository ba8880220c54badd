pub mod executor;
pub mod guard;
#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::model::{Project, SyncWindow, TimeEntry};

/// Where time entries and projects come from.
#[async_trait]
pub trait Source: Send + Sync {
    /// Entries whose start falls in `window`.
    async fn list_time_entries(&self, window: &SyncWindow) -> Result<Vec<TimeEntry>>;

    /// All projects visible to the configured credential.
    async fn list_projects(&self) -> Result<Vec<Project>>;
}

/// Where they are mirrored to. Both calls must be idempotent upserts keyed on
/// `id`, and each batch must be applied atomically.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn upsert_entries(&self, entries: &[TimeEntry]) -> Result<()>;

    async fn upsert_projects(&self, projects: &[Project]) -> Result<()>;
}

/// Report returned after a sync run completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub window: SyncWindow,
    pub projects_synced: usize,
    pub entries_synced: usize,
}
