//! In-memory source and sink used by unit tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::model::{Project, SyncWindow, TimeEntry};
use crate::sync::{Sink, Source};

pub fn sample_projects() -> Vec<Project> {
    vec![Project {
        id: 123,
        workspace_id: 7,
        name: "Website".to_string(),
        active: true,
        is_private: false,
        color: "#06aaf5".to_string(),
        client_id: None,
        updated_at: Utc.with_ymd_and_hms(2025, 7, 30, 12, 0, 0).unwrap(),
    }]
}

/// One entry with a project, one without.
pub fn sample_entries() -> Vec<TimeEntry> {
    let start = Utc.with_ymd_and_hms(2025, 8, 1, 9, 0, 0).unwrap();
    vec![
        TimeEntry {
            id: 1,
            description: "Design review".to_string(),
            project_id: Some(123),
            workspace_id: Some(7),
            tags: vec!["billable".to_string()],
            start,
            stop: Some(start + chrono::Duration::minutes(90)),
            duration_sec: 5400,
        },
        TimeEntry {
            id: 2,
            description: "Inbox".to_string(),
            project_id: None,
            workspace_id: Some(7),
            tags: vec![],
            start: start + chrono::Duration::hours(2),
            stop: Some(start + chrono::Duration::hours(3)),
            duration_sec: 3600,
        },
    ]
}

/// Fixed in-memory source. Optionally blocks each entry fetch until
/// released, so tests can hold a run in flight.
#[derive(Default)]
pub struct FakeSource {
    projects: Vec<Project>,
    entries: Vec<TimeEntry>,
    fail_projects: bool,
    fail_entries: bool,
    gate: Option<Arc<Notify>>,
    started: Arc<Notify>,
    windows: Mutex<Vec<SyncWindow>>,
}

impl FakeSource {
    pub fn new(projects: Vec<Project>, entries: Vec<TimeEntry>) -> Self {
        Self {
            projects,
            entries,
            ..Default::default()
        }
    }

    pub fn failing_projects(mut self) -> Self {
        self.fail_projects = true;
        self
    }

    pub fn failing_entries(mut self) -> Self {
        self.fail_entries = true;
        self
    }

    /// Block entry fetches until `gate` is notified.
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Notified when an entry fetch begins.
    pub fn started(&self) -> Arc<Notify> {
        Arc::clone(&self.started)
    }

    /// Windows requested so far, in order.
    pub fn windows(&self) -> Vec<SyncWindow> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait]
impl Source for FakeSource {
    async fn list_time_entries(&self, window: &SyncWindow) -> Result<Vec<TimeEntry>> {
        self.windows.lock().unwrap().push(*window);
        self.started.notify_one();
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail_entries {
            return Err(Error::Api {
                status: 500,
                message: "entries unavailable".into(),
            });
        }
        Ok(self.entries.clone())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        if self.fail_projects {
            return Err(Error::Api {
                status: 403,
                message: "forbidden".into(),
            });
        }
        Ok(self.projects.clone())
    }
}

/// Keyed in-memory sink with upsert semantics and call counters.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<BTreeMap<i64, TimeEntry>>,
    projects: Mutex<BTreeMap<i64, Project>>,
    entry_calls: AtomicUsize,
    project_calls: AtomicUsize,
    fail_entries: bool,
}

impl MemorySink {
    pub fn failing_entries(mut self) -> Self {
        self.fail_entries = true;
        self
    }

    pub fn entries(&self) -> Vec<TimeEntry> {
        self.entries.lock().unwrap().values().cloned().collect()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.projects.lock().unwrap().values().cloned().collect()
    }

    pub fn entry_calls(&self) -> usize {
        self.entry_calls.load(Ordering::SeqCst)
    }

    pub fn project_calls(&self) -> usize {
        self.project_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn upsert_entries(&self, entries: &[TimeEntry]) -> Result<()> {
        self.entry_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_entries {
            return Err(Error::Database("disk I/O error".into()));
        }
        let mut stored = self.entries.lock().unwrap();
        for e in entries {
            stored.insert(e.id, e.clone());
        }
        Ok(())
    }

    async fn upsert_projects(&self, projects: &[Project]) -> Result<()> {
        self.project_calls.fetch_add(1, Ordering::SeqCst);
        let mut stored = self.projects.lock().unwrap();
        for p in projects {
            stored.insert(p.id, p.clone());
        }
        Ok(())
    }
}
