//! Toggl Track API v9 client.

pub mod rate_limit;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{format_instant, Project, SyncWindow, TimeEntry};
use crate::sync::Source;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ERROR_BODY: usize = 4096;

pub struct TogglClient {
    http: reqwest::Client,
    base_url: Url,
    api_token: String,
    workspace_id: Option<i64>,
    backoff: Vec<Duration>,
}

impl TogglClient {
    pub fn new(base_url: Url, api_token: impl Into<String>, workspace_id: Option<i64>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url,
            api_token: api_token.into(),
            workspace_id,
            backoff: rate_limit::BACKOFF.to_vec(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.base_url.clone(), config.api_token.clone(), config.workspace_id)
    }

    /// Override the 429 backoff schedule.
    pub fn with_backoff(mut self, backoff: Vec<Duration>) -> Self {
        self.backoff = backoff;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("invalid Toggl URL for {path}: {e}")))
    }

    /// GET a JSON document, retrying on 429 per [`rate_limit`].
    async fn get_json<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        let mut attempt = 0;
        loop {
            match self.get_json_once(url.clone(), query).await {
                Err(e) if rate_limit::is_rate_limited(&e) => {
                    match rate_limit::backoff_for(attempt, &self.backoff) {
                        Some(wait) => {
                            rate_limit::backoff_sleep(attempt, wait).await;
                            attempt += 1;
                        }
                        None => return Err(e),
                    }
                }
                other => return other,
            }
        }
    }

    async fn get_json_once<T: DeserializeOwned>(&self, url: Url, query: &[(&str, String)]) -> Result<T> {
        log::debug!("GET {url}");
        let resp = self
            .http
            .get(url)
            .basic_auth(&self.api_token, Some("api_token"))
            .header(ACCEPT, "application/json")
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY).collect(),
            });
        }
        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl Source for TogglClient {
    async fn list_time_entries(&self, window: &SyncWindow) -> Result<Vec<TimeEntry>> {
        let url = self.endpoint("/api/v9/me/time_entries")?;
        let query = [
            ("start_date", format_instant(&window.from)),
            ("end_date", format_instant(&window.to)),
        ];
        let raw: Vec<WireTimeEntry> = self.get_json(url, &query).await?;
        Ok(raw.into_iter().map(TimeEntry::from).collect())
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let path = match self.workspace_id {
            Some(ws) => format!("/api/v9/workspaces/{ws}/projects"),
            None => "/api/v9/me/projects".to_string(),
        };
        let url = self.endpoint(&path)?;
        let raw: Vec<WireProject> = self.get_json(url, &[]).await?;
        Ok(raw.into_iter().map(Project::from).collect())
    }
}

// ── Wire types ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireTimeEntry {
    id: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    project_id: Option<i64>,
    #[serde(default)]
    workspace_id: Option<i64>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    start: DateTime<Utc>,
    #[serde(default)]
    stop: Option<DateTime<Utc>>,
    duration: i64,
}

impl From<WireTimeEntry> for TimeEntry {
    fn from(w: WireTimeEntry) -> Self {
        TimeEntry {
            id: w.id,
            description: w.description.unwrap_or_default(),
            project_id: w.project_id,
            workspace_id: w.workspace_id,
            tags: w.tags.unwrap_or_default(),
            start: w.start,
            stop: w.stop,
            duration_sec: w.duration,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireProject {
    id: i64,
    workspace_id: i64,
    name: String,
    #[serde(default)]
    active: bool,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    client_id: Option<i64>,
    at: DateTime<Utc>,
}

impl From<WireProject> for Project {
    fn from(w: WireProject) -> Self {
        Project {
            id: w.id,
            workspace_id: w.workspace_id,
            name: w.name,
            active: w.active,
            is_private: w.is_private,
            color: w.color.unwrap_or_default(),
            client_id: w.client_id,
            updated_at: w.at,
        }
    }
}
