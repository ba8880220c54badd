pub mod migrate;
pub mod repository;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::model::{Project, TimeEntry};
use crate::sync::Sink;

/// Bound on the startup connectivity check.
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Database wraps two `tokio_rusqlite::Connection` instances (writer + reader)
/// using WAL mode for concurrent access. The writer serializes writes via
/// `tokio_rusqlite`'s internal channel; the reader can proceed without blocking.
#[derive(Clone)]
pub struct Database {
    writer: tokio_rusqlite::Connection,
    reader: tokio_rusqlite::Connection,
}

impl Database {
    /// Open the database at the default path (`~/.toggldw/toggldw.db`).
    pub async fn open() -> Result<Self> {
        Self::open_at(default_path()?).await
    }

    /// Open the database at the given path, applying pending migrations.
    pub async fn open_at(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| Error::Config(e.to_string()))?;
        }

        let writer = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_writer(&writer).await?;

        let reader = tokio_rusqlite::Connection::open(&path).await?;
        Self::init_reader(&reader).await?;

        Ok(Self { writer, reader })
    }

    /// Open an in-memory database (for testing).
    pub async fn open_memory() -> Result<Self> {
        let writer = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init_writer(&writer).await?;

        // In-memory DBs are per-connection, so reader and writer share one.
        Ok(Self {
            reader: writer.clone(),
            writer,
        })
    }

    async fn init_writer(conn: &tokio_rusqlite::Connection) -> Result<()> {
        let applied = conn
            .call(|conn| {
                conn.execute_batch(
                    "PRAGMA journal_mode=WAL;\
                     PRAGMA busy_timeout=5000;",
                )?;
                Ok::<_, rusqlite::Error>(migrate::run(conn, migrate::MIGRATIONS))
            })
            .await??;
        if !applied.is_empty() {
            log::info!("applied {} migration(s): {applied:?}", applied.len());
        }
        Ok(())
    }

    async fn init_reader(conn: &tokio_rusqlite::Connection) -> Result<()> {
        conn.call(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode=WAL;\
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok::<(), rusqlite::Error>(())
        })
        .await?;
        Ok(())
    }

    /// Get a reference to the writer connection.
    pub fn writer(&self) -> &tokio_rusqlite::Connection {
        &self.writer
    }

    /// Get a reference to the reader connection.
    pub fn reader(&self) -> &tokio_rusqlite::Connection {
        &self.reader
    }

    /// Round-trip a trivial query, failing after [`PING_TIMEOUT`].
    pub async fn ping(&self) -> Result<()> {
        let check = self.reader.call(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
        });
        match tokio::time::timeout(PING_TIMEOUT, check).await {
            Ok(result) => {
                result?;
                Ok(())
            }
            Err(_) => Err(Error::Database(format!(
                "connectivity check timed out after {PING_TIMEOUT:?}"
            ))),
        }
    }

    /// Row counts for the status report: `(entries, projects)`.
    pub async fn counts(&self) -> Result<(i64, i64)> {
        let counts = self
            .reader
            .call(|conn| {
                Ok::<_, rusqlite::Error>((
                    repository::count_time_entries(conn)?,
                    repository::count_projects(conn)?,
                ))
            })
            .await?;
        Ok(counts)
    }

    pub async fn applied_migrations(&self) -> Result<Vec<migrate::MigrationRecord>> {
        let records = self.reader.call(|conn| migrate::list_applied(conn)).await?;
        Ok(records)
    }
}

#[async_trait]
impl Sink for Database {
    async fn upsert_entries(&self, entries: &[TimeEntry]) -> Result<()> {
        let entries = entries.to_vec();
        let count = self
            .writer
            .call(move |conn| repository::upsert_time_entries(conn, &entries))
            .await?;
        log::info!("sqlite sink upserted entries count={count}");
        Ok(())
    }

    async fn upsert_projects(&self, projects: &[Project]) -> Result<()> {
        let projects = projects.to_vec();
        let count = self
            .writer
            .call(move |conn| repository::upsert_projects(conn, &projects))
            .await?;
        log::info!("sqlite sink upserted projects count={count}");
        Ok(())
    }
}

/// `~/.toggldw/toggldw.db`
pub fn default_path() -> Result<std::path::PathBuf> {
    let dir = dirs::home_dir()
        .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
        .join(".toggldw");
    Ok(dir.join("toggldw.db"))
}
