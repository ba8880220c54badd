//! Versioned schema migrations with an applied-versions ledger.
//!
//! Scripts are named `NNNN_description.sql`. The numeric prefix is the
//! version; scripts run in ascending version order, each inside its own
//! transaction together with its ledger row, and a recorded version is
//! never applied again.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::{params, Connection};

use crate::error::{Error, Result};
use crate::model::format_instant;

static RE_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)_").unwrap());

/// Scripts bundled into the binary, as `(file name, SQL)` pairs.
pub const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_create_time_entries.sql",
        include_str!("migrations/0001_create_time_entries.sql"),
    ),
    (
        "0002_create_projects.sql",
        include_str!("migrations/0002_create_projects.sql"),
    ),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration<'a> {
    pub version: i64,
    pub name: &'a str,
    pub sql: &'a str,
}

/// A row of the `schema_migrations` ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: i64,
    pub applied_at: String,
}

/// Extract the leading version number from a script name.
pub fn parse_version(name: &str) -> Result<i64> {
    let caps = RE_VERSION.captures(name).ok_or_else(|| {
        Error::Migration(format!("invalid migration filename {name:?}: missing version prefix"))
    })?;
    caps[1]
        .parse::<i64>()
        .map_err(|e| Error::Migration(format!("invalid migration filename {name:?}: {e}")))
}

/// Parse and order scripts by version. Duplicate versions are an error.
pub fn plan<'a>(scripts: &[(&'a str, &'a str)]) -> Result<Vec<Migration<'a>>> {
    let mut migrations = scripts
        .iter()
        .map(|&(name, sql)| {
            Ok(Migration {
                version: parse_version(name)?,
                name,
                sql,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    migrations.sort_by_key(|m| m.version);

    for pair in migrations.windows(2) {
        if pair[0].version == pair[1].version {
            return Err(Error::Migration(format!(
                "duplicate migration version {}: {} and {}",
                pair[0].version, pair[0].name, pair[1].name
            )));
        }
    }
    Ok(migrations)
}

pub fn ensure_ledger(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )
}

pub fn applied_versions(conn: &Connection) -> Result<BTreeSet<i64>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let rows = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    rows.collect()
}

pub fn list_applied(conn: &Connection) -> Result<Vec<MigrationRecord>, rusqlite::Error> {
    let mut stmt =
        conn.prepare("SELECT version, applied_at FROM schema_migrations ORDER BY version")?;
    let rows = stmt.query_map([], |row| {
        Ok(MigrationRecord {
            version: row.get(0)?,
            applied_at: row.get(1)?,
        })
    })?;
    rows.collect()
}

/// Apply every pending script. Returns the versions applied by this call.
///
/// A failing script rolls back its own transaction and stops the run;
/// versions applied before it stay recorded.
pub fn run(conn: &mut Connection, scripts: &[(&str, &str)]) -> Result<Vec<i64>> {
    let migrations = plan(scripts)?;
    ensure_ledger(conn).map_err(|e| Error::Migration(e.to_string()))?;
    let applied = applied_versions(conn).map_err(|e| Error::Migration(e.to_string()))?;

    let mut newly_applied = Vec::new();
    for m in migrations {
        if applied.contains(&m.version) {
            log::debug!("migration already applied version={} file={}", m.version, m.name);
            continue;
        }
        log::info!("applying migration version={} file={}", m.version, m.name);
        apply_one(conn, &m).map_err(|e| Error::Migration(format!("applying {}: {e}", m.name)))?;
        newly_applied.push(m.version);
    }
    Ok(newly_applied)
}

fn apply_one(conn: &mut Connection, m: &Migration<'_>) -> Result<(), rusqlite::Error> {
    let tx = conn.transaction()?;
    tx.execute_batch(m.sql)?;
    tx.execute(
        "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        params![m.version, format_instant(&Utc::now())],
    )?;
    tx.commit()
}
