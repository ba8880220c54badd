use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::model::{format_instant, Project, TimeEntry};

// ── Time entries ───────────────────────────────────────────────────

pub fn upsert_time_entry(conn: &Connection, entry: &TimeEntry) -> Result<(), rusqlite::Error> {
    let tags = encode_tags(&entry.tags);
    let stop_at = entry.stop.as_ref().map(format_instant);

    let mut stmt = conn.prepare_cached(
        "INSERT INTO time_entries (
            id, description, project_id, workspace_id, tags,
            start_at, stop_at, duration_sec
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            description=excluded.description, project_id=excluded.project_id,
            workspace_id=excluded.workspace_id, tags=excluded.tags,
            start_at=excluded.start_at, stop_at=excluded.stop_at,
            duration_sec=excluded.duration_sec",
    )?;
    stmt.execute(params![
        entry.id,
        entry.description,
        entry.project_id,
        entry.workspace_id,
        tags,
        format_instant(&entry.start),
        stop_at,
        entry.duration_sec,
    ])?;
    Ok(())
}

/// Upsert a batch of entries in one transaction. Any failure rolls back the
/// whole batch.
pub fn upsert_time_entries(
    conn: &mut Connection,
    entries: &[TimeEntry],
) -> Result<usize, rusqlite::Error> {
    let tx = conn.transaction()?;
    for entry in entries {
        upsert_time_entry(&tx, entry)?;
    }
    tx.commit()?;
    Ok(entries.len())
}

pub fn get_time_entry(conn: &Connection, id: i64) -> Result<Option<TimeEntry>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, description, project_id, workspace_id, tags, start_at, stop_at, duration_sec
         FROM time_entries WHERE id = ?1",
        params![id],
        time_entry_from_row,
    )
    .optional()
}

/// Entries whose start falls in `[from, to)`, oldest first.
pub fn list_time_entries_between(
    conn: &Connection,
    from: &DateTime<Utc>,
    to: &DateTime<Utc>,
) -> Result<Vec<TimeEntry>, rusqlite::Error> {
    let mut stmt = conn.prepare(
        "SELECT id, description, project_id, workspace_id, tags, start_at, stop_at, duration_sec
         FROM time_entries WHERE start_at >= ?1 AND start_at < ?2
         ORDER BY start_at, id",
    )?;
    let rows = stmt.query_map(
        params![format_instant(from), format_instant(to)],
        time_entry_from_row,
    )?;
    rows.collect()
}

pub fn count_time_entries(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("SELECT COUNT(*) FROM time_entries", [], |row| row.get(0))
}

fn time_entry_from_row(row: &Row<'_>) -> Result<TimeEntry, rusqlite::Error> {
    let tags: String = row.get(4)?;
    let stop_at: Option<String> = row.get(6)?;
    Ok(TimeEntry {
        id: row.get(0)?,
        description: row.get(1)?,
        project_id: row.get(2)?,
        workspace_id: row.get(3)?,
        tags: decode_tags(&tags).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e))
        })?,
        start: parse_instant(5, &row.get::<_, String>(5)?)?,
        stop: stop_at.map(|s| parse_instant(6, &s)).transpose()?,
        duration_sec: row.get(7)?,
    })
}

// ── Projects ───────────────────────────────────────────────────────

pub fn upsert_project(conn: &Connection, project: &Project) -> Result<(), rusqlite::Error> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO projects (
            id, workspace_id, name, active, is_private, color, client_id, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(id) DO UPDATE SET
            workspace_id=excluded.workspace_id, name=excluded.name,
            active=excluded.active, is_private=excluded.is_private,
            color=excluded.color, client_id=excluded.client_id,
            updated_at=excluded.updated_at",
    )?;
    stmt.execute(params![
        project.id,
        project.workspace_id,
        project.name,
        project.active as i32,
        project.is_private as i32,
        project.color,
        project.client_id,
        format_instant(&project.updated_at),
    ])?;
    Ok(())
}

/// Upsert a batch of projects in one transaction.
pub fn upsert_projects(
    conn: &mut Connection,
    projects: &[Project],
) -> Result<usize, rusqlite::Error> {
    let tx = conn.transaction()?;
    for project in projects {
        upsert_project(&tx, project)?;
    }
    tx.commit()?;
    Ok(projects.len())
}

pub fn get_project(conn: &Connection, id: i64) -> Result<Option<Project>, rusqlite::Error> {
    conn.query_row(
        "SELECT id, workspace_id, name, active, is_private, color, client_id, updated_at
         FROM projects WHERE id = ?1",
        params![id],
        |row| {
            Ok(Project {
                id: row.get(0)?,
                workspace_id: row.get(1)?,
                name: row.get(2)?,
                active: row.get::<_, i32>(3)? != 0,
                is_private: row.get::<_, i32>(4)? != 0,
                color: row.get(5)?,
                client_id: row.get(6)?,
                updated_at: parse_instant(7, &row.get::<_, String>(7)?)?,
            })
        },
    )
    .optional()
}

pub fn count_projects(conn: &Connection) -> Result<i64, rusqlite::Error> {
    conn.query_row("SELECT COUNT(*) FROM projects", [], |row| row.get(0))
}

// ── Encoding helpers ───────────────────────────────────────────────

/// Tags are stored as a JSON array in source order, so the same list always
/// encodes to the same bytes.
pub fn encode_tags(tags: &[String]) -> String {
    serde_json::to_string(tags).unwrap_or_else(|_| "[]".to_string())
}

pub fn decode_tags(raw: &str) -> Result<Vec<String>, serde_json::Error> {
    serde_json::from_str(raw)
}

fn parse_instant(idx: usize, raw: &str) -> Result<DateTime<Utc>, rusqlite::Error> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use chrono::TimeZone;

    fn entry(id: i64, description: &str, project_id: Option<i64>) -> TimeEntry {
        TimeEntry {
            id,
            description: description.to_string(),
            project_id,
            workspace_id: Some(7),
            tags: vec!["billable".to_string(), "client-a".to_string()],
            start: Utc.with_ymd_and_hms(2025, 8, 1, 9, 0, 0).unwrap(),
            stop: Some(Utc.with_ymd_and_hms(2025, 8, 1, 10, 30, 0).unwrap()),
            duration_sec: 5400,
        }
    }

    fn project(id: i64, name: &str) -> Project {
        Project {
            id,
            workspace_id: 7,
            name: name.to_string(),
            active: true,
            is_private: false,
            color: "#06aaf5".to_string(),
            client_id: None,
            updated_at: Utc.with_ymd_and_hms(2025, 7, 30, 12, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_entry_overwrite_on_reobservation() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_time_entries(conn, &[entry(1, "A", Some(123))])?;
                upsert_time_entries(conn, &[entry(1, "B", None)])?;

                assert_eq!(count_time_entries(conn)?, 1);
                let stored = get_time_entry(conn, 1)?.unwrap();
                assert_eq!(stored.description, "B");
                assert_eq!(stored.project_id, None);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_entry_upsert_is_idempotent() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let batch = vec![entry(1, "A", Some(123)), entry(2, "B", None)];
                upsert_time_entries(conn, &batch)?;
                let raw_once: Vec<(i64, String)> = conn
                    .prepare("SELECT id, tags FROM time_entries ORDER BY id")?
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<_, _>>()?;

                upsert_time_entries(conn, &batch)?;
                let raw_twice: Vec<(i64, String)> = conn
                    .prepare("SELECT id, tags FROM time_entries ORDER BY id")?
                    .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<_, _>>()?;

                assert_eq!(raw_once, raw_twice);
                assert_eq!(count_time_entries(conn)?, 2);
                assert_eq!(get_time_entry(conn, 1)?.unwrap(), batch[0]);
                assert_eq!(get_time_entry(conn, 2)?.unwrap(), batch[1]);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_running_entry_persists_verbatim() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut running = entry(9, "still going", None);
                running.stop = None;
                running.duration_sec = -1754038800;
                running.workspace_id = None;
                running.tags.clear();
                upsert_time_entries(conn, &[running.clone()])?;

                let stored = get_time_entry(conn, 9)?.unwrap();
                assert_eq!(stored, running);
                let (stop, ws): (Option<String>, Option<i64>) = conn.query_row(
                    "SELECT stop_at, workspace_id FROM time_entries WHERE id = 9",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )?;
                assert!(stop.is_none());
                assert!(ws.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_batch_rolls_back_on_failure() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                // A trigger that rejects one id makes the second insert fail.
                conn.execute_batch(
                    "CREATE TRIGGER reject_666 BEFORE INSERT ON time_entries
                     WHEN NEW.id = 666 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
                )?;
                let result = upsert_time_entries(conn, &[entry(1, "A", None), entry(666, "X", None)]);
                assert!(result.is_err());
                assert_eq!(count_time_entries(conn)?, 0);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_project_round_trip_and_overwrite() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                upsert_projects(conn, &[project(123, "Website"), project(124, "Ops")])?;
                let mut renamed = project(123, "Website v2");
                renamed.client_id = Some(55);
                renamed.active = false;
                upsert_projects(conn, &[renamed.clone()])?;

                assert_eq!(count_projects(conn)?, 2);
                assert_eq!(get_project(conn, 123)?.unwrap(), renamed);
                assert_eq!(get_project(conn, 124)?.unwrap().client_id, None);
                assert!(get_project(conn, 999)?.is_none());
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_between_is_half_open() {
        let db = Database::open_memory().await.unwrap();

        db.writer()
            .call(|conn| {
                let mut late = entry(2, "late", None);
                late.start = Utc.with_ymd_and_hms(2025, 8, 1, 13, 0, 0).unwrap();
                upsert_time_entries(conn, &[entry(1, "early", None), late])?;

                let from = Utc.with_ymd_and_hms(2025, 8, 1, 8, 0, 0).unwrap();
                let to = Utc.with_ymd_and_hms(2025, 8, 1, 13, 0, 0).unwrap();
                let found = list_time_entries_between(conn, &from, &to)?;
                assert_eq!(found.len(), 1);
                assert_eq!(found[0].id, 1);
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_tag_encoding_is_stable() {
        let tags = vec!["b".to_string(), "a".to_string()];
        assert_eq!(encode_tags(&tags), r#"["b","a"]"#);
        assert_eq!(encode_tags(&tags), encode_tags(&tags.clone()));
        assert_eq!(encode_tags(&[]), "[]");
        assert_eq!(decode_tags(r#"["b","a"]"#).unwrap(), tags);
    }
}
