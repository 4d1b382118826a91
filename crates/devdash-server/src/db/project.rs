// db/project.rs
// Project identity rows

use super::types::ProjectRow;
use rusqlite::{Connection, OptionalExtension, Row, params};

const PROJECT_COLUMNS: &str =
    "id, path, name, pinned, last_touched_at, missing_since, created_at, updated_at";

/// Parse a row selected with `PROJECT_COLUMNS`
pub fn parse_project_row(row: &Row) -> rusqlite::Result<ProjectRow> {
    Ok(ProjectRow {
        id: row.get(0)?,
        path: row.get(1)?,
        name: row.get(2)?,
        pinned: row.get::<_, i64>(3)? != 0,
        last_touched_at: row.get(4)?,
        missing_since: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Create or refresh a project row. Rediscovery clears the missing flag.
pub fn upsert_project_sync(
    conn: &Connection,
    id: &str,
    path: &str,
    name: &str,
    now: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO projects (id, path, name, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT(id) DO UPDATE SET
             path = excluded.path,
             name = excluded.name,
             missing_since = NULL,
             updated_at = excluded.updated_at",
        params![id, path, name, now],
    )?;
    Ok(())
}

pub fn get_project_sync(conn: &Connection, id: &str) -> rusqlite::Result<Option<ProjectRow>> {
    conn.query_row(
        &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?"),
        [id],
        parse_project_row,
    )
    .optional()
}

pub fn project_exists_sync(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    conn.query_row("SELECT 1 FROM projects WHERE id = ?", [id], |_| Ok(()))
        .optional()
        .map(|r| r.is_some())
}

/// All known projects, unordered
pub fn list_projects_sync(conn: &Connection) -> rusqlite::Result<Vec<ProjectRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {PROJECT_COLUMNS} FROM projects"))?;
    let rows = stmt.query_map([], parse_project_row)?;
    rows.collect()
}

/// Flip the pinned flag, returning the new value (None if unknown id)
pub fn toggle_pinned_sync(conn: &Connection, id: &str, now: &str) -> rusqlite::Result<Option<bool>> {
    conn.query_row(
        "UPDATE projects SET pinned = 1 - pinned, updated_at = ?2
         WHERE id = ?1
         RETURNING pinned",
        params![id, now],
        |row| Ok(row.get::<_, i64>(0)? != 0),
    )
    .optional()
}

/// Record an explicit "open"; returns false for an unknown id
pub fn touch_project_sync(conn: &Connection, id: &str, now: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE projects SET last_touched_at = ?2 WHERE id = ?1",
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Flag projects as missing; the first sighting of absence is kept
pub fn mark_missing_sync(conn: &Connection, ids: &[String], now: &str) -> rusqlite::Result<usize> {
    let mut stmt = conn.prepare(
        "UPDATE projects SET missing_since = ?2
         WHERE id = ?1 AND missing_since IS NULL",
    )?;
    let mut marked = 0;
    for id in ids {
        marked += stmt.execute(params![id, now])?;
    }
    Ok(marked)
}

pub fn clear_missing_sync(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        "UPDATE projects SET missing_since = NULL WHERE id = ?1 AND missing_since IS NOT NULL",
        [id],
    )?;
    Ok(changed > 0)
}
