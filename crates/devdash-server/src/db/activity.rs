// db/activity.rs
// Append-only audit log

use devdash_types::{ActivityKind, ActivityRecord};
use rusqlite::{Connection, params};
use std::str::FromStr;

/// Append one record, returning its id
pub fn insert_activity_sync(
    conn: &Connection,
    project_id: &str,
    kind: ActivityKind,
    payload: Option<&serde_json::Value>,
    now: &str,
) -> rusqlite::Result<i64> {
    let payload_json = payload.map(|p| p.to_string());
    conn.execute(
        "INSERT INTO activity (project_id, kind, payload_json, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![project_id, kind.as_str(), payload_json, now],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Newest `limit` records for a project, newest first.
///
/// Records sharing a timestamp come back in reverse insertion order.
pub fn recent_activity_sync(
    conn: &Connection,
    project_id: &str,
    limit: usize,
) -> rusqlite::Result<Vec<ActivityRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, project_id, kind, payload_json, created_at
         FROM activity
         WHERE project_id = ?1
         ORDER BY created_at DESC, id DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![project_id, limit as i64], |row| {
        let kind: String = row.get(2)?;
        let payload: Option<String> = row.get(3)?;
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            kind,
            payload,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (id, project_id, kind, payload, created_at) = row?;
        let Ok(kind) = ActivityKind::from_str(&kind) else {
            tracing::debug!(id, kind = %kind, "Skipping activity row with unknown kind");
            continue;
        };
        records.push(ActivityRecord {
            id,
            project_id,
            kind,
            payload: payload.and_then(|p| serde_json::from_str(&p).ok()),
            created_at,
        });
    }
    Ok(records)
}
