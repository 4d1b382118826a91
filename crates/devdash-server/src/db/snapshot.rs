// db/snapshot.rs
// Append-only scan snapshots. "Latest" is the row with the highest seq.

use super::project::upsert_project_sync;
use super::types::{NewSnapshot, SnapshotRow, parse_tags_json};
use devdash_types::ProjectStatus;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::str::FromStr;

const SNAPSHOT_COLUMNS: &str = "seq, project_id, run_id, collected_at, signals_json, \
     health_score, hygiene_score, momentum_score, status, tags_json, breakdown_json, \
     description, timed_out";

fn parse_snapshot_row(row: &Row) -> rusqlite::Result<SnapshotRow> {
    let status: String = row.get(8)?;
    let tags_json: String = row.get(9)?;
    Ok(SnapshotRow {
        seq: row.get(0)?,
        project_id: row.get(1)?,
        run_id: row.get(2)?,
        collected_at: row.get(3)?,
        signals_json: row.get(4)?,
        health_score: row.get(5)?,
        hygiene_score: row.get(6)?,
        momentum_score: row.get(7)?,
        status: ProjectStatus::from_str(&status).unwrap_or_default(),
        tags: parse_tags_json(&tags_json),
        breakdown_json: row.get(10)?,
        description: row.get(11)?,
        timed_out: row.get::<_, i64>(12)? != 0,
    })
}

/// Append a snapshot, returning its seq
pub fn insert_snapshot_sync(conn: &Connection, snap: &NewSnapshot) -> rusqlite::Result<i64> {
    let tags_json = serde_json::to_string(&snap.tags)
        .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
    conn.execute(
        "INSERT INTO scan_snapshots (project_id, run_id, collected_at, signals_json,
             health_score, hygiene_score, momentum_score, status, tags_json,
             breakdown_json, description, timed_out)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            snap.project_id,
            snap.run_id,
            snap.collected_at,
            snap.signals_json,
            snap.health_score,
            snap.hygiene_score,
            snap.momentum_score,
            snap.status.as_str(),
            tags_json,
            snap.breakdown_json,
            snap.description,
            snap.timed_out as i64,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Write a project row and its new snapshot atomically
pub fn persist_project_snapshot_sync(
    conn: &Connection,
    path: &str,
    name: &str,
    snap: &NewSnapshot,
) -> rusqlite::Result<i64> {
    let tx = conn.unchecked_transaction()?;
    upsert_project_sync(&tx, &snap.project_id, path, name, &snap.collected_at)?;
    let seq = insert_snapshot_sync(&tx, snap)?;
    tx.commit()?;
    Ok(seq)
}

pub fn latest_snapshot_sync(
    conn: &Connection,
    project_id: &str,
) -> rusqlite::Result<Option<SnapshotRow>> {
    conn.query_row(
        &format!(
            "SELECT {SNAPSHOT_COLUMNS} FROM scan_snapshots
             WHERE project_id = ? ORDER BY seq DESC LIMIT 1"
        ),
        [project_id],
        parse_snapshot_row,
    )
    .optional()
}

/// Latest snapshot for every project that has one
pub fn latest_snapshots_sync(conn: &Connection) -> rusqlite::Result<HashMap<String, SnapshotRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM scan_snapshots
         WHERE seq IN (SELECT MAX(seq) FROM scan_snapshots GROUP BY project_id)"
    ))?;
    let rows = stmt.query_map([], parse_snapshot_row)?;
    let mut latest = HashMap::new();
    for row in rows {
        let row = row?;
        latest.insert(row.project_id.clone(), row);
    }
    Ok(latest)
}

/// Most recent snapshots for one project, newest first
pub fn snapshot_history_sync(
    conn: &Connection,
    project_id: &str,
    limit: usize,
) -> rusqlite::Result<Vec<SnapshotRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM scan_snapshots
         WHERE project_id = ?1 ORDER BY seq DESC LIMIT ?2"
    ))?;
    let rows = stmt.query_map(params![project_id, limit as i64], parse_snapshot_row)?;
    rows.collect()
}
