// db/scan.rs
// Refresh completion records

use super::types::ScanRow;
use rusqlite::{Connection, OptionalExtension, Row, params};

fn parse_scan_row(row: &Row) -> rusqlite::Result<ScanRow> {
    Ok(ScanRow {
        id: row.get(0)?,
        run_id: row.get(1)?,
        scanned_at: row.get(2)?,
        project_count: row.get::<_, i64>(3)?.max(0) as usize,
        failed_count: row.get::<_, i64>(4)?.max(0) as usize,
        duration_ms: row.get::<_, i64>(5)?.max(0) as u64,
    })
}

/// Record a completed run, returning the scan id
pub fn insert_scan_sync(
    conn: &Connection,
    run_id: &str,
    scanned_at: &str,
    project_count: usize,
    failed_count: usize,
    duration_ms: u64,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO scans (run_id, scanned_at, project_count, failed_count, duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id,
            scanned_at,
            project_count as i64,
            failed_count as i64,
            duration_ms as i64
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent completed run
pub fn latest_scan_sync(conn: &Connection) -> rusqlite::Result<Option<ScanRow>> {
    conn.query_row(
        "SELECT id, run_id, scanned_at, project_count, failed_count, duration_ms
         FROM scans ORDER BY id DESC LIMIT 1",
        [],
        parse_scan_row,
    )
    .optional()
}

pub fn count_scans_sync(conn: &Connection) -> rusqlite::Result<usize> {
    conn.query_row("SELECT COUNT(*) FROM scans", [], |r| r.get::<_, i64>(0))
        .map(|n| n.max(0) as usize)
}
