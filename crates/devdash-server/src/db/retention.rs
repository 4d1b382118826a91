//! Data retention for the two unbounded tables.
//!
//! - activity: rows older than `activity_retention_days` are deleted
//! - scan_snapshots: only the newest `snapshot_history` rows per project are kept
//!
//! A value of 0 disables the corresponding rule.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, params};

/// Rows removed by one retention pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionStats {
    pub activity_deleted: usize,
    pub snapshots_pruned: usize,
}

const BATCH: i64 = 10_000;

/// Delete activity rows created before `now - days`
pub fn purge_activity_sync(
    conn: &Connection,
    days: u32,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    if days == 0 {
        return Ok(0);
    }
    let cutoff = (now - Duration::days(i64::from(days))).to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut total = 0;
    loop {
        let deleted = conn.execute(
            "DELETE FROM activity WHERE id IN
                (SELECT id FROM activity WHERE created_at < ?1 LIMIT ?2)",
            params![cutoff, BATCH],
        )?;
        total += deleted;
        if (deleted as i64) < BATCH {
            break;
        }
    }
    if total > 0 {
        tracing::info!("[retention] Deleted {} activity rows (>{} days old)", total, days);
    }
    Ok(total)
}

/// Keep only the newest `keep` snapshots per project
pub fn prune_snapshot_history_sync(conn: &Connection, keep: usize) -> rusqlite::Result<usize> {
    if keep == 0 {
        return Ok(0);
    }
    let deleted = conn.execute(
        "DELETE FROM scan_snapshots WHERE seq IN (
             SELECT seq FROM (
                 SELECT seq, ROW_NUMBER() OVER (PARTITION BY project_id ORDER BY seq DESC) AS rn
                 FROM scan_snapshots
             ) WHERE rn > ?1
         )",
        [keep as i64],
    )?;
    if deleted > 0 {
        tracing::info!("[retention] Pruned {} old snapshots (keeping {} per project)", deleted, keep);
    }
    Ok(deleted)
}

/// Run both rules
pub fn run_retention_sync(
    conn: &Connection,
    activity_days: u32,
    snapshot_keep: usize,
    now: DateTime<Utc>,
) -> rusqlite::Result<RetentionStats> {
    Ok(RetentionStats {
        activity_deleted: purge_activity_sync(conn, activity_days, now)?,
        snapshots_pruned: prune_snapshot_history_sync(conn, snapshot_keep)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::activity::insert_activity_sync;
    use crate::db::project::upsert_project_sync;
    use crate::db::snapshot::{insert_snapshot_sync, snapshot_history_sync};
    use crate::db::test_support::{new_snapshot, setup_conn};
    use devdash_types::ActivityKind;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_purge_activity_older_than_window() {
        let conn = setup_conn();
        upsert_project_sync(&conn, "p", "/dev/p", "p", "2026-01-01T00:00:00Z").unwrap();
        insert_activity_sync(&conn, "p", ActivityKind::Pin, None, "2026-01-01T00:00:00Z").unwrap();
        insert_activity_sync(&conn, "p", ActivityKind::Pin, None, "2026-05-20T00:00:00Z").unwrap();

        assert_eq!(purge_activity_sync(&conn, 90, now()).unwrap(), 1);
        let remaining: i64 = conn
            .query_row("SELECT COUNT(*) FROM activity", [], |r| r.get(0))
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn test_zero_days_disables_purge() {
        let conn = setup_conn();
        upsert_project_sync(&conn, "p", "/dev/p", "p", "2026-01-01T00:00:00Z").unwrap();
        insert_activity_sync(&conn, "p", ActivityKind::Pin, None, "2000-01-01T00:00:00Z").unwrap();
        assert_eq!(purge_activity_sync(&conn, 0, now()).unwrap(), 0);
    }

    #[test]
    fn test_prune_keeps_newest_per_project() {
        let conn = setup_conn();
        for id in ["a", "b"] {
            upsert_project_sync(&conn, id, &format!("/dev/{id}"), id, "2026-01-01T00:00:00Z").unwrap();
        }
        for score in 0..5 {
            insert_snapshot_sync(&conn, &new_snapshot("a", score)).unwrap();
        }
        insert_snapshot_sync(&conn, &new_snapshot("b", 1)).unwrap();

        assert_eq!(prune_snapshot_history_sync(&conn, 2).unwrap(), 3);
        let kept: Vec<u8> = snapshot_history_sync(&conn, "a", 10)
            .unwrap()
            .into_iter()
            .map(|s| s.health_score)
            .collect();
        assert_eq!(kept, vec![4, 3]);
        assert_eq!(snapshot_history_sync(&conn, "b", 10).unwrap().len(), 1);
    }
}
