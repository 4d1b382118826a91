// db/annotations.rs
// Override and metadata rows (one per project, partially upserted)

use super::types::{ColumnValue, MetadataRow, OverrideRow};
use rusqlite::{Connection, OptionalExtension, Row, ToSql};
use std::collections::HashMap;

pub const OVERRIDE_COLUMNS: &[&str] = &[
    "status_override",
    "purpose_override",
    "notes_override",
    "tags_override",
];

pub const METADATA_COLUMNS: &[&str] = &[
    "goal",
    "audience",
    "success_metrics",
    "next_action",
    "publish_target",
    "evidence_json",
    "outcomes_json",
];

const OVERRIDE_SELECT: &str = "SELECT project_id, status_override, purpose_override, notes_override,
            tags_override, updated_at
     FROM project_overrides";

const METADATA_SELECT: &str = "SELECT project_id, goal, audience, success_metrics, next_action,
            publish_target, evidence_json, outcomes_json, updated_at
     FROM project_metadata";

fn parse_override_row(row: &Row) -> rusqlite::Result<OverrideRow> {
    Ok(OverrideRow {
        project_id: row.get(0)?,
        status_override: row.get(1)?,
        purpose_override: row.get(2)?,
        notes_override: row.get(3)?,
        tags_override: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn parse_metadata_row(row: &Row) -> rusqlite::Result<MetadataRow> {
    Ok(MetadataRow {
        project_id: row.get(0)?,
        goal: row.get(1)?,
        audience: row.get(2)?,
        success_metrics: row.get(3)?,
        next_action: row.get(4)?,
        publish_target: row.get(5)?,
        evidence_json: row.get(6)?,
        outcomes_json: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

pub fn get_override_sync(conn: &Connection, project_id: &str) -> rusqlite::Result<Option<OverrideRow>> {
    conn.query_row(
        &format!("{OVERRIDE_SELECT} WHERE project_id = ?"),
        [project_id],
        parse_override_row,
    )
    .optional()
}

pub fn get_metadata_sync(conn: &Connection, project_id: &str) -> rusqlite::Result<Option<MetadataRow>> {
    conn.query_row(
        &format!("{METADATA_SELECT} WHERE project_id = ?"),
        [project_id],
        parse_metadata_row,
    )
    .optional()
}

/// All override rows keyed by project id
pub fn list_overrides_sync(conn: &Connection) -> rusqlite::Result<HashMap<String, OverrideRow>> {
    let mut stmt = conn.prepare(OVERRIDE_SELECT)?;
    let rows = stmt.query_map([], parse_override_row)?;
    rows.map(|r| r.map(|o| (o.project_id.clone(), o))).collect()
}

/// All metadata rows keyed by project id
pub fn list_metadata_sync(conn: &Connection) -> rusqlite::Result<HashMap<String, MetadataRow>> {
    let mut stmt = conn.prepare(METADATA_SELECT)?;
    let rows = stmt.query_map([], parse_metadata_row)?;
    rows.map(|r| r.map(|m| (m.project_id.clone(), m))).collect()
}

pub fn upsert_override_sync(
    conn: &Connection,
    project_id: &str,
    columns: &[ColumnValue],
    now: &str,
) -> rusqlite::Result<()> {
    upsert_columns_sync(conn, "project_overrides", OVERRIDE_COLUMNS, project_id, columns, now)
}

pub fn upsert_metadata_sync(
    conn: &Connection,
    project_id: &str,
    columns: &[ColumnValue],
    now: &str,
) -> rusqlite::Result<()> {
    upsert_columns_sync(conn, "project_metadata", METADATA_COLUMNS, project_id, columns, now)
}

/// Insert-or-update only the named columns; others keep their stored value.
///
/// Column names are checked against `allowed` before any SQL is built.
fn upsert_columns_sync(
    conn: &Connection,
    table: &str,
    allowed: &[&str],
    project_id: &str,
    columns: &[ColumnValue],
    now: &str,
) -> rusqlite::Result<()> {
    if let Some((bad, _)) = columns.iter().find(|(c, _)| !allowed.contains(c)) {
        return Err(rusqlite::Error::InvalidColumnName((*bad).to_string()));
    }

    let mut names = vec!["project_id"];
    names.extend(columns.iter().map(|(c, _)| *c));
    names.push("updated_at");

    let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{i}")).collect();
    let updates: Vec<String> = names[1..]
        .iter()
        .map(|c| format!("{c} = excluded.{c}"))
        .collect();

    let sql = format!(
        "INSERT INTO {table} ({}) VALUES ({})
         ON CONFLICT(project_id) DO UPDATE SET {}",
        names.join(", "),
        placeholders.join(", "),
        updates.join(", ")
    );

    let mut values: Vec<&dyn ToSql> = vec![&project_id];
    values.extend(columns.iter().map(|(_, v)| v as &dyn ToSql));
    values.push(&now);

    conn.execute(&sql, values.as_slice())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::project::upsert_project_sync;
    use crate::db::test_support::setup_conn;

    const T0: &str = "2026-01-01T00:00:00Z";
    const T1: &str = "2026-01-02T00:00:00Z";

    fn conn_with_project() -> Connection {
        let conn = setup_conn();
        upsert_project_sync(&conn, "p", "/dev/p", "p", T0).unwrap();
        conn
    }

    #[test]
    fn test_partial_upsert_leaves_other_columns() {
        let conn = conn_with_project();
        upsert_metadata_sync(
            &conn,
            "p",
            &[("goal", Some("ship it".into())), ("audience", Some("me".into()))],
            T0,
        )
        .unwrap();
        upsert_metadata_sync(&conn, "p", &[("audience", Some("team".into()))], T1).unwrap();

        let row = get_metadata_sync(&conn, "p").unwrap().unwrap();
        assert_eq!(row.goal.as_deref(), Some("ship it"));
        assert_eq!(row.audience.as_deref(), Some("team"));
        assert_eq!(row.updated_at, T1);
    }

    #[test]
    fn test_null_clears_column() {
        let conn = conn_with_project();
        upsert_override_sync(&conn, "p", &[("notes_override", Some("x".into()))], T0).unwrap();
        upsert_override_sync(&conn, "p", &[("notes_override", None)], T1).unwrap();
        let row = get_override_sync(&conn, "p").unwrap().unwrap();
        assert!(row.notes_override.is_none());
    }

    #[test]
    fn test_rejects_unlisted_column() {
        let conn = conn_with_project();
        let err = upsert_override_sync(&conn, "p", &[("goal", Some("x".into()))], T0).unwrap_err();
        assert!(matches!(err, rusqlite::Error::InvalidColumnName(_)));
        assert!(get_override_sync(&conn, "p").unwrap().is_none());
    }

    #[test]
    fn test_absent_rows_are_none() {
        let conn = conn_with_project();
        assert!(get_override_sync(&conn, "p").unwrap().is_none());
        assert!(get_metadata_sync(&conn, "p").unwrap().is_none());
    }

    #[test]
    fn test_unknown_project_violates_foreign_key() {
        let conn = setup_conn();
        assert!(upsert_metadata_sync(&conn, "ghost", &[("goal", None)], T0).is_err());
    }

    #[test]
    fn test_list_rows_keyed_by_project() {
        let conn = conn_with_project();
        upsert_project_sync(&conn, "q", "/dev/q", "q", T0).unwrap();
        upsert_override_sync(&conn, "q", &[("purpose_override", Some("demo".into()))], T0).unwrap();
        upsert_metadata_sync(&conn, "p", &[("goal", Some("g".into()))], T0).unwrap();

        let overrides = list_overrides_sync(&conn).unwrap();
        assert_eq!(overrides.len(), 1);
        assert_eq!(overrides["q"].purpose_override.as_deref(), Some("demo"));
        let metadata = list_metadata_sync(&conn).unwrap();
        assert_eq!(metadata.keys().collect::<Vec<_>>(), vec!["p"]);
    }
}
