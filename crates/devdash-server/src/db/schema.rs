// crates/devdash-server/src/db/schema.rs
// Database schema and migrations

use super::migration_helpers::add_column_if_missing;
use anyhow::Result;
use rusqlite::Connection;

/// Run all schema setup and migrations.
///
/// Idempotent: tables are created if absent, columns added if missing.
pub fn run_all_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;

    // Columns added after the first schema shipped
    migrate_projects_missing_since(conn)?;
    migrate_snapshots_description(conn)?;

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_projects_missing ON projects(missing_since)
             WHERE missing_since IS NOT NULL;",
    )?;
    Ok(())
}

/// Track when a project root stopped being discovered
fn migrate_projects_missing_since(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "projects", "missing_since", "TEXT")
}

/// Declared description captured with each snapshot
fn migrate_snapshots_description(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "scan_snapshots", "description", "TEXT")
}

/// Database schema SQL
pub const SCHEMA: &str = r#"
-- =======================================
-- CORE: Projects
-- =======================================
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,              -- sha256(abs path), 16 hex chars
    path TEXT UNIQUE NOT NULL,
    name TEXT NOT NULL,
    pinned INTEGER NOT NULL DEFAULT 0,
    last_touched_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- =======================================
-- SCANS: append-only snapshot history
-- =======================================
CREATE TABLE IF NOT EXISTS scan_snapshots (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    run_id TEXT NOT NULL,
    collected_at TEXT NOT NULL,
    signals_json TEXT NOT NULL,
    health_score INTEGER NOT NULL,
    hygiene_score INTEGER NOT NULL,
    momentum_score INTEGER NOT NULL,
    status TEXT NOT NULL,
    tags_json TEXT NOT NULL DEFAULT '[]',
    breakdown_json TEXT NOT NULL DEFAULT '{}',
    timed_out INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_snapshots_project_seq ON scan_snapshots(project_id, seq DESC);

CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT UNIQUE NOT NULL,
    scanned_at TEXT NOT NULL,
    project_count INTEGER NOT NULL,
    failed_count INTEGER NOT NULL DEFAULT 0,
    duration_ms INTEGER NOT NULL DEFAULT 0
);

-- =======================================
-- USER ANNOTATIONS
-- =======================================
CREATE TABLE IF NOT EXISTS project_metadata (
    project_id TEXT PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    goal TEXT,
    audience TEXT,
    success_metrics TEXT,
    next_action TEXT,
    publish_target TEXT,
    evidence_json TEXT,
    outcomes_json TEXT,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS project_overrides (
    project_id TEXT PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
    status_override TEXT,
    purpose_override TEXT,
    notes_override TEXT,
    tags_override TEXT,               -- JSON array of strings
    updated_at TEXT NOT NULL
);

-- =======================================
-- AUDIT TRAIL
-- =======================================
CREATE TABLE IF NOT EXISTS activity (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    payload_json TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_activity_project_time ON activity(project_id, created_at DESC, id DESC);
CREATE INDEX IF NOT EXISTS idx_activity_time ON activity(created_at);
"#;
