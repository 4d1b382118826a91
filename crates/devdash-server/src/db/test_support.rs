// db/test_support.rs
// Shared test helpers for database tests

use super::pool::DatabasePool;
use super::types::NewSnapshot;
use devdash_types::ProjectStatus;
use rusqlite::Connection;
use std::sync::Arc;

/// Bare migrated connection for synchronous row-level tests
pub fn setup_conn() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to open in-memory connection");
    conn.execute_batch("PRAGMA foreign_keys=ON;")
        .expect("Failed to enable foreign keys");
    super::schema::run_all_migrations(&conn).expect("Failed to migrate");
    conn
}

/// Create a test pool (in-memory DB)
pub async fn setup_test_pool() -> Arc<DatabasePool> {
    Arc::new(
        DatabasePool::open_in_memory()
            .await
            .expect("Failed to open in-memory pool"),
    )
}

/// Minimal snapshot with the given health score
pub fn new_snapshot(project_id: &str, health: u8) -> NewSnapshot {
    NewSnapshot {
        project_id: project_id.to_string(),
        run_id: "test-run".to_string(),
        collected_at: "2026-01-01T00:00:00Z".to_string(),
        signals_json: "{}".to_string(),
        health_score: health,
        hygiene_score: health,
        momentum_score: health,
        status: ProjectStatus::Active,
        tags: Vec::new(),
        breakdown_json: "{}".to_string(),
        description: None,
        timed_out: false,
    }
}
