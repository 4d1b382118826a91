// crates/devdash-server/src/db/mod.rs
// Persistence gateway: rusqlite behind a deadpool-sqlite pool
//
// Sync `*_sync` functions take a `&Connection` and run inside `pool.run()` /
// `pool.interact()` closures.

mod activity;
mod annotations;
pub mod migration_helpers;
mod pool;
mod project;
pub mod retention;
mod scan;
mod schema;
mod snapshot;
mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use activity::{insert_activity_sync, recent_activity_sync};
pub use annotations::{
    METADATA_COLUMNS, OVERRIDE_COLUMNS, get_metadata_sync, get_override_sync,
    list_metadata_sync, list_overrides_sync, upsert_metadata_sync, upsert_override_sync,
};
pub use pool::{DatabasePool, PoolStatus};
pub use project::{
    clear_missing_sync, get_project_sync, list_projects_sync, mark_missing_sync,
    project_exists_sync, toggle_pinned_sync, touch_project_sync, upsert_project_sync,
};
pub use retention::{RetentionStats, run_retention_sync};
pub use scan::{count_scans_sync, insert_scan_sync, latest_scan_sync};
pub use schema::run_all_migrations;
pub use snapshot::{
    insert_snapshot_sync, latest_snapshot_sync, latest_snapshots_sync,
    persist_project_snapshot_sync, snapshot_history_sync,
};
pub use types::*;
