// crates/devdash-server/src/activity.rs
// Best-effort audit trail on top of the activity table

use crate::db::{DatabasePool, insert_activity_sync, recent_activity_sync};
use crate::error::Result;
use crate::utils::now_rfc3339;
use devdash_types::{ActivityKind, ActivityRecord};
use std::sync::Arc;
use tracing::debug;

/// Records returned by `recent`
pub const RECENT_LIMIT: usize = 20;

#[derive(Clone)]
pub struct ActivityLogger {
    pool: Arc<DatabasePool>,
}

impl ActivityLogger {
    pub fn new(pool: Arc<DatabasePool>) -> Self {
        Self { pool }
    }

    /// Append one record. Failures are logged and swallowed; the caller's
    /// mutation has already been committed.
    pub async fn record(
        &self,
        project_id: &str,
        kind: ActivityKind,
        payload: Option<serde_json::Value>,
    ) -> Option<i64> {
        let id = project_id.to_string();
        let now = now_rfc3339();
        let inserted = self
            .pool
            .try_interact_warn("activity", move |conn| {
                Ok(insert_activity_sync(conn, &id, kind, payload.as_ref(), &now)?)
            })
            .await;
        if let Some(row_id) = inserted {
            debug!(project = %project_id, kind = %kind, row_id, "Activity recorded");
        }
        inserted
    }

    /// Newest records for a project, newest first
    pub async fn recent(&self, project_id: &str) -> Result<Vec<ActivityRecord>> {
        let id = project_id.to_string();
        self.pool
            .run(move |conn| recent_activity_sync(conn, &id, RECENT_LIMIT))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_test_pool;
    use crate::db::upsert_project_sync;

    #[tokio::test]
    async fn test_recent_is_capped_and_newest_first() {
        let pool = setup_test_pool().await;
        pool.interact(|conn| Ok(upsert_project_sync(conn, "p", "/dev/p", "p", "2026-01-01T00:00:00Z")?))
            .await
            .unwrap();
        let logger = ActivityLogger::new(pool);

        for i in 0..25 {
            logger
                .record("p", ActivityKind::Pin, Some(serde_json::json!({"n": i})))
                .await
                .unwrap();
        }

        let recent = logger.recent("p").await.unwrap();
        assert_eq!(recent.len(), RECENT_LIMIT);
        assert_eq!(recent[0].payload.as_ref().unwrap()["n"], 24);
        assert_eq!(recent[19].payload.as_ref().unwrap()["n"], 5);
    }

    #[tokio::test]
    async fn test_record_failure_is_swallowed() {
        let pool = setup_test_pool().await;
        let logger = ActivityLogger::new(pool);
        // No such project: the foreign key rejects the insert
        assert!(logger.record("ghost", ActivityKind::Opened, None).await.is_none());
        assert!(logger.recent("ghost").await.unwrap().is_empty());
    }
}
