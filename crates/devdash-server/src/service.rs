// crates/devdash-server/src/service.rs
// Dashboard facade: the calls an outer layer (HTTP, CLI) makes into the core

use crate::activity::ActivityLogger;
use crate::annotations::{MetadataPatch, OverridePatch};
use crate::config::DevdashConfig;
use crate::db::{
    ColumnValue, DatabasePool, ScanRow, latest_scan_sync, project_exists_sync,
    toggle_pinned_sync, touch_project_sync, upsert_metadata_sync, upsert_override_sync,
};
use crate::error::{DevdashError, Result};
use crate::merge;
use crate::pipeline::RefreshPipeline;
use crate::utils::now_rfc3339;
use devdash_types::{ActivityKind, ActivityRecord, ProjectView, RefreshSummary};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

/// Shared handle over the store, the refresh pipeline and the audit log.
///
/// Clones share the pool and the refresh exclusion.
#[derive(Clone)]
pub struct DashboardService {
    pool: Arc<DatabasePool>,
    pipeline: RefreshPipeline,
    activity: ActivityLogger,
}

fn not_found(id: &str) -> DevdashError {
    DevdashError::NotFound(format!("project {id}"))
}

impl DashboardService {
    pub fn new(pool: Arc<DatabasePool>, config: &DevdashConfig) -> Self {
        Self::with_pipeline(Arc::clone(&pool), RefreshPipeline::new(pool, config))
    }

    /// Use a preconfigured pipeline (custom extractor or shared guard)
    pub fn with_pipeline(pool: Arc<DatabasePool>, pipeline: RefreshPipeline) -> Self {
        Self {
            activity: ActivityLogger::new(Arc::clone(&pool)),
            pool,
            pipeline,
        }
    }

    /// Open the configured database file and build a service over it
    pub async fn open(config: &DevdashConfig) -> Result<Self> {
        let pool = Arc::new(DatabasePool::open(&config.db_path()).await?);
        Ok(Self::new(pool, config))
    }

    pub fn pool(&self) -> &Arc<DatabasePool> {
        &self.pool
    }

    pub async fn merge_project_view(&self, id: &str) -> Result<Option<ProjectView>> {
        merge::merge_project_view(&self.pool, id).await
    }

    pub async fn merge_all_projects(&self) -> Result<Vec<ProjectView>> {
        merge::merge_all_projects(&self.pool).await
    }

    /// Run a refresh, or join the one in flight
    pub async fn run_refresh_pipeline(&self) -> Result<RefreshSummary> {
        Ok(self.pipeline.run().await?)
    }

    pub async fn update_override(&self, id: &str, body: &serde_json::Value) -> Result<ProjectView> {
        let patch = OverridePatch::from_json(body)?;
        self.write_annotation(id, patch.columns().to_vec(), upsert_override_sync)
            .await?;
        info!(project = %id, "Override updated");
        self.activity
            .record(id, ActivityKind::Override, Some(patch.payload().clone()))
            .await;
        self.view_or_not_found(id).await
    }

    pub async fn update_metadata(&self, id: &str, body: &serde_json::Value) -> Result<ProjectView> {
        let patch = MetadataPatch::from_json(body)?;
        self.write_annotation(id, patch.columns().to_vec(), upsert_metadata_sync)
            .await?;
        info!(project = %id, "Metadata updated");
        self.activity
            .record(id, ActivityKind::Metadata, Some(patch.payload().clone()))
            .await;
        self.view_or_not_found(id).await
    }

    /// Flip the pinned flag; returns the new value
    pub async fn toggle_pin(&self, id: &str) -> Result<bool> {
        let key = id.to_string();
        let now = now_rfc3339();
        let pinned = self
            .pool
            .run(move |conn| toggle_pinned_sync(conn, &key, &now))
            .await?
            .ok_or_else(|| not_found(id))?;
        self.activity
            .record(id, ActivityKind::Pin, Some(json!({ "pinned": pinned })))
            .await;
        Ok(pinned)
    }

    /// Record an explicit open of the project in `tool`
    pub async fn touch_project(&self, id: &str, tool: Option<&str>) -> Result<()> {
        let key = id.to_string();
        let now = now_rfc3339();
        let touched = self
            .pool
            .run(move |conn| touch_project_sync(conn, &key, &now))
            .await?;
        if !touched {
            return Err(not_found(id));
        }
        let tool = tool.unwrap_or("unknown");
        self.activity
            .record(id, ActivityKind::Opened, Some(json!({ "tool": tool })))
            .await;
        Ok(())
    }

    pub async fn recent_activity(&self, id: &str) -> Result<Vec<ActivityRecord>> {
        let key = id.to_string();
        let exists = self
            .pool
            .run(move |conn| project_exists_sync(conn, &key))
            .await?;
        if !exists {
            return Err(not_found(id));
        }
        self.activity.recent(id).await
    }

    /// Most recent completed refresh, if any
    pub async fn last_refreshed(&self) -> Result<Option<ScanRow>> {
        self.pool.run(latest_scan_sync).await
    }

    /// Existence check and partial upsert in one transaction
    async fn write_annotation(
        &self,
        id: &str,
        columns: Vec<ColumnValue>,
        upsert: fn(&rusqlite::Connection, &str, &[ColumnValue], &str) -> rusqlite::Result<()>,
    ) -> Result<()> {
        let key = id.to_string();
        let now = now_rfc3339();
        let written = self
            .pool
            .run(move |conn| -> rusqlite::Result<bool> {
                let tx = conn.unchecked_transaction()?;
                if !project_exists_sync(&tx, &key)? {
                    return Ok(false);
                }
                upsert(&tx, &key, &columns, &now)?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        if written { Ok(()) } else { Err(not_found(id)) }
    }

    async fn view_or_not_found(&self, id: &str) -> Result<ProjectView> {
        self.merge_project_view(id)
            .await?
            .ok_or_else(|| not_found(id))
    }
}
