// crates/devdash-server/src/merge.rs
// Merge engine: Project + latest snapshot + Override + Metadata -> ProjectView
//
// Precedence per field: Override > Metadata > ScanSnapshot > default.
// `health_score` always comes from the snapshot.

use crate::db::{
    DatabasePool, MetadataRow, OverrideRow, ProjectRow, SnapshotRow, get_metadata_sync,
    get_override_sync, get_project_sync, latest_snapshot_sync, latest_snapshots_sync,
    list_metadata_sync, list_overrides_sync, list_projects_sync, parse_tags_json,
};
use crate::error::Result;
use devdash_types::{ProjectStatus, ProjectView};
use std::cmp::Ordering;
use tracing::debug;

/// Parse an opaque JSON blob column; corrupt values degrade to absent
fn parse_blob(project_id: &str, column: &str, raw: Option<&str>) -> Option<serde_json::Value> {
    let raw = raw?;
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(project = %project_id, column, error = %e, "Corrupt stored JSON, treating as absent");
            None
        }
    }
}

/// Fold one project's rows into its view
pub fn build_view(
    project: &ProjectRow,
    snapshot: Option<&SnapshotRow>,
    overrides: Option<&OverrideRow>,
    metadata: Option<&MetadataRow>,
) -> ProjectView {
    let status = overrides
        .and_then(OverrideRow::status)
        .or_else(|| project.missing_since.as_ref().map(|_| ProjectStatus::Missing))
        .or_else(|| snapshot.map(|s| s.status))
        .unwrap_or_default();

    let tags = overrides
        .and_then(|o| o.tags_override.as_deref())
        .map(parse_tags_json)
        .unwrap_or_default();

    ProjectView {
        id: project.id.clone(),
        name: project.name.clone(),
        path: project.path.clone(),
        pinned: project.pinned,
        last_touched_at: project.last_touched_at.clone(),

        status,
        health_score: snapshot.map_or(0, |s| s.health_score),
        hygiene_score: snapshot.map_or(0, |s| s.hygiene_score),
        momentum_score: snapshot.map_or(0, |s| s.momentum_score),
        purpose: overrides.and_then(|o| o.purpose_override.clone()),
        tags,
        notes: overrides.and_then(|o| o.notes_override.clone()),

        detected_tags: snapshot.map(|s| s.tags.clone()).unwrap_or_default(),
        description: snapshot.and_then(|s| s.description.clone()),
        last_scanned_at: snapshot.map(|s| s.collected_at.clone()),

        goal: metadata.and_then(|m| m.goal.clone()),
        audience: metadata.and_then(|m| m.audience.clone()),
        success_metrics: metadata.and_then(|m| m.success_metrics.clone()),
        next_action: metadata.and_then(|m| m.next_action.clone()),
        publish_target: metadata.and_then(|m| m.publish_target.clone()),
        evidence: metadata
            .and_then(|m| parse_blob(&project.id, "evidence_json", m.evidence_json.as_deref())),
        outcomes: metadata
            .and_then(|m| parse_blob(&project.id, "outcomes_json", m.outcomes_json.as_deref())),
    }
}

/// Dashboard order: pinned first, health descending, then name and id
pub fn view_order(a: &ProjectView, b: &ProjectView) -> Ordering {
    b.pinned
        .cmp(&a.pinned)
        .then_with(|| b.health_score.cmp(&a.health_score))
        .then_with(|| a.name.cmp(&b.name))
        .then_with(|| a.id.cmp(&b.id))
}

/// Merged view of one project; `None` when the project is unknown
pub async fn merge_project_view(pool: &DatabasePool, id: &str) -> Result<Option<ProjectView>> {
    let id = id.to_string();
    pool.run(move |conn| -> rusqlite::Result<Option<ProjectView>> {
        // One read transaction: never a torn snapshot/override pair
        let tx = conn.unchecked_transaction()?;
        let Some(project) = get_project_sync(&tx, &id)? else {
            return Ok(None);
        };
        let snapshot = latest_snapshot_sync(&tx, &id)?;
        let overrides = get_override_sync(&tx, &id)?;
        let metadata = get_metadata_sync(&tx, &id)?;
        tx.commit()?;

        Ok(Some(build_view(
            &project,
            snapshot.as_ref(),
            overrides.as_ref(),
            metadata.as_ref(),
        )))
    })
    .await
}

/// Merged views of every known project in dashboard order
pub async fn merge_all_projects(pool: &DatabasePool) -> Result<Vec<ProjectView>> {
    pool.run(|conn| -> rusqlite::Result<Vec<ProjectView>> {
        let tx = conn.unchecked_transaction()?;
        let projects = list_projects_sync(&tx)?;
        let snapshots = latest_snapshots_sync(&tx)?;
        let overrides = list_overrides_sync(&tx)?;
        let metadata = list_metadata_sync(&tx)?;
        tx.commit()?;

        let mut views: Vec<ProjectView> = projects
            .iter()
            .map(|p| {
                build_view(
                    p,
                    snapshots.get(&p.id),
                    overrides.get(&p.id),
                    metadata.get(&p.id),
                )
            })
            .collect();
        views.sort_by(view_order);
        Ok(views)
    })
    .await
}
