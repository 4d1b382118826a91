// crates/devdash-server/src/cli/projects.rs
// Read and annotate commands

use super::print_json;
use anyhow::{Context, Result, bail};
use devdash::DashboardService;
use devdash::config::{ConfigValidation, DevdashConfig};
use serde_json::{Value, json};

fn parse_patch(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).context("patch argument is not valid JSON")
}

pub async fn run_list(service: &DashboardService) -> Result<()> {
    print_json(&service.merge_all_projects().await?)
}

pub async fn run_show(service: &DashboardService, id: &str) -> Result<()> {
    match service.merge_project_view(id).await? {
        Some(view) => print_json(&view),
        None => bail!("project {id} not found"),
    }
}

pub async fn run_activity(service: &DashboardService, id: &str) -> Result<()> {
    print_json(&service.recent_activity(id).await?)
}

pub async fn run_pin(service: &DashboardService, id: &str) -> Result<()> {
    let pinned = service.toggle_pin(id).await?;
    print_json(&json!({ "id": id, "pinned": pinned }))
}

pub async fn run_touch(service: &DashboardService, id: &str, tool: Option<&str>) -> Result<()> {
    service.touch_project(id, tool).await?;
    print_json(&json!({ "id": id, "ok": true }))
}

pub async fn run_override(service: &DashboardService, id: &str, raw: &str) -> Result<()> {
    let patch = parse_patch(raw)?;
    print_json(&service.update_override(id, &patch).await?)
}

pub async fn run_metadata(service: &DashboardService, id: &str, raw: &str) -> Result<()> {
    let patch = parse_patch(raw)?;
    print_json(&service.update_metadata(id, &patch).await?)
}

pub async fn run_status(
    service: &DashboardService,
    config: &DevdashConfig,
    validation: &ConfigValidation,
) -> Result<()> {
    let last = service.last_refreshed().await?.map(|scan| {
        json!({
            "scanId": scan.id,
            "runId": scan.run_id,
            "scannedAt": scan.scanned_at,
            "projectCount": scan.project_count,
            "failedCount": scan.failed_count,
            "durationMs": scan.duration_ms,
        })
    });
    let pool = service.pool().status();

    print_json(&json!({
        "lastRefreshed": last,
        "root": config.scan.root.display().to_string(),
        "database": config.db_path().display().to_string(),
        "workers": config.pipeline.workers,
        "missingPolicy": config.pipeline.missing_policy,
        "pool": { "size": pool.size, "available": pool.available, "waiting": pool.waiting },
        "config": {
            "valid": validation.is_valid(),
            "errors": validation.errors,
            "warnings": validation.warnings,
        },
    }))
}
