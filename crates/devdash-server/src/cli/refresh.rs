// crates/devdash-server/src/cli/refresh.rs
// `devdash refresh`

use super::print_json;
use anyhow::Result;
use devdash::DashboardService;
use tracing::info;

pub async fn run_refresh(service: &DashboardService) -> Result<()> {
    let summary = service.run_refresh_pipeline().await?;
    info!(
        scan_id = summary.scan_id,
        projects = summary.project_count,
        failed = summary.failed_count,
        "Refresh finished in {}ms",
        summary.duration_ms
    );
    print_json(&summary)
}
