//! Test utilities for devdash integration tests

use devdash::config::{DevdashConfig, ScanConfig};
use devdash::db::DatabasePool;
use devdash::error::ExtractError;
use devdash::pipeline::RefreshPipeline;
use devdash::scanner::{ProjectDescriptor, project_id};
use devdash::signals::{Signal, SignalExtractor, SignalSink};
use devdash::DashboardService;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Scripted extractor: `bad*` projects are unreadable, `slow*` projects
/// stall past any budget after their first signal.
pub struct ScriptedExtractor;

impl SignalExtractor for ScriptedExtractor {
    fn extract(&self, p: &ProjectDescriptor, sink: &SignalSink) -> Result<(), ExtractError> {
        if p.raw_name.starts_with("bad") {
            return Err(ExtractError::Unreadable {
                path: p.path.clone(),
                message: "permission denied".to_string(),
            });
        }
        sink.record(|s| s.readme = Signal::Present(true));
        if p.raw_name.starts_with("slow") {
            while !sink.is_closed() {
                std::thread::sleep(Duration::from_millis(20));
            }
        }
        sink.record(|s| {
            s.tests = Signal::Present(true);
            s.ci = Signal::Present(false);
        });
        Ok(())
    }
}

/// Dev root populated with marked project directories
pub struct TestDashboard {
    pub root: TempDir,
    pub pool: Arc<DatabasePool>,
    pub service: DashboardService,
}

impl TestDashboard {
    pub async fn new(projects: &[&str]) -> Self {
        Self::with_config(projects, |_| {}).await
    }

    pub async fn with_config(projects: &[&str], tweak: impl FnOnce(&mut DevdashConfig)) -> Self {
        let root = TempDir::new().expect("Failed to create temp dir");
        for name in projects {
            fs::create_dir_all(root.path().join(name).join(".git")).expect("Failed to create project");
        }

        let mut config = DevdashConfig::default();
        config.scan = ScanConfig::with_root(root.path());
        tweak(&mut config);

        let pool = Arc::new(
            DatabasePool::open_in_memory()
                .await
                .expect("Failed to create in-memory pool"),
        );
        let pipeline = RefreshPipeline::new(Arc::clone(&pool), &config)
            .with_extractor(Arc::new(ScriptedExtractor));
        let service = DashboardService::with_pipeline(Arc::clone(&pool), pipeline);

        Self { root, pool, service }
    }

    /// Id the scanner assigns to a project directory under the root
    pub fn id(&self, name: &str) -> String {
        let canonical = self
            .root
            .path()
            .canonicalize()
            .expect("Failed to canonicalize root");
        project_id(&canonical.join(name))
    }
}
