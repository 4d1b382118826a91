// crates/devdash-server/src/pipeline/mod.rs
// Refresh pipeline: discover -> extract -> score -> persist -> Scan row
//
// Per-project failures are absorbed here. Persistence failures end the run
// as `RefreshError::Persistence`; snapshots already written stay visible.

mod guard;

pub use guard::{RefreshGuard, RefreshState};

use crate::config::{DevdashConfig, MissingPolicy, PipelineConfig, ScanConfig};
use crate::db::{
    DatabasePool, NewSnapshot, clear_missing_sync, insert_activity_sync, insert_scan_sync,
    list_projects_sync, mark_missing_sync, persist_project_snapshot_sync, run_retention_sync,
};
use crate::error::{ExtractError, RefreshError};
use crate::health::{Assessment, ScoringPolicy, score};
use crate::scanner::{Discovery, ProjectDescriptor, ProjectScanner};
use crate::signals::{FsSignalExtractor, SignalExtractor, SignalSet, extract_with_budget};
use crate::utils::{now_rfc3339, path_to_string};
use chrono::{SecondsFormat, Utc};
use devdash_types::{ActivityKind, ProjectStatus, RefreshSummary};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// One project that made it into the store during a run
struct Persisted {
    id: String,
    health_score: u8,
    status: ProjectStatus,
    timed_out: bool,
}

type Extracted = (ProjectDescriptor, Result<(SignalSet, Assessment), ExtractError>);

/// Orchestrates refresh runs. Cheap to clone; clones share the guard.
#[derive(Clone)]
pub struct RefreshPipeline {
    pool: Arc<DatabasePool>,
    scan: ScanConfig,
    scoring: ScoringPolicy,
    settings: PipelineConfig,
    extractor: Arc<dyn SignalExtractor>,
    guard: RefreshGuard,
}

impl RefreshPipeline {
    pub fn new(pool: Arc<DatabasePool>, config: &DevdashConfig) -> Self {
        Self {
            pool,
            scan: config.scan.clone(),
            scoring: config.scoring.clone(),
            settings: config.pipeline.clone(),
            extractor: Arc::new(FsSignalExtractor),
            guard: RefreshGuard::new(),
        }
    }

    /// Replace the signal source (tests, alternative checks)
    pub fn with_extractor(mut self, extractor: Arc<dyn SignalExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Share an exclusion guard with other pipelines
    pub fn with_guard(mut self, guard: RefreshGuard) -> Self {
        self.guard = guard;
        self
    }

    /// Run a refresh, or join the one already in flight
    pub async fn run(&self) -> Result<RefreshSummary, RefreshError> {
        let this = self.clone();
        self.guard.run(move || async move { this.execute().await }).await
    }

    async fn execute(self) -> Result<RefreshSummary, RefreshError> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let scanned_at = now_rfc3339();
        info!(run_id = %run_id, root = %self.scan.root.display(), "Refresh started");

        // 1. Discover
        let scanner = ProjectScanner::new(self.scan.clone());
        let discoveries = tokio::task::spawn_blocking(move || {
            scanner.discover().map(|walk| walk.collect::<Vec<_>>())
        })
        .await
        .map_err(|e| RefreshError::Aborted {
            message: e.to_string(),
        })?
        .map_err(|e| RefreshError::ScanRoot {
            message: e.to_string(),
        })?;

        let mut projects = Vec::new();
        let mut skipped = Vec::new();
        for discovery in discoveries {
            match discovery {
                Discovery::Project(p) => projects.push(p),
                Discovery::Skipped(s) => skipped.push(s.path),
            }
        }
        let discovered_ids: HashSet<String> = projects.iter().map(|p| p.id.clone()).collect();
        let discovered_count = projects.len();
        info!(discovered = discovered_count, skipped = skipped.len(), "Discovery finished");

        // 2. Extract + score on a bounded pool
        let mut workers = self.spawn_extraction(projects);

        // 3. Persist as results arrive, one writer
        let mut persisted: Vec<Persisted> = Vec::new();
        let mut failed_count = 0usize;
        while let Some(joined) = workers.join_next().await {
            let (descriptor, outcome) = match joined {
                Ok(extracted) => extracted,
                Err(e) => {
                    warn!(error = %e, "Extraction task failed");
                    failed_count += 1;
                    continue;
                }
            };
            let (signals, assessment) = match outcome {
                Ok(scored) => scored,
                Err(e) => {
                    warn!(project = %descriptor.id, path = %descriptor.path.display(), error = %e, "Project skipped");
                    failed_count += 1;
                    continue;
                }
            };

            let snapshot = match build_snapshot(&descriptor, &run_id, &signals, &assessment) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(project = %descriptor.id, error = %e, "Failed to encode signals");
                    failed_count += 1;
                    continue;
                }
            };

            let path = path_to_string(&descriptor.path);
            let name = descriptor.raw_name.clone();
            let write = snapshot.clone();
            let result = self
                .pool
                .run_with_retry(move |conn| persist_project_snapshot_sync(conn, &path, &name, &write))
                .await;
            if let Err(e) = result {
                workers.abort_all();
                warn!(project = %descriptor.id, error = %e, partial = persisted.len(), "Persistence failed, aborting refresh");
                return Err(RefreshError::Persistence {
                    message: e.to_string(),
                    partial_count: persisted.len(),
                });
            }

            debug!(
                project = %descriptor.id,
                health = assessment.health_score,
                status = %assessment.status,
                timed_out = signals.timed_out,
                "Project scanned"
            );
            persisted.push(Persisted {
                id: descriptor.id,
                health_score: assessment.health_score,
                status: assessment.status,
                timed_out: snapshot.timed_out,
            });
        }

        // 4. Missing-project policy
        if self.settings.missing_policy == MissingPolicy::MarkMissing {
            self.reconcile_missing(discovered_ids, skipped.clone(), persisted.len())
                .await?;
        }

        // 5. Completion row
        let project_count = persisted.len();
        let duration_ms = started.elapsed().as_millis() as u64;
        let scan_id = {
            let (run_id, scanned_at) = (run_id.clone(), scanned_at.clone());
            self.pool
                .run_with_retry(move |conn| {
                    insert_scan_sync(conn, &run_id, &scanned_at, project_count, failed_count, duration_ms)
                })
                .await
                .map_err(|e| RefreshError::Persistence {
                    message: e.to_string(),
                    partial_count: project_count,
                })?
        };

        // 6. Audit trail and retention, both best-effort
        self.record_refresh_activity(&run_id, scan_id, &scanned_at, persisted)
            .await;
        self.apply_retention().await;

        let summary = RefreshSummary {
            scan_id,
            run_id,
            scanned_at,
            project_count,
            failed_count,
            discovered_count,
            skipped_count: skipped.len(),
            duration_ms,
        };
        info!(
            scan_id,
            projects = summary.project_count,
            failed = summary.failed_count,
            skipped = summary.skipped_count,
            duration_ms,
            "Refresh completed"
        );
        Ok(summary)
    }

    fn spawn_extraction(&self, projects: Vec<ProjectDescriptor>) -> JoinSet<Extracted> {
        let permits = Arc::new(Semaphore::new(self.settings.workers.max(1)));
        let budget = self.settings.extract_budget().max(Duration::from_millis(1));
        let mut workers = JoinSet::new();

        for descriptor in projects {
            let permits = Arc::clone(&permits);
            let extractor = Arc::clone(&self.extractor);
            let policy = self.scoring.clone();
            workers.spawn(async move {
                let Ok(permit) = permits.acquire_owned().await else {
                    let reason = ExtractError::Panicked("worker pool closed".to_string());
                    return (descriptor, Err(reason));
                };
                // the blocking worker owns the permit, so a timed-out
                // extraction still occupies its slot until it returns
                let outcome =
                    extract_with_budget(extractor, descriptor.clone(), budget, Some(permit))
                        .await
                        .map(|signals| {
                            let assessment = score(&signals, &policy);
                            (signals, assessment)
                        });
                (descriptor, outcome)
            });
        }
        workers
    }

    /// Flag known projects that were not rediscovered; restore ones that were.
    ///
    /// Projects under a skipped subtree are left alone: their absence is
    /// unproven.
    async fn reconcile_missing(
        &self,
        discovered: HashSet<String>,
        skipped: Vec<PathBuf>,
        partial_count: usize,
    ) -> Result<(), RefreshError> {
        let now = now_rfc3339();
        let (marked, restored) = self
            .pool
            .run_with_retry(move |conn| {
                let known = list_projects_sync(conn)?;
                let mut gone = Vec::new();
                let mut restored = 0;
                for project in known {
                    if discovered.contains(&project.id) {
                        if project.missing_since.is_some() && clear_missing_sync(conn, &project.id)? {
                            restored += 1;
                        }
                        continue;
                    }
                    let under_skipped = skipped.iter().any(|s| Path::new(&project.path).starts_with(s));
                    if !under_skipped {
                        gone.push(project.id);
                    }
                }
                let marked = mark_missing_sync(conn, &gone, &now)?;
                Ok::<_, rusqlite::Error>((marked, restored))
            })
            .await
            .map_err(|e| RefreshError::Persistence {
                message: e.to_string(),
                partial_count,
            })?;

        if marked > 0 || restored > 0 {
            info!(marked, restored, "Missing projects reconciled");
        }
        Ok(())
    }

    async fn record_refresh_activity(
        &self,
        run_id: &str,
        scan_id: i64,
        scanned_at: &str,
        persisted: Vec<Persisted>,
    ) {
        if persisted.is_empty() {
            return;
        }
        let run_id = run_id.to_string();
        let scanned_at = scanned_at.to_string();
        self.pool
            .try_interact_warn("refresh activity", move |conn| {
                let tx = conn.unchecked_transaction()?;
                for p in &persisted {
                    let payload = serde_json::json!({
                        "runId": run_id,
                        "scanId": scan_id,
                        "healthScore": p.health_score,
                        "status": p.status,
                        "timedOut": p.timed_out,
                    });
                    insert_activity_sync(&tx, &p.id, ActivityKind::Refresh, Some(&payload), &scanned_at)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await;
    }

    async fn apply_retention(&self) {
        let days = self.settings.activity_retention_days;
        let keep = self.settings.snapshot_history;
        if let Some(stats) = self
            .pool
            .try_interact("retention", move |conn| {
                Ok(run_retention_sync(conn, days, keep, Utc::now())?)
            })
            .await
        {
            debug!(
                activity_deleted = stats.activity_deleted,
                snapshots_pruned = stats.snapshots_pruned,
                "Retention pass finished"
            );
        }
    }
}

fn build_snapshot(
    descriptor: &ProjectDescriptor,
    run_id: &str,
    signals: &SignalSet,
    assessment: &Assessment,
) -> serde_json::Result<NewSnapshot> {
    Ok(NewSnapshot {
        project_id: descriptor.id.clone(),
        run_id: run_id.to_string(),
        collected_at: signals
            .collected_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
        signals_json: serde_json::to_string(signals)?,
        health_score: assessment.health_score,
        hygiene_score: assessment.hygiene_score,
        momentum_score: assessment.momentum_score,
        status: assessment.status,
        tags: assessment.tags.clone(),
        breakdown_json: serde_json::to_string(&assessment.breakdown)?,
        description: signals.description().map(str::to_string),
        timed_out: signals.timed_out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::setup_test_pool;
    use crate::db::{
        count_scans_sync, get_project_sync, latest_snapshot_sync, recent_activity_sync,
        upsert_project_sync,
    };
    use crate::scanner::project_id;
    use crate::signals::{Signal, SignalSink};
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Fails projects whose directory name starts with "bad"
    struct Scripted;

    impl SignalExtractor for Scripted {
        fn extract(&self, p: &ProjectDescriptor, sink: &SignalSink) -> Result<(), ExtractError> {
            if p.raw_name.starts_with("bad") {
                return Err(ExtractError::Unreadable {
                    path: p.path.clone(),
                    message: "permission denied".to_string(),
                });
            }
            sink.record(|s| {
                s.readme = Signal::Present(true);
                s.tests = Signal::Present(true);
            });
            Ok(())
        }
    }

    /// Overruns every budget without looking at the sink, counting how many
    /// extractions are in progress at once
    #[derive(Default)]
    struct Overrunning {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SignalExtractor for Overrunning {
        fn extract(&self, _: &ProjectDescriptor, _: &SignalSink) -> Result<(), ExtractError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(1500));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn workspace(names: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in names {
            fs::create_dir_all(dir.path().join(name).join(".git")).unwrap();
        }
        dir
    }

    fn pipeline(pool: Arc<DatabasePool>, root: &Path) -> RefreshPipeline {
        let mut config = DevdashConfig::default();
        config.scan = ScanConfig::with_root(root);
        RefreshPipeline::new(pool, &config).with_extractor(Arc::new(Scripted))
    }

    fn canonical_id(dir: &TempDir, name: &str) -> String {
        project_id(&dir.path().canonicalize().unwrap().join(name))
    }

    #[tokio::test]
    async fn test_refresh_persists_and_counts() {
        let dir = workspace(&["one", "two", "bad-three"]);
        let pool = setup_test_pool().await;

        let summary = pipeline(pool.clone(), dir.path()).run().await.unwrap();
        assert_eq!(summary.discovered_count, 3);
        assert_eq!(summary.project_count, 2);
        assert_eq!(summary.failed_count, 1);

        let one = canonical_id(&dir, "one");
        let bad = canonical_id(&dir, "bad-three");
        let (snap, bad_project, scans, activity) = pool
            .interact(move |conn| {
                Ok((
                    latest_snapshot_sync(conn, &one)?,
                    get_project_sync(conn, &bad)?,
                    count_scans_sync(conn)?,
                    recent_activity_sync(conn, &one, 20)?,
                ))
            })
            .await
            .unwrap();

        let snap = snap.unwrap();
        assert_eq!(snap.run_id, summary.run_id);
        assert!(snap.tags.contains(&"tested".to_string()));
        assert!(bad_project.is_none());
        assert_eq!(scans, 1);
        assert_eq!(activity.len(), 1);
        assert_eq!(activity[0].kind, ActivityKind::Refresh);
        assert_eq!(activity[0].payload.as_ref().unwrap()["scanId"], summary.scan_id);
    }

    #[tokio::test]
    async fn test_missing_root_fails_run_without_scan_row() {
        let dir = TempDir::new().unwrap();
        let pool = setup_test_pool().await;

        let err = pipeline(pool.clone(), &dir.path().join("gone"))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, RefreshError::ScanRoot { .. }));
        let scans = pool.interact(|conn| Ok(count_scans_sync(conn)?)).await.unwrap();
        assert_eq!(scans, 0);
    }

    #[tokio::test]
    async fn test_vanished_project_marked_then_restored() {
        let dir = workspace(&["keep", "drop"]);
        let pool = setup_test_pool().await;
        let pipe = pipeline(pool.clone(), dir.path());
        pipe.run().await.unwrap();

        let hidden = dir.path().join("drop-parked");
        fs::rename(dir.path().join("drop"), &hidden).unwrap();
        fs::remove_dir_all(hidden.join(".git")).unwrap();
        pipe.run().await.unwrap();

        let drop_id = canonical_id(&dir, "drop");
        let id = drop_id.clone();
        let row = pool
            .interact(move |conn| Ok(get_project_sync(conn, &id)?))
            .await
            .unwrap()
            .unwrap();
        assert!(row.missing_since.is_some());

        fs::create_dir_all(dir.path().join("drop/.git")).unwrap();
        pipe.run().await.unwrap();
        let row = pool
            .interact(move |conn| Ok(get_project_sync(conn, &drop_id)?))
            .await
            .unwrap()
            .unwrap();
        assert!(row.missing_since.is_none());
    }

    #[tokio::test]
    async fn test_ignore_policy_leaves_vanished_projects() {
        let dir = workspace(&["keep", "drop"]);
        let pool = setup_test_pool().await;
        let mut config = DevdashConfig::default();
        config.scan = ScanConfig::with_root(dir.path());
        config.pipeline.missing_policy = MissingPolicy::Ignore;
        let pipe = RefreshPipeline::new(pool.clone(), &config).with_extractor(Arc::new(Scripted));

        pipe.run().await.unwrap();
        fs::remove_dir_all(dir.path().join("drop")).unwrap();
        pipe.run().await.unwrap();

        let drop_id = canonical_id(&dir, "drop");
        let row = pool
            .interact(move |conn| Ok(get_project_sync(conn, &drop_id)?))
            .await
            .unwrap()
            .unwrap();
        assert!(row.missing_since.is_none());
    }

    #[tokio::test]
    async fn test_timed_out_extraction_keeps_its_worker_slot() {
        let dir = workspace(&["one", "two", "three"]);
        let pool = setup_test_pool().await;
        let mut config = DevdashConfig::default();
        config.scan = ScanConfig::with_root(dir.path());
        config.pipeline.workers = 1;
        config.pipeline.extract_timeout_secs = 1;
        let extractor = Arc::new(Overrunning::default());
        let pipe = RefreshPipeline::new(pool, &config).with_extractor(extractor.clone());

        let summary = pipe.run().await.unwrap();
        assert_eq!(summary.project_count, 3);
        assert_eq!(extractor.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_config_keeps_old_activity() {
        let dir = workspace(&["one"]);
        let pool = setup_test_pool().await;
        let pipe = pipeline(pool.clone(), dir.path());
        pipe.run().await.unwrap();

        let id = canonical_id(&dir, "one");
        let key = id.clone();
        pool.interact(move |conn| {
            insert_activity_sync(conn, &key, ActivityKind::Pin, None, "2020-01-01T00:00:00Z")?;
            Ok(())
        })
        .await
        .unwrap();
        pipe.run().await.unwrap();

        let old: i64 = pool
            .interact(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM activity WHERE project_id = ?1 AND created_at < '2021'",
                    [&id],
                    |r| r.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(old, 1);
    }

    #[tokio::test]
    async fn test_pipelines_sharing_a_guard_run_once() {
        let dir = workspace(&["one", "two"]);
        let pool = setup_test_pool().await;
        let guard = RefreshGuard::new();
        let first = pipeline(pool.clone(), dir.path()).with_guard(guard.clone());
        let second = pipeline(pool.clone(), dir.path()).with_guard(guard);

        let (a, b) = tokio::join!(first.run(), second.run());
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_eq!(a.scan_id, b.scan_id);
        assert_eq!(a.run_id, b.run_id);

        let scans = pool.interact(|conn| Ok(count_scans_sync(conn)?)).await.unwrap();
        assert_eq!(scans, 1);
    }

    #[tokio::test]
    async fn test_projects_under_skipped_subtree_not_marked_missing() {
        let pool = setup_test_pool().await;
        pool.interact(|conn| {
            let at = "2026-01-01T00:00:00Z";
            upsert_project_sync(conn, "inner", "/dev/nest/inner", "inner", at)?;
            upsert_project_sync(conn, "elsewhere", "/dev/other", "other", at)?;
            Ok(())
        })
        .await
        .unwrap();
        let dir = TempDir::new().unwrap();
        let pipe = pipeline(pool.clone(), dir.path());

        pipe.reconcile_missing(HashSet::new(), vec![PathBuf::from("/dev/nest")], 0)
            .await
            .unwrap();

        let (inner, elsewhere) = pool
            .interact(|conn| {
                Ok((
                    get_project_sync(conn, "inner")?,
                    get_project_sync(conn, "elsewhere")?,
                ))
            })
            .await
            .unwrap();
        assert!(inner.unwrap().missing_since.is_none());
        assert!(elsewhere.unwrap().missing_since.is_some());
    }
}
