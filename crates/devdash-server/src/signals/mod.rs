// crates/devdash-server/src/signals/mod.rs
// Best-effort signal collection for one project root
//
// Every signal is independently Present, Unknown or TimedOut. A collector
// writes into a `SignalSink` as it goes; when the per-project budget runs
// out the sink is closed and whatever was not reached stays TimedOut.

pub mod files;
pub mod git;

use crate::error::ExtractError;
use crate::scanner::ProjectDescriptor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::OwnedSemaphorePermit;
use tracing::warn;

/// Outcome of one signal check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Signal<T> {
    Present(T),
    Unknown,
    TimedOut,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Signal::Unknown
    }
}

impl<T> Signal<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Signal::Present(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Signal::TimedOut)
    }

    fn settle(&mut self) {
        if self.is_timed_out() {
            *self = Signal::Unknown;
        }
    }
}

impl Signal<bool> {
    /// True only when present and true
    pub fn is_true(&self) -> bool {
        matches!(self, Signal::Present(true))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingTree {
    pub untracked: usize,
    pub modified: usize,
    pub staged: usize,
}

impl WorkingTree {
    pub fn is_dirty(&self) -> bool {
        self.untracked + self.modified + self.staged > 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AheadBehind {
    pub ahead: usize,
    pub behind: usize,
}

/// Name and description a project declares about itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declared {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub todo: usize,
    pub fixme: usize,
    pub loc: usize,
}

/// Everything observed about one project during one refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalSet {
    pub collected_at: DateTime<Utc>,
    /// Collection hit its budget; unreached signals are TimedOut
    pub timed_out: bool,

    // VCS
    pub is_repo: Signal<bool>,
    pub last_commit_at: Signal<DateTime<Utc>>,
    pub branch: Signal<String>,
    /// Present(None): repository has no origin remote
    pub remote_url: Signal<Option<String>>,
    pub working_tree: Signal<WorkingTree>,
    /// Present(None): current branch tracks no upstream
    pub upstream: Signal<Option<AheadBehind>>,
    pub branch_count: Signal<usize>,
    pub stash_count: Signal<usize>,
    pub commit_count: Signal<usize>,

    // Filesystem checks
    pub readme: Signal<bool>,
    pub tests: Signal<bool>,
    pub ci: Signal<bool>,
    pub license: Signal<bool>,
    pub lockfile: Signal<bool>,
    pub linter: Signal<bool>,
    pub deployment: Signal<bool>,
    pub docker: Signal<bool>,
    pub languages: Signal<Vec<String>>,
    pub framework: Signal<Option<String>>,
    pub services: Signal<Vec<String>>,
    pub package_manager: Signal<Option<String>>,
    pub declared: Signal<Declared>,
    pub source_stats: Signal<SourceStats>,
}

macro_rules! signal_fields {
    ($($field:ident),* $(,)?) => {
        impl SignalSet {
            fn filled(collected_at: DateTime<Utc>, pending: bool) -> Self {
                Self {
                    collected_at,
                    timed_out: false,
                    $($field: if pending { Signal::TimedOut } else { Signal::Unknown },)*
                }
            }

            /// Turn signals no check reached into Unknown
            fn settle_pending(&mut self) {
                $(self.$field.settle();)*
            }

            /// Names of signals left TimedOut
            pub fn timed_out_fields(&self) -> Vec<&'static str> {
                let mut fields = Vec::new();
                $(if self.$field.is_timed_out() {
                    fields.push(stringify!($field));
                })*
                fields
            }
        }
    };
}

signal_fields!(
    is_repo,
    last_commit_at,
    branch,
    remote_url,
    working_tree,
    upstream,
    branch_count,
    stash_count,
    commit_count,
    readme,
    tests,
    ci,
    license,
    lockfile,
    linter,
    deployment,
    docker,
    languages,
    framework,
    services,
    package_manager,
    declared,
    source_stats,
);

impl SignalSet {
    /// Every signal Unknown
    pub fn unknown(collected_at: DateTime<Utc>) -> Self {
        Self::filled(collected_at, false)
    }

    /// Declared description, if any check found one
    pub fn description(&self) -> Option<&str> {
        self.declared.present()?.description.as_deref()
    }
}

// ═══════════════════════════════════════
// SINK
// ═══════════════════════════════════════

struct SinkInner {
    set: SignalSet,
    closed: bool,
}

/// Shared, closable destination for check results.
///
/// Starts with every signal TimedOut. Once closed, writes are dropped and
/// `record` returns false so the collector can stop early.
#[derive(Clone)]
pub struct SignalSink {
    inner: Arc<Mutex<SinkInner>>,
}

impl SignalSink {
    pub fn new(collected_at: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SinkInner {
                set: SignalSet::filled(collected_at, true),
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Apply a write. Returns false (and writes nothing) once closed.
    pub fn record(&self, write: impl FnOnce(&mut SignalSet)) -> bool {
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        write(&mut inner.set);
        true
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Close after the collector returned normally
    fn finish(&self) -> SignalSet {
        let mut inner = self.lock();
        inner.closed = true;
        inner.set.settle_pending();
        inner.set.clone()
    }

    /// Close because the budget ran out
    fn expire(&self) -> SignalSet {
        let mut inner = self.lock();
        inner.closed = true;
        inner.set.timed_out = true;
        inner.set.clone()
    }
}

// ═══════════════════════════════════════
// EXTRACTORS
// ═══════════════════════════════════════

/// Source of signals for a project root.
///
/// Implementations run on the blocking pool and should check
/// `sink.is_closed()` (or the return of `record`) between checks.
pub trait SignalExtractor: Send + Sync + 'static {
    /// Err only when the project as a whole cannot be examined
    fn extract(&self, project: &ProjectDescriptor, sink: &SignalSink) -> Result<(), ExtractError>;
}

/// Filesystem + git2 extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSignalExtractor;

impl SignalExtractor for FsSignalExtractor {
    fn extract(&self, project: &ProjectDescriptor, sink: &SignalSink) -> Result<(), ExtractError> {
        let root = project.path.as_path();
        std::fs::read_dir(root).map_err(|e| ExtractError::Unreadable {
            path: root.to_path_buf(),
            message: e.to_string(),
        })?;

        // cheapest first: the source walk is the only unbounded check
        if !files::collect_markers(root, sink) {
            return Ok(());
        }
        if !git::collect(root, sink) {
            return Ok(());
        }
        files::collect_source_stats(root, sink);
        Ok(())
    }
}

/// Run an extractor on the blocking pool under a time budget.
///
/// On timeout the partial set is returned with `timed_out` set; the worker
/// thread is abandoned and stops at its next check. `permit` is held by the
/// worker thread, not the caller, so it is released only when the thread
/// actually returns.
pub async fn extract_with_budget(
    extractor: Arc<dyn SignalExtractor>,
    project: ProjectDescriptor,
    budget: Duration,
    permit: Option<OwnedSemaphorePermit>,
) -> Result<SignalSet, ExtractError> {
    let sink = SignalSink::new(Utc::now());
    let worker_sink = sink.clone();
    let worker_project = project.clone();
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        extractor.extract(&worker_project, &worker_sink)
    });

    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(Ok(()))) => Ok(sink.finish()),
        Ok(Ok(Err(e))) => {
            sink.finish();
            Err(e)
        }
        Ok(Err(join_err)) => {
            sink.finish();
            Err(ExtractError::Panicked(join_err.to_string()))
        }
        Err(_) => {
            let set = sink.expire();
            warn!(
                project = %project.id,
                path = %project.path.display(),
                budget_ms = budget.as_millis() as u64,
                pending = ?set.timed_out_fields(),
                "Signal extraction timed out, keeping partial signals"
            );
            Ok(set)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(path: PathBuf) -> ProjectDescriptor {
        ProjectDescriptor::from_path(path)
    }

    struct Stepwise;

    impl SignalExtractor for Stepwise {
        fn extract(&self, _: &ProjectDescriptor, sink: &SignalSink) -> Result<(), ExtractError> {
            sink.record(|s| s.readme = Signal::Present(true));
            // wait for the budget to expire, then try to keep going
            while !sink.is_closed() {
                std::thread::sleep(Duration::from_millis(5));
            }
            let accepted = sink.record(|s| s.tests = Signal::Present(true));
            assert!(!accepted);
            Ok(())
        }
    }

    struct Unreadable;

    impl SignalExtractor for Unreadable {
        fn extract(&self, p: &ProjectDescriptor, _: &SignalSink) -> Result<(), ExtractError> {
            Err(ExtractError::Unreadable {
                path: p.path.clone(),
                message: "denied".to_string(),
            })
        }
    }

    struct Partial;

    impl SignalExtractor for Partial {
        fn extract(&self, _: &ProjectDescriptor, sink: &SignalSink) -> Result<(), ExtractError> {
            sink.record(|s| s.license = Signal::Present(false));
            Ok(())
        }
    }

    /// Records one signal, then blocks well past any budget without
    /// touching the sink
    struct Stalled;

    impl SignalExtractor for Stalled {
        fn extract(&self, _: &ProjectDescriptor, sink: &SignalSink) -> Result<(), ExtractError> {
            sink.record(|s| s.readme = Signal::Present(true));
            std::thread::sleep(Duration::from_millis(1500));
            Ok(())
        }
    }

    #[test]
    fn test_signal_serializes_tagged() {
        let json = serde_json::to_value(Signal::Present(3usize)).unwrap();
        assert_eq!(json, serde_json::json!({"state": "present", "value": 3}));
        let json = serde_json::to_value(Signal::<usize>::TimedOut).unwrap();
        assert_eq!(json, serde_json::json!({"state": "timed_out"}));
    }

    #[test]
    fn test_working_tree_dirty() {
        assert!(!WorkingTree::default().is_dirty());
        assert!(WorkingTree { untracked: 1, ..Default::default() }.is_dirty());
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_signals() {
        let set = extract_with_budget(
            Arc::new(Stepwise),
            descriptor(PathBuf::from("/nonexistent/slow")),
            Duration::from_millis(50),
            None,
        )
        .await
        .unwrap();

        assert!(set.timed_out);
        assert_eq!(set.readme, Signal::Present(true));
        assert_eq!(set.tests, Signal::TimedOut);
        assert!(set.timed_out_fields().contains(&"tests"));
        assert!(!set.timed_out_fields().contains(&"readme"));
    }

    #[tokio::test]
    async fn test_timeout_does_not_wait_for_stalled_worker() {
        let started = std::time::Instant::now();
        let set = extract_with_budget(
            Arc::new(Stalled),
            descriptor(PathBuf::from("/nonexistent/stalled")),
            Duration::from_millis(100),
            None,
        )
        .await
        .unwrap();

        assert!(started.elapsed() < Duration::from_millis(1000));
        assert!(set.timed_out);
        assert_eq!(set.readme, Signal::Present(true));
        assert_eq!(set.license, Signal::TimedOut);
    }

    #[tokio::test]
    async fn test_normal_finish_turns_unreached_into_unknown() {
        let set = extract_with_budget(
            Arc::new(Partial),
            descriptor(PathBuf::from("/nonexistent/partial")),
            Duration::from_secs(5),
            None,
        )
        .await
        .unwrap();

        assert!(!set.timed_out);
        assert_eq!(set.license, Signal::Present(false));
        assert_eq!(set.readme, Signal::Unknown);
        assert!(set.timed_out_fields().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_root_fails_project() {
        let result = extract_with_budget(
            Arc::new(Unreadable),
            descriptor(PathBuf::from("/nonexistent/x")),
            Duration::from_secs(5),
            None,
        )
        .await;
        assert!(matches!(result, Err(ExtractError::Unreadable { .. })));
    }

    async fn extract_fs(path: PathBuf) -> Result<SignalSet, ExtractError> {
        extract_with_budget(
            Arc::new(FsSignalExtractor),
            descriptor(path),
            Duration::from_secs(10),
            None,
        )
        .await
    }

    #[tokio::test]
    async fn test_fs_extractor_rejects_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = extract_fs(dir.path().join("gone")).await;
        assert!(matches!(result, Err(ExtractError::Unreadable { .. })));
    }

    #[tokio::test]
    async fn test_fs_extractor_on_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "# hi\n").unwrap();
        std::fs::write(dir.path().join("main.py"), "# TODO: x\nprint(1)\n").unwrap();

        let set = extract_fs(dir.path().to_path_buf()).await.unwrap();
        assert_eq!(set.readme, Signal::Present(true));
        assert_eq!(set.is_repo, Signal::Present(false));
        assert_eq!(set.last_commit_at, Signal::Unknown);
        let stats = set.source_stats.present().unwrap();
        assert_eq!(stats.todo, 1);
        assert_eq!(stats.loc, 2);
    }
}
