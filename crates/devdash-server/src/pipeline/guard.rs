// crates/devdash-server/src/pipeline/guard.rs
// Single-flight guard for refresh runs (block-and-join)
//
// A call that arrives while a run is in flight awaits that run and gets the
// same result. A call after it settles starts a new run.

use crate::error::RefreshError;
use devdash_types::RefreshSummary;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

type RunResult = Result<RefreshSummary, RefreshError>;
type SharedRun = Shared<BoxFuture<'static, RunResult>>;

/// Lifecycle of the most recent run. `generation` counts runs started.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Running {
        generation: u64,
    },
    Completed {
        generation: u64,
        scan_id: i64,
    },
    Failed {
        generation: u64,
        error: RefreshError,
    },
}

#[derive(Default)]
struct GuardInner {
    state: RefreshState,
    generation: u64,
    in_flight: Option<(u64, SharedRun)>,
}

/// Cloneable handle; clones share the same exclusion
#[derive(Clone, Default)]
pub struct RefreshGuard {
    inner: Arc<Mutex<GuardInner>>,
}

fn lock(inner: &Mutex<GuardInner>) -> MutexGuard<'_, GuardInner> {
    inner.lock().unwrap_or_else(|e| e.into_inner())
}

/// Record the outcome of `generation`, if it is still the one in flight
fn settle(inner: &Mutex<GuardInner>, generation: u64, result: &RunResult) {
    let mut guard = lock(inner);
    if guard.in_flight.as_ref().map(|(g, _)| *g) != Some(generation) {
        return;
    }
    guard.in_flight = None;
    guard.state = match result {
        Ok(summary) => RefreshState::Completed {
            generation,
            scan_id: summary.scan_id,
        },
        Err(error) => RefreshState::Failed {
            generation,
            error: error.clone(),
        },
    };
}

impl RefreshGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RefreshState {
        lock(&self.inner).state.clone()
    }

    pub fn is_running(&self) -> bool {
        lock(&self.inner).in_flight.is_some()
    }

    /// Run `start()` unless a run is already in flight, in which case join it.
    ///
    /// The run is spawned onto the runtime, so it completes (and settles the
    /// state) even if every caller stops waiting.
    pub async fn run<F, Fut>(&self, start: F) -> RunResult
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RunResult> + Send + 'static,
    {
        let shared = {
            let mut guard = lock(&self.inner);
            let joined = guard.in_flight.as_ref().map(|(g, s)| (*g, s.clone()));
            match joined {
                Some((generation, shared)) => {
                    debug!(generation, "Refresh already running, joining");
                    shared
                }
                None => {
                    guard.generation += 1;
                    let generation = guard.generation;

                    let inner = Arc::clone(&self.inner);
                    let run = start();
                    let task = tokio::spawn(async move {
                        let result = run.await;
                        settle(&inner, generation, &result);
                        result
                    });

                    let inner = Arc::clone(&self.inner);
                    let shared = async move {
                        match task.await {
                            Ok(result) => result,
                            Err(e) => {
                                let result = Err(RefreshError::Aborted {
                                    message: e.to_string(),
                                });
                                settle(&inner, generation, &result);
                                result
                            }
                        }
                    }
                    .boxed()
                    .shared();

                    guard.state = RefreshState::Running { generation };
                    guard.in_flight = Some((generation, shared.clone()));
                    shared
                }
            }
        };
        shared.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn summary(scan_id: i64) -> RefreshSummary {
        RefreshSummary {
            scan_id,
            run_id: format!("run-{scan_id}"),
            scanned_at: "2026-01-01T00:00:00Z".to_string(),
            project_count: 0,
            failed_count: 0,
            discovered_count: 0,
            skipped_count: 0,
            duration_ms: 0,
        }
    }

    /// Start closure that counts physical runs and takes `delay`
    fn counted(
        runs: &Arc<AtomicUsize>,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, RunResult> + use<> {
        let runs = Arc::clone(runs);
        move || {
            async move {
                let n = runs.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(delay).await;
                Ok(summary(n as i64))
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_run() {
        let guard = RefreshGuard::new();
        let runs = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            guard.run(counted(&runs, Duration::from_millis(50))),
            guard.run(counted(&runs, Duration::from_millis(50))),
            guard.run(counted(&runs, Duration::from_millis(50))),
        );

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().scan_id, 1);
        assert_eq!(b.unwrap().scan_id, 1);
        assert_eq!(c.unwrap().scan_id, 1);
        assert_eq!(
            guard.state(),
            RefreshState::Completed {
                generation: 1,
                scan_id: 1
            }
        );
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let guard = RefreshGuard::new();
        let runs = Arc::new(AtomicUsize::new(0));

        guard.run(counted(&runs, Duration::ZERO)).await.unwrap();
        let second = guard.run(counted(&runs, Duration::ZERO)).await.unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(second.scan_id, 2);
        assert!(!guard.is_running());
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_recorded() {
        let guard = RefreshGuard::new();
        let fail = || async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Err::<RefreshSummary, _>(RefreshError::Persistence {
                message: "disk full".to_string(),
                partial_count: 3,
            })
        };

        let (a, b) = tokio::join!(guard.run(fail), guard.run(fail));
        assert_eq!(a.unwrap_err().partial_count(), Some(3));
        assert_eq!(b.unwrap_err().partial_count(), Some(3));
        assert!(matches!(
            guard.state(),
            RefreshState::Failed { generation: 1, .. }
        ));
    }

    #[tokio::test]
    async fn test_clones_share_exclusion() {
        let guard = RefreshGuard::new();
        let other = guard.clone();
        let runs = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            guard.run(counted(&runs, Duration::from_millis(30))),
            other.run(counted(&runs, Duration::from_millis(30))),
        );
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_running_state_visible_while_in_flight() {
        let guard = RefreshGuard::new();
        assert_eq!(guard.state(), RefreshState::Idle);

        let runs = Arc::new(AtomicUsize::new(0));
        let handle = {
            let guard = guard.clone();
            let start = counted(&runs, Duration::from_millis(100));
            tokio::spawn(async move { guard.run(start).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(guard.is_running());
        assert_eq!(guard.state(), RefreshState::Running { generation: 1 });
        handle.await.unwrap().unwrap();
    }
}
