// crates/devdash-server/src/health.rs
// Deterministic health scoring: SignalSet -> scores, status, tags
//
// Pure: reads only the SignalSet and the policy. Recency is measured
// against `SignalSet::collected_at`, never the wall clock.

use crate::signals::{Signal, SignalSet};
use devdash_types::ProjectStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const HYGIENE_RAW_MAX: u32 = 95;
const MOMENTUM_RAW_MAX: u32 = 70;
const HYGIENE_WEIGHT: f64 = 0.65;
const MOMENTUM_WEIGHT: f64 = 0.35;

/// TODO count below which the low-TODO bonus applies
const TODO_THRESHOLD: usize = 10;
const MAX_LOW_BRANCHES: usize = 3;

/// (max days inactive, points), first match wins
const RECENCY_STEPS: &[(i64, u32)] = &[(7, 25), (14, 20), (30, 15), (60, 5)];

/// `[scoring]` section: status thresholds
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Days without a commit after which a project is at best stale
    pub stale_after_days: i64,
    /// Days without a commit after which a project is abandoned
    pub abandon_after_days: i64,
    /// Minimum health score for `active`
    pub active_min_score: u8,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            stale_after_days: 60,
            abandon_after_days: 180,
            active_min_score: 40,
        }
    }
}

/// Points awarded per criterion, keyed by criterion name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakdown {
    pub hygiene: BTreeMap<String, u32>,
    pub momentum: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    pub health_score: u8,
    pub hygiene_score: u8,
    pub momentum_score: u8,
    pub status: ProjectStatus,
    pub breakdown: Breakdown,
    pub tags: Vec<String>,
}

/// Scale a raw point total to 0..=100
fn normalize(raw: u32, max: u32) -> u8 {
    let scaled = (f64::from(raw) * 100.0 / f64::from(max)).round();
    scaled.clamp(0.0, 100.0) as u8
}

/// Whole days between the last commit and collection, if known
pub fn days_inactive(signals: &SignalSet) -> Option<i64> {
    let last = signals.last_commit_at.present()?;
    Some((signals.collected_at - *last).num_days().max(0))
}

fn hygiene(signals: &SignalSet) -> (u8, BTreeMap<String, u32>) {
    let mut points = BTreeMap::new();
    let mut award = |key: &str, earned: bool, value: u32| {
        if earned {
            points.insert(key.to_string(), value);
        }
    };

    award("readme", signals.readme.is_true(), 15);
    award("tests", signals.tests.is_true(), 20);
    award("cicd", signals.ci.is_true(), 15);
    award(
        "remote",
        matches!(signals.remote_url, Signal::Present(Some(_))),
        10,
    );
    award(
        "lowTodos",
        signals
            .source_stats
            .present()
            .is_some_and(|s| s.todo < TODO_THRESHOLD),
        10,
    );
    award("deployment", signals.deployment.is_true(), 10);
    award("linter", signals.linter.is_true(), 5);
    award("license", signals.license.is_true(), 5);
    award("lockfile", signals.lockfile.is_true(), 5);

    let raw = points.values().sum();
    (normalize(raw, HYGIENE_RAW_MAX), points)
}

fn momentum(signals: &SignalSet) -> (u8, BTreeMap<String, u32>) {
    let mut points = BTreeMap::new();

    if let Some(days) = days_inactive(signals)
        && let Some((_, value)) = RECENCY_STEPS.iter().find(|(max, _)| days <= *max)
    {
        points.insert("recency".to_string(), *value);
    }
    if signals.working_tree.present().is_some_and(|t| !t.is_dirty()) {
        points.insert("cleanTree".to_string(), 20);
    }
    // No upstream counts as nothing unpushed
    let pushed_up = match &signals.upstream {
        Signal::Present(None) => true,
        Signal::Present(Some(ab)) => ab.ahead == 0,
        _ => false,
    };
    if pushed_up {
        points.insert("pushedUp".to_string(), 15);
    }
    if signals
        .branch_count
        .present()
        .is_some_and(|n| *n <= MAX_LOW_BRANCHES)
    {
        points.insert("lowBranches".to_string(), 10);
    }

    let raw = points.values().sum();
    (normalize(raw, MOMENTUM_RAW_MAX), points)
}

fn classify(days: Option<i64>, health: u8, policy: &ScoringPolicy) -> ProjectStatus {
    match days {
        None => ProjectStatus::Unknown,
        Some(d) if d > policy.abandon_after_days => ProjectStatus::Abandoned,
        Some(d) if d > policy.stale_after_days => ProjectStatus::Stale,
        Some(_) if health >= policy.active_min_score => ProjectStatus::Active,
        Some(_) => ProjectStatus::Stale,
    }
}

/// Tags derived from languages, tooling, framework and services
pub fn derive_tags(signals: &SignalSet) -> Vec<String> {
    let mut tags = BTreeSet::new();

    if let Some(languages) = signals.languages.present() {
        for lang in languages {
            tags.insert(lang.to_lowercase().replace('/', "-"));
        }
    }
    if signals.docker.is_true() {
        tags.insert("docker".to_string());
    }
    if signals.ci.is_true() {
        tags.insert("ci-cd".to_string());
    }
    if signals.deployment.is_true() {
        tags.insert("deployed".to_string());
    }
    if signals.tests.is_true() {
        tags.insert("tested".to_string());
    }
    if let Signal::Present(Some(framework)) = &signals.framework {
        tags.insert(framework.to_lowercase());
    }
    if let Some(services) = signals.services.present() {
        tags.extend(services.iter().map(|s| s.to_lowercase()));
    }

    tags.into_iter().collect()
}

/// Score one project's signals
pub fn score(signals: &SignalSet, policy: &ScoringPolicy) -> Assessment {
    let (hygiene_score, hygiene_points) = hygiene(signals);
    let (momentum_score, momentum_points) = momentum(signals);
    let weighted =
        HYGIENE_WEIGHT * f64::from(hygiene_score) + MOMENTUM_WEIGHT * f64::from(momentum_score);
    let health_score = weighted.round().clamp(0.0, 100.0) as u8;

    Assessment {
        health_score,
        hygiene_score,
        momentum_score,
        status: classify(days_inactive(signals), health_score, policy),
        breakdown: Breakdown {
            hygiene: hygiene_points,
            momentum: momentum_points,
        },
        tags: derive_tags(signals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{AheadBehind, SourceStats, WorkingTree};
    use chrono::{DateTime, Duration, Utc};

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Every signal present and favorable
    fn healthy() -> SignalSet {
        let mut s = SignalSet::unknown(at());
        s.is_repo = Signal::Present(true);
        s.last_commit_at = Signal::Present(at() - Duration::days(2));
        s.remote_url = Signal::Present(Some("git@example.com:x.git".to_string()));
        s.working_tree = Signal::Present(WorkingTree::default());
        s.upstream = Signal::Present(Some(AheadBehind { ahead: 0, behind: 4 }));
        s.branch_count = Signal::Present(2);
        for flag in [
            &mut s.readme,
            &mut s.tests,
            &mut s.ci,
            &mut s.license,
            &mut s.lockfile,
            &mut s.linter,
            &mut s.deployment,
        ] {
            *flag = Signal::Present(true);
        }
        s.source_stats = Signal::Present(SourceStats {
            todo: 1,
            fixme: 0,
            loc: 100,
        });
        s
    }

    #[test]
    fn test_full_marks() {
        let a = score(&healthy(), &ScoringPolicy::default());
        assert_eq!(a.hygiene_score, 100);
        assert_eq!(a.momentum_score, 100);
        assert_eq!(a.health_score, 100);
        assert_eq!(a.status, ProjectStatus::Active);
        assert_eq!(a.breakdown.hygiene.values().sum::<u32>(), 95);
        assert_eq!(a.breakdown.momentum.values().sum::<u32>(), 70);
    }

    #[test]
    fn test_unknown_signals_earn_nothing() {
        let a = score(&SignalSet::unknown(at()), &ScoringPolicy::default());
        assert_eq!(a.hygiene_score, 0);
        assert_eq!(a.momentum_score, 0);
        assert_eq!(a.health_score, 0);
        assert_eq!(a.status, ProjectStatus::Unknown);
        assert!(a.breakdown.hygiene.is_empty());
        assert!(a.tags.is_empty());
    }

    #[test]
    fn test_timed_out_signals_earn_nothing() {
        let mut s = healthy();
        s.readme = Signal::TimedOut;
        s.working_tree = Signal::TimedOut;
        let a = score(&s, &ScoringPolicy::default());
        assert!(!a.breakdown.hygiene.contains_key("readme"));
        assert!(!a.breakdown.momentum.contains_key("cleanTree"));
        // 80/95 -> 84, 50/70 -> 71
        assert_eq!(a.hygiene_score, 84);
        assert_eq!(a.momentum_score, 71);
        assert_eq!(a.health_score, 79);
    }

    #[test]
    fn test_recency_steps() {
        let cases = [(0, 25), (7, 25), (8, 20), (14, 20), (30, 15), (45, 5), (60, 5), (61, 0)];
        for (days, expected) in cases {
            let mut s = SignalSet::unknown(at());
            s.last_commit_at = Signal::Present(at() - Duration::days(days));
            let a = score(&s, &ScoringPolicy::default());
            assert_eq!(
                a.breakdown.momentum.get("recency").copied().unwrap_or(0),
                expected,
                "days = {days}"
            );
        }
    }

    #[test]
    fn test_ahead_commits_lose_pushed_up() {
        let mut s = healthy();
        s.upstream = Signal::Present(Some(AheadBehind { ahead: 2, behind: 0 }));
        let a = score(&s, &ScoringPolicy::default());
        assert!(!a.breakdown.momentum.contains_key("pushedUp"));

        s.upstream = Signal::Present(None);
        let a = score(&s, &ScoringPolicy::default());
        assert_eq!(a.breakdown.momentum.get("pushedUp"), Some(&15));
    }

    #[test]
    fn test_status_windows() {
        let policy = ScoringPolicy::default();
        let with_days = |days: i64| {
            let mut s = healthy();
            s.last_commit_at = Signal::Present(at() - Duration::days(days));
            score(&s, &policy).status
        };
        assert_eq!(with_days(10), ProjectStatus::Active);
        assert_eq!(with_days(60), ProjectStatus::Active);
        assert_eq!(with_days(61), ProjectStatus::Stale);
        assert_eq!(with_days(180), ProjectStatus::Stale);
        assert_eq!(with_days(181), ProjectStatus::Abandoned);
    }

    #[test]
    fn test_recent_but_unhealthy_is_stale() {
        let mut s = SignalSet::unknown(at());
        s.last_commit_at = Signal::Present(at() - Duration::days(1));
        let a = score(&s, &ScoringPolicy::default());
        // 25/70 momentum only -> 36 * 0.35 = 13
        assert_eq!(a.health_score, 13);
        assert_eq!(a.status, ProjectStatus::Stale);
    }

    #[test]
    fn test_custom_policy() {
        let policy = ScoringPolicy {
            stale_after_days: 5,
            abandon_after_days: 10,
            active_min_score: 0,
        };
        let mut s = healthy();
        s.last_commit_at = Signal::Present(at() - Duration::days(6));
        assert_eq!(score(&s, &policy).status, ProjectStatus::Stale);
    }

    #[test]
    fn test_deterministic() {
        let s = healthy();
        let policy = ScoringPolicy::default();
        assert_eq!(score(&s, &policy), score(&s, &policy));
    }

    #[test]
    fn test_derived_tags() {
        let mut s = SignalSet::unknown(at());
        s.languages = Signal::Present(vec![
            "JavaScript/TypeScript".to_string(),
            "TypeScript".to_string(),
        ]);
        s.docker = Signal::Present(true);
        s.tests = Signal::Present(true);
        s.ci = Signal::Present(false);
        s.framework = Signal::Present(Some("nextjs".to_string()));
        s.services = Signal::Present(vec!["stripe".to_string(), "docker".to_string()]);

        assert_eq!(
            derive_tags(&s),
            vec![
                "docker",
                "javascript-typescript",
                "nextjs",
                "stripe",
                "tested",
                "typescript"
            ]
        );
    }

    #[test]
    fn test_future_commit_counts_as_today() {
        let mut s = SignalSet::unknown(at());
        s.last_commit_at = Signal::Present(at() + Duration::days(3));
        assert_eq!(days_inactive(&s), Some(0));
    }
}
