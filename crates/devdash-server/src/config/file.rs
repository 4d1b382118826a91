// crates/devdash-server/src/config/file.rs
// File-based configuration from ~/.devdash/config.toml

use super::ConfigValidation;
use super::ignore::DEFAULT_EXCLUDE_DIRS;
use crate::health::ScoringPolicy;
use crate::utils::expand_home;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Top-level config structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DevdashConfig {
    pub scan: ScanConfig,
    pub scoring: ScoringPolicy,
    pub pipeline: PipelineConfig,
    /// SQLite database path (default ~/.devdash/devdash.db)
    #[serde(deserialize_with = "deserialize_opt_path")]
    pub db_path: Option<PathBuf>,
}

/// `[scan]` section: where and how projects are discovered
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanConfig {
    #[serde(deserialize_with = "deserialize_path")]
    pub root: PathBuf,
    /// Entries whose presence marks a directory as a project root
    pub markers: Vec<String>,
    pub exclude_dirs: Vec<String>,
    /// Maximum directory depth below the root
    pub max_depth: usize,
    pub follow_links: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            root: expand_home("~/dev"),
            markers: vec![".git".to_string()],
            exclude_dirs: DEFAULT_EXCLUDE_DIRS.iter().map(|s| s.to_string()).collect(),
            max_depth: 3,
            follow_links: false,
        }
    }
}

impl ScanConfig {
    /// Defaults rooted at `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }
}

/// What happens to a known project whose root is no longer discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPolicy {
    /// Flag it missing (kept, history preserved, reported as `missing`)
    #[default]
    MarkMissing,
    /// Leave it untouched with its last snapshot
    Ignore,
}

/// `[pipeline]` section: refresh behavior
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent extraction workers
    pub workers: usize,
    /// Per-project extraction budget in seconds
    pub extract_timeout_secs: u64,
    pub missing_policy: MissingPolicy,
    /// Snapshots kept per project
    pub snapshot_history: usize,
    /// Purge activity older than this many days; 0 keeps it forever
    pub activity_retention_days: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            extract_timeout_secs: 10,
            missing_policy: MissingPolicy::MarkMissing,
            snapshot_history: 20,
            activity_retention_days: 0,
        }
    }
}

impl PipelineConfig {
    pub fn extract_budget(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }
}

fn deserialize_path<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(expand_home(&raw))
}

fn deserialize_opt_path<'de, D>(deserializer: D) -> Result<Option<PathBuf>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|r| expand_home(&r)))
}

impl DevdashConfig {
    /// Load config from ~/.devdash/config.toml
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from an explicit path, falling back to defaults
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    debug!(path = %path.display(), "Loaded config from file");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config file");
                    Self::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        super::devdash_home().join("config.toml")
    }

    /// Database path, defaulting under ~/.devdash
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| super::devdash_home().join("devdash.db"))
    }

    /// Record structural problems that would make a refresh misbehave
    pub fn validate_into(&self, validation: &mut ConfigValidation) {
        if self.pipeline.workers == 0 {
            validation.add_error("pipeline.workers must be at least 1");
        }
        if self.pipeline.extract_timeout_secs == 0 {
            validation.add_error("pipeline.extract_timeout_secs must be at least 1");
        }
        if self.scan.markers.is_empty() {
            validation.add_error("scan.markers is empty; no project would ever be discovered");
        }
        if self.scoring.abandon_after_days <= self.scoring.stale_after_days {
            validation.add_warning(format!(
                "scoring.abandon_after_days ({}) is not greater than stale_after_days ({}); \
                 projects will go straight to abandoned",
                self.scoring.abandon_after_days, self.scoring.stale_after_days
            ));
        }
        if self.pipeline.snapshot_history == 0 {
            validation.add_warning("pipeline.snapshot_history is 0; history pruning disabled");
        }
        if !self.scan.root.is_dir() {
            validation.add_warning(format!(
                "scan root {} does not exist; refresh will fail",
                self.scan.root.display()
            ));
        }
    }
}
