// crates/devdash-server/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use super::DevdashConfig;
use super::ignore::parse_dir_list;
use crate::utils::expand_home;
use std::path::PathBuf;
use tracing::{debug, info};

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Environment overrides - all env vars in one place
#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    /// Scan root (DEV_ROOT)
    pub dev_root: Option<PathBuf>,
    /// Comma-separated directory names the scanner skips (EXCLUDE_DIRS)
    pub exclude_dirs: Option<Vec<String>>,
    /// Database file (DEVDASH_DB)
    pub db_path: Option<PathBuf>,
    /// Extraction worker count (DEVDASH_WORKERS)
    pub workers: Option<usize>,
    /// Per-project extraction budget (DEVDASH_EXTRACT_TIMEOUT_SECS)
    pub extract_timeout_secs: Option<u64>,
    /// Variables that were set but could not be parsed
    pub invalid: Vec<String>,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        info!("Loading environment configuration");
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut invalid = Vec::new();

        let mut parse_num = |name: &str| -> Option<u64> {
            let raw = read(name)?;
            match raw.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    invalid.push(format!("{name}={raw}"));
                    None
                }
            }
        };
        let workers = parse_num("DEVDASH_WORKERS").map(|n| n as usize);
        let extract_timeout_secs = parse_num("DEVDASH_EXTRACT_TIMEOUT_SECS");

        let config = Self {
            dev_root: read("DEV_ROOT").map(|r| expand_home(r.trim())),
            exclude_dirs: read("EXCLUDE_DIRS").map(|csv| parse_dir_list(&csv)),
            db_path: read("DEVDASH_DB").map(|p| expand_home(p.trim())),
            workers,
            extract_timeout_secs,
            invalid,
        };
        debug!(?config, "Environment overrides");
        config
    }

    /// Layer these overrides on top of file config
    pub fn apply(&self, config: &mut DevdashConfig) {
        if let Some(ref root) = self.dev_root {
            config.scan.root = root.clone();
        }
        if let Some(ref dirs) = self.exclude_dirs {
            config.scan.exclude_dirs = dirs.clone();
        }
        if let Some(ref db) = self.db_path {
            config.db_path = Some(db.clone());
        }
        if let Some(workers) = self.workers {
            config.pipeline.workers = workers;
        }
        if let Some(secs) = self.extract_timeout_secs {
            config.pipeline.extract_timeout_secs = secs;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();
        for entry in &self.invalid {
            validation.add_warning(format!("Ignoring unparsable environment value {entry}"));
        }
        if let Some(ref root) = self.dev_root
            && root.is_relative()
        {
            validation.add_warning(format!(
                "DEV_ROOT '{}' is relative; it resolves against the working directory",
                root.display()
            ));
        }
        validation
    }
}
