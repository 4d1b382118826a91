// crates/devdash-server/src/scanner.rs
// Project root discovery over a configured directory tree

use crate::config::ScanConfig;
use crate::config::ignore::is_excluded;
use crate::error::{DevdashError, Result};
use crate::utils::path_to_string;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// A discovered project root. No database access involved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProjectDescriptor {
    pub id: String,
    pub path: PathBuf,
    /// Directory name as found on disk
    pub raw_name: String,
}

impl ProjectDescriptor {
    /// Build from an absolute project root
    pub fn from_path(path: PathBuf) -> Self {
        let raw_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path_to_string(&path));
        Self {
            id: project_id(&path),
            path,
            raw_name,
        }
    }
}

/// Stable project id: first 16 hex chars of SHA-256 over the root path
pub fn project_id(path: &Path) -> String {
    let digest = Sha256::digest(path_to_string(path).as_bytes());
    digest
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// A subtree the walk could not examine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryError {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    Project(ProjectDescriptor),
    Skipped(DiscoveryError),
}

/// Walks a root directory for project roots
#[derive(Debug, Clone)]
pub struct ProjectScanner {
    config: ScanConfig,
}

impl ProjectScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Start a lazy walk.
    ///
    /// Fails only when the root itself is missing or not a directory.
    pub fn discover(&self) -> Result<Discoveries> {
        let root = &self.config.root;
        let meta = std::fs::metadata(root).map_err(|e| {
            DevdashError::NotFound(format!("scan root {}: {}", root.display(), e))
        })?;
        if !meta.is_dir() {
            return Err(DevdashError::InvalidInput(format!(
                "scan root {} is not a directory",
                root.display()
            )));
        }
        let root = root.canonicalize()?;
        debug!(root = %root.display(), max_depth = self.config.max_depth, "Starting discovery");

        let walker = WalkDir::new(&root)
            .max_depth(self.config.max_depth)
            .follow_links(self.config.follow_links)
            .sort_by_file_name()
            .into_iter();

        Ok(Discoveries {
            walker,
            markers: self.config.markers.clone(),
            exclude_dirs: self.config.exclude_dirs.clone(),
        })
    }
}

/// Lazy sequence of discoveries; owns its walk state, nothing shared
pub struct Discoveries {
    walker: walkdir::IntoIter,
    markers: Vec<String>,
    exclude_dirs: Vec<String>,
}

impl Discoveries {
    fn has_marker(&self, dir: &Path) -> std::io::Result<bool> {
        for marker in &self.markers {
            if dir.join(marker).try_exists()? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl Iterator for Discoveries {
    type Item = Discovery;

    fn next(&mut self) -> Option<Discovery> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_default();
                    let reason = match err.loop_ancestor() {
                        Some(ancestor) => format!("symlink loop to {}", ancestor.display()),
                        None => err
                            .io_error()
                            .map(|e| e.to_string())
                            .unwrap_or_else(|| err.to_string()),
                    };
                    warn!(path = %path.display(), reason = %reason, "Skipping subtree");
                    return Some(Discovery::Skipped(DiscoveryError { path, reason }));
                }
            };

            // Root is a container, never a project
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy();
            if is_excluded(&name, &self.exclude_dirs) {
                self.walker.skip_current_dir();
                continue;
            }

            match self.has_marker(entry.path()) {
                Ok(true) => {
                    // No nested projects
                    self.walker.skip_current_dir();
                    let descriptor = ProjectDescriptor::from_path(entry.into_path());
                    debug!(project = %descriptor.id, path = %descriptor.path.display(), "Discovered project");
                    return Some(Discovery::Project(descriptor));
                }
                Ok(false) => {}
                Err(e) => {
                    self.walker.skip_current_dir();
                    let path = entry.into_path();
                    warn!(path = %path.display(), error = %e, "Marker check failed, skipping subtree");
                    return Some(Discovery::Skipped(DiscoveryError {
                        path,
                        reason: e.to_string(),
                    }));
                }
            }
        }
    }
}
