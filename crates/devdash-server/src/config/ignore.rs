// crates/devdash-server/src/config/ignore.rs
// Centralized directory ignore lists

/// Directories the scanner never descends into by default
pub const DEFAULT_EXCLUDE_DIRS: &[&str] = &[
    "_projects_dashboard",
    "node_modules",
    ".venv",
    "__pycache__",
    ".git",
];

/// Directories skipped when walking a project's sources
pub const COMMON_SKIP: &[&str] = &[
    "node_modules",
    ".venv",
    ".git",
    "__pycache__",
    "dist",
    "build",
    ".next",
    "target",
    ".tox",
    "venv",
    "env",
];

/// Check if a directory should be skipped during a source walk
pub fn should_skip(name: &str) -> bool {
    COMMON_SKIP.contains(&name)
}

/// Check if the scanner should refuse to descend into `name`
pub fn is_excluded(name: &str, exclude_dirs: &[String]) -> bool {
    name.starts_with('.') || exclude_dirs.iter().any(|d| d == name)
}

/// Parse a comma-separated directory list, dropping blanks
pub fn parse_dir_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
