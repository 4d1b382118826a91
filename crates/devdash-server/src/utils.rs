//! crates/devdash-server/src/utils.rs
//! Shared utility functions used across the codebase

use std::path::{Path, PathBuf};

/// Convert a Path to an owned String, replacing invalid UTF-8 with U+FFFD.
pub fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

/// Expand a leading `~/` (or a bare `~`) to the home directory.
///
/// Paths without a tilde, or with no resolvable home directory, are
/// returned unchanged.
pub fn expand_home(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

/// Current time as an RFC 3339 string (UTC, second precision)
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}
