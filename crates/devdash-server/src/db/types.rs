// crates/devdash-server/src/db/types.rs
// Row types read from and written to the store

use devdash_types::ProjectStatus;
use std::str::FromStr;

/// One discovered project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRow {
    pub id: String,
    pub path: String,
    pub name: String,
    pub pinned: bool,
    pub last_touched_at: Option<String>,
    pub missing_since: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Immutable per-project, per-run scan result
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub seq: i64,
    pub project_id: String,
    pub run_id: String,
    pub collected_at: String,
    pub signals_json: String,
    pub health_score: u8,
    pub hygiene_score: u8,
    pub momentum_score: u8,
    pub status: ProjectStatus,
    pub tags: Vec<String>,
    pub breakdown_json: String,
    pub description: Option<String>,
    pub timed_out: bool,
}

/// Snapshot fields supplied by the pipeline; `seq` is assigned on insert
#[derive(Debug, Clone)]
pub struct NewSnapshot {
    pub project_id: String,
    pub run_id: String,
    pub collected_at: String,
    pub signals_json: String,
    pub health_score: u8,
    pub hygiene_score: u8,
    pub momentum_score: u8,
    pub status: ProjectStatus,
    pub tags: Vec<String>,
    pub breakdown_json: String,
    pub description: Option<String>,
    pub timed_out: bool,
}

/// User corrections to computed fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideRow {
    pub project_id: String,
    pub status_override: Option<String>,
    pub purpose_override: Option<String>,
    pub notes_override: Option<String>,
    /// JSON array of strings
    pub tags_override: Option<String>,
    pub updated_at: String,
}

impl OverrideRow {
    /// Stored status override, if it names a known status
    pub fn status(&self) -> Option<ProjectStatus> {
        let raw = self.status_override.as_deref()?;
        match ProjectStatus::from_str(raw) {
            Ok(status) => Some(status),
            Err(_) => {
                tracing::debug!(project = %self.project_id, value = raw, "Ignoring unknown stored status override");
                None
            }
        }
    }
}

/// User-authored descriptive fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRow {
    pub project_id: String,
    pub goal: Option<String>,
    pub audience: Option<String>,
    pub success_metrics: Option<String>,
    pub next_action: Option<String>,
    pub publish_target: Option<String>,
    pub evidence_json: Option<String>,
    pub outcomes_json: Option<String>,
    pub updated_at: String,
}

/// One completed refresh run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRow {
    pub id: i64,
    pub run_id: String,
    pub scanned_at: String,
    pub project_count: usize,
    pub failed_count: usize,
    pub duration_ms: u64,
}

/// Column assignment for a partial upsert: `None` writes NULL
pub type ColumnValue = (&'static str, Option<String>);

/// Parse a JSON string-array column, degrading to empty on corruption
pub fn parse_tags_json(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "Corrupt tags JSON, treating as empty");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_status_parses_known() {
        let row = OverrideRow {
            project_id: "p".to_string(),
            status_override: Some("abandoned".to_string()),
            ..Default::default()
        };
        assert_eq!(row.status(), Some(ProjectStatus::Abandoned));
    }

    #[test]
    fn test_override_status_ignores_unknown() {
        let row = OverrideRow {
            project_id: "p".to_string(),
            status_override: Some("paused".to_string()),
            ..Default::default()
        };
        assert_eq!(row.status(), None);
    }

    #[test]
    fn test_parse_tags_json() {
        assert_eq!(parse_tags_json(r#"["a","b"]"#), vec!["a", "b"]);
        assert!(parse_tags_json("not json").is_empty());
        assert!(parse_tags_json(r#"{"a":1}"#).is_empty());
    }
}
