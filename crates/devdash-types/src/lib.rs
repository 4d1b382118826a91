// crates/devdash-types/src/lib.rs
// Shared types for devdash (consumed by the HTTP layer and the UI)
// No native-only dependencies allowed here

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════
// STATUS & ACTIVITY KINDS
// ═══════════════════════════════════════

/// Coarse project classification.
///
/// `Active`, `Stale`, `Abandoned` and `Unknown` are produced by the scorer.
/// `Missing` is only ever assigned to projects whose root disappeared from
/// disk (when the missing-project policy marks them).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Stale,
    Abandoned,
    #[default]
    Unknown,
    Missing,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Kind of audited mutation
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::IntoStaticStr,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActivityKind {
    Metadata,
    Override,
    Pin,
    Opened,
    Refresh,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

// ═══════════════════════════════════════
// MERGED VIEW
// ═══════════════════════════════════════

/// Merged project view - the single shape callers consume.
///
/// Precedence per field is Override > Metadata > ScanSnapshot > default.
/// Every field is resolved; there is no partially merged state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    pub id: String,
    pub name: String,
    pub path: String,
    pub pinned: bool,
    pub last_touched_at: Option<String>,

    // Computed, overridable
    pub status: ProjectStatus,
    pub health_score: u8,
    pub hygiene_score: u8,
    pub momentum_score: u8,
    pub purpose: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<String>,

    // Scan-derived, informational
    pub detected_tags: Vec<String>,
    pub description: Option<String>,
    pub last_scanned_at: Option<String>,

    // User metadata
    pub goal: Option<String>,
    pub audience: Option<String>,
    pub success_metrics: Option<String>,
    pub next_action: Option<String>,
    pub publish_target: Option<String>,
    pub evidence: Option<serde_json::Value>,
    pub outcomes: Option<serde_json::Value>,
}

// ═══════════════════════════════════════
// AUDIT TRAIL
// ═══════════════════════════════════════

/// One immutable audit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    pub id: i64,
    pub project_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub payload: Option<serde_json::Value>,
    pub created_at: String,
}

// ═══════════════════════════════════════
// REFRESH
// ═══════════════════════════════════════

/// Result of one completed refresh run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    pub scan_id: i64,
    pub run_id: String,
    pub scanned_at: String,
    /// Projects that were scanned and persisted successfully
    pub project_count: usize,
    /// Projects discovered but not scanned (extraction failed)
    pub failed_count: usize,
    pub discovered_count: usize,
    /// Subtrees skipped during discovery (unreadable, loops)
    pub skipped_count: usize,
    pub duration_ms: u64,
}
