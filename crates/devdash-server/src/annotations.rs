// crates/devdash-server/src/annotations.rs
// Boundary validation for user-authored override and metadata patches
//
// A patch names only the fields it changes: an absent key leaves the stored
// value alone, `null` clears it. Validation happens before any write.

use crate::db::ColumnValue;
use crate::error::{DevdashError, Result};
use devdash_types::ProjectStatus;
use serde_json::{Map, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    /// Free text
    Text,
    /// Opaque structured blob: any JSON value, or a string holding JSON
    Json,
    /// Array of strings, or a string holding one
    Tags,
    /// A known project status name
    Status,
}

struct PatchField {
    key: &'static str,
    column: &'static str,
    kind: FieldKind,
}

const OVERRIDE_FIELDS: &[PatchField] = &[
    PatchField { key: "statusOverride", column: "status_override", kind: FieldKind::Status },
    PatchField { key: "purposeOverride", column: "purpose_override", kind: FieldKind::Text },
    PatchField { key: "notesOverride", column: "notes_override", kind: FieldKind::Text },
    PatchField { key: "tagsOverride", column: "tags_override", kind: FieldKind::Tags },
];

const METADATA_FIELDS: &[PatchField] = &[
    PatchField { key: "goal", column: "goal", kind: FieldKind::Text },
    PatchField { key: "audience", column: "audience", kind: FieldKind::Text },
    PatchField { key: "successMetrics", column: "success_metrics", kind: FieldKind::Text },
    PatchField { key: "nextAction", column: "next_action", kind: FieldKind::Text },
    PatchField { key: "publishTarget", column: "publish_target", kind: FieldKind::Text },
    PatchField { key: "evidenceJson", column: "evidence_json", kind: FieldKind::Json },
    PatchField { key: "outcomesJson", column: "outcomes_json", kind: FieldKind::Json },
];

fn invalid(message: String) -> DevdashError {
    DevdashError::InvalidInput(message)
}

/// Convert one caller value into its stored column text
fn coerce(field: &PatchField, value: &Value) -> Result<Option<String>> {
    if value.is_null() {
        return Ok(None);
    }
    let key = field.key;
    let stored = match field.kind {
        FieldKind::Text => value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("field \"{key}\" must be a string or null")))?,
        FieldKind::Json => match value {
            Value::String(raw) => {
                serde_json::from_str::<Value>(raw)
                    .map_err(|e| invalid(format!("field \"{key}\" is not valid JSON: {e}")))?;
                raw.clone()
            }
            other => other.to_string(),
        },
        FieldKind::Tags => {
            let tags: Vec<String> = match value {
                Value::String(raw) => serde_json::from_str(raw),
                other => serde_json::from_value(other.clone()),
            }
            .map_err(|_| invalid(format!("field \"{key}\" must be an array of strings")))?;
            serde_json::to_string(&tags)?
        }
        FieldKind::Status => {
            let raw = value
                .as_str()
                .ok_or_else(|| invalid(format!("field \"{key}\" must be a string or null")))?;
            ProjectStatus::from_str(raw)
                .map_err(|_| invalid(format!("field \"{key}\": unknown status \"{raw}\"")))?
                .as_str()
                .to_string()
        }
    };
    Ok(Some(stored))
}

/// Validated set of column writes plus the audit payload describing them
#[derive(Debug, Clone, PartialEq)]
struct Patch {
    columns: Vec<ColumnValue>,
    payload: Value,
}

fn parse_patch(body: &Value, fields: &[PatchField]) -> Result<Patch> {
    let object = body
        .as_object()
        .ok_or_else(|| invalid("patch body must be a JSON object".to_string()))?;

    let mut columns = Vec::new();
    let mut payload = Map::new();
    for field in fields {
        let Some(value) = object.get(field.key) else {
            continue;
        };
        let stored = coerce(field, value)?;
        payload.insert(
            field.key.to_string(),
            stored.clone().map_or(Value::Null, Value::String),
        );
        columns.push((field.column, stored));
    }

    if columns.is_empty() {
        let allowed: Vec<&str> = fields.iter().map(|f| f.key).collect();
        return Err(invalid(format!(
            "no valid fields; allowed: {}",
            allowed.join(", ")
        )));
    }
    Ok(Patch {
        columns,
        payload: Value::Object(payload),
    })
}

/// Changes to `statusOverride`, `purposeOverride`, `notesOverride`, `tagsOverride`
#[derive(Debug, Clone, PartialEq)]
pub struct OverridePatch(Patch);

impl OverridePatch {
    pub fn from_json(body: &Value) -> Result<Self> {
        parse_patch(body, OVERRIDE_FIELDS).map(Self)
    }

    pub fn columns(&self) -> &[ColumnValue] {
        &self.0.columns
    }

    /// Accepted fields as stored, for the activity record
    pub fn payload(&self) -> &Value {
        &self.0.payload
    }
}

/// Changes to the user metadata fields
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataPatch(Patch);

impl MetadataPatch {
    pub fn from_json(body: &Value) -> Result<Self> {
        parse_patch(body, METADATA_FIELDS).map(Self)
    }

    pub fn columns(&self) -> &[ColumnValue] {
        &self.0.columns
    }

    pub fn payload(&self) -> &Value {
        &self.0.payload
    }
}
