//! General audit log, decoupled from the transition log.
//!
//! One `versions` row per create/update/destroy on any tracked model.
//! Rows are immutable once written; application logic never updates or
//! deletes them. `object_changes` is a structured diff keyed by field name,
//! each field carrying a list of primitive-level edits.

pub mod query;
pub mod render;

use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::CoreResult;
use crate::model::{UserId, VersionId};

/// The audited event kinds. Soft delete and restore are recorded as
/// `destroy` and `update` respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionEvent {
    Create,
    Update,
    Destroy,
}

impl VersionEvent {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Destroy => "destroy",
        }
    }
}

/// One primitive-level edit inside a field diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FieldEdit {
    Modified {
        path: Vec<String>,
        old: Value,
        new: Value,
    },
    Added {
        path: Vec<String>,
        value: Value,
    },
    Removed {
        path: Vec<String>,
        value: Value,
    },
}

/// Structured diff: field name → primitive edits.
pub type ObjectChanges = BTreeMap<String, Vec<FieldEdit>>;

/// A stored audit row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Version {
    pub id: VersionId,
    pub item_type: String,
    pub item_id: i64,
    pub event: String,
    pub object_changes: Option<ObjectChanges>,
    pub whodunnit: Option<String>,
    pub created_at_us: i64,
}

/// Append a version row inside the caller's transaction.
///
/// # Errors
///
/// Returns an error if serialization or the insert fails.
pub fn record(
    tx: &Connection,
    item_type: &str,
    item_id: i64,
    event: VersionEvent,
    changes: Option<&ObjectChanges>,
    whodunnit: Option<UserId>,
    now_us: i64,
) -> CoreResult<VersionId> {
    let changes_json = changes.map(serde_json::to_string).transpose()?;
    let whodunnit = whodunnit.map(|id| id.to_string());
    tx.execute(
        "INSERT INTO versions (item_type, item_id, event, object_changes, whodunnit, created_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            item_type,
            item_id,
            event.as_str(),
            changes_json,
            whodunnit,
            now_us
        ],
    )?;
    Ok(VersionId(tx.last_insert_rowid()))
}

/// Diff two JSON images of a record, field by field.
///
/// Scalar fields produce one `Modified` edit with an empty path; nested
/// objects and arrays recurse, accumulating path segments, so each edit
/// always points at a primitive value. Unchanged fields are omitted.
#[must_use]
pub fn diff_objects(old: &Map<String, Value>, new: &Map<String, Value>) -> ObjectChanges {
    let mut changes = ObjectChanges::new();

    for (field, old_value) in old {
        match new.get(field) {
            Some(new_value) if new_value == old_value => {}
            Some(new_value) => {
                let mut edits = Vec::new();
                diff_values(&mut edits, &mut Vec::new(), old_value, new_value);
                changes.insert(field.clone(), edits);
            }
            None => {
                changes.insert(
                    field.clone(),
                    vec![FieldEdit::Removed {
                        path: Vec::new(),
                        value: old_value.clone(),
                    }],
                );
            }
        }
    }

    for (field, new_value) in new {
        if !old.contains_key(field) {
            changes.insert(
                field.clone(),
                vec![FieldEdit::Added {
                    path: Vec::new(),
                    value: new_value.clone(),
                }],
            );
        }
    }

    changes
}

fn diff_values(edits: &mut Vec<FieldEdit>, path: &mut Vec<String>, old: &Value, new: &Value) {
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            for (key, old_child) in old_map {
                path.push(key.clone());
                match new_map.get(key) {
                    Some(new_child) if new_child == old_child => {}
                    Some(new_child) => diff_values(edits, path, old_child, new_child),
                    None => edits.push(FieldEdit::Removed {
                        path: path.clone(),
                        value: old_child.clone(),
                    }),
                }
                path.pop();
            }
            for (key, new_child) in new_map {
                if !old_map.contains_key(key) {
                    path.push(key.clone());
                    edits.push(FieldEdit::Added {
                        path: path.clone(),
                        value: new_child.clone(),
                    });
                    path.pop();
                }
            }
        }
        (Value::Array(old_items), Value::Array(new_items)) => {
            let shared = old_items.len().min(new_items.len());
            for index in 0..shared {
                if old_items[index] != new_items[index] {
                    path.push(index.to_string());
                    diff_values(edits, path, &old_items[index], &new_items[index]);
                    path.pop();
                }
            }
            for (index, value) in old_items.iter().enumerate().skip(shared) {
                path.push(index.to_string());
                edits.push(FieldEdit::Removed {
                    path: path.clone(),
                    value: value.clone(),
                });
                path.pop();
            }
            for (index, value) in new_items.iter().enumerate().skip(shared) {
                path.push(index.to_string());
                edits.push(FieldEdit::Added {
                    path: path.clone(),
                    value: value.clone(),
                });
                path.pop();
            }
        }
        _ => edits.push(FieldEdit::Modified {
            path: path.clone(),
            old: old.clone(),
            new: new.clone(),
        }),
    }
}

/// Convenience for the single-field diff recorded by state transitions.
#[must_use]
pub fn state_change(field: &str, old: &str, new: &str) -> ObjectChanges {
    let mut changes = ObjectChanges::new();
    changes.insert(
        field.to_string(),
        vec![FieldEdit::Modified {
            path: Vec::new(),
            old: Value::String(old.to_string()),
            new: Value::String(new.to_string()),
        }],
    );
    changes
}

pub(crate) fn row_to_version(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawVersion> {
    Ok(RawVersion {
        id: row.get(0)?,
        item_type: row.get(1)?,
        item_id: row.get(2)?,
        event: row.get(3)?,
        object_changes: row.get(4)?,
        whodunnit: row.get(5)?,
        created_at_us: row.get(6)?,
    })
}

pub(crate) struct RawVersion {
    pub id: i64,
    pub item_type: String,
    pub item_id: i64,
    pub event: String,
    pub object_changes: Option<String>,
    pub whodunnit: Option<String>,
    pub created_at_us: i64,
}

impl RawVersion {
    pub(crate) fn parse(self) -> CoreResult<Version> {
        let object_changes = self
            .object_changes
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;
        Ok(Version {
            id: VersionId(self.id),
            item_type: self.item_type,
            item_id: self.item_id,
            event: self.event,
            object_changes,
            whodunnit: self.whodunnit,
            created_at_us: self.created_at_us,
        })
    }
}
