//! Human-readable rendering of change listings.
//!
//! Output is plain text suitable for tool responses and terminal use:
//! a `Found N change(s) …` header, one block per change separated by
//! `---`, and diff lines of the form `Modified <path>: <old> → <new>`.
//! Long string values are elided past 100 characters; nested collections
//! are summarized rather than fully dumped.

use serde_json::Value;
use std::fmt::Write as _;

use super::query::{AuditScope, ChangeListing, ChangeRecord};
use super::{FieldEdit, ObjectChanges};

const VALUE_LIMIT: usize = 100;

/// Render the full listing, including the empty-but-successful case.
#[must_use]
pub fn render_listing(listing: &ChangeListing) -> String {
    let by = match &listing.scope {
        AuditScope::Personal(name) => format!("by {name}"),
        AuditScope::Team(name) => format!("by Team '{name}' members"),
    };
    let range = format!(
        "between {} and {}",
        format_timestamp(listing.window.start_us()),
        format_timestamp(listing.window.end_us())
    );

    if listing.records.is_empty() {
        return format!("No changes found {by} {range}.");
    }

    let mut out = format!(
        "Found {} change(s) {by} {range}:\n\n",
        listing.records.len()
    );
    for record in &listing.records {
        out.push_str(&render_record(record));
        out.push_str("\n---\n\n");
    }
    out
}

/// Render one change block.
#[must_use]
pub fn render_record(record: &ChangeRecord) -> String {
    let version = &record.version;
    let mut out = String::new();
    let _ = writeln!(out, "Timestamp: {}", format_timestamp(version.created_at_us));
    let _ = writeln!(out, "User: {}", record.actor_display);
    let _ = writeln!(out, "Action: {}", version.event);
    let _ = writeln!(out, "Item Type: {}", version.item_type);
    let _ = writeln!(out, "Item ID: {}", version.item_id);
    if let Some(context) = &record.parent_context {
        let _ = writeln!(out, "{context}");
    }
    if let Some(changes) = &version.object_changes {
        if !changes.is_empty() {
            out.push_str("\nChanges:\n");
            out.push_str(&render_changes(changes));
        }
    }
    out
}

/// Render a structured diff, one heading per field.
#[must_use]
pub fn render_changes(changes: &ObjectChanges) -> String {
    let mut out = String::new();
    for (field, edits) in changes {
        let _ = writeln!(out, "  {field}:");
        for edit in edits {
            out.push_str(&render_edit(edit, 4));
        }
    }
    out
}

fn render_edit(edit: &FieldEdit, indent: usize) -> String {
    let pad = " ".repeat(indent);
    match edit {
        FieldEdit::Modified { path, old, new } => format!(
            "{pad}Modified {}: {} → {}\n",
            format_path(path),
            format_value(old),
            format_value(new)
        ),
        FieldEdit::Added { path, value } => {
            format!("{pad}Added {}: {}\n", format_path(path), format_value(value))
        }
        FieldEdit::Removed { path, value } => {
            format!(
                "{pad}Removed {}: {}\n",
                format_path(path),
                format_value(value)
            )
        }
    }
}

fn format_path(path: &[String]) -> String {
    if path.is_empty() {
        "value".to_string()
    } else {
        path.iter()
            .map(|segment| format!("[{segment}]"))
            .collect::<String>()
    }
}

/// Render a primitive value for diff output. Strings longer than 100
/// characters are elided; nested collections summarize as `{...}`/`[...]`
/// when their compact form would overflow.
#[must_use]
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "nil".to_string(),
        Value::String(s) => {
            if s.chars().count() > VALUE_LIMIT {
                let clipped: String = s.chars().take(VALUE_LIMIT - 3).collect();
                format!("\"{clipped}...\"")
            } else {
                format!("\"{s}\"")
            }
        }
        Value::Object(_) => {
            let compact = value.to_string();
            if compact.len() > VALUE_LIMIT {
                "{...}".to_string()
            } else {
                compact
            }
        }
        Value::Array(_) => {
            let compact = value.to_string();
            if compact.len() > VALUE_LIMIT {
                "[...]".to_string()
            } else {
                compact
            }
        }
        other => other.to_string(),
    }
}

fn format_timestamp(us: i64) -> String {
    chrono::DateTime::from_timestamp_micros(us).map_or_else(
        || format!("{us}us"),
        |dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::{format_value, render_listing, render_record};
    use crate::audit::query::{AuditScope, ChangeListing, ChangeRecord, TimeWindow};
    use crate::audit::{FieldEdit, ObjectChanges, Version};
    use crate::model::VersionId;
    use serde_json::json;

    fn sample_record() -> ChangeRecord {
        let mut changes = ObjectChanges::new();
        changes.insert(
            "state".to_string(),
            vec![FieldEdit::Modified {
                path: vec![],
                old: json!("new"),
                new: json!("in_progress"),
            }],
        );
        ChangeRecord {
            version: Version {
                id: VersionId(1),
                item_type: "Task".to_string(),
                item_id: 42,
                event: "update".to_string(),
                object_changes: Some(changes),
                whodunnit: Some("7".to_string()),
                created_at_us: 1_700_000_000_000_000,
            },
            actor_display: "Rosa (rosa@example.com)".to_string(),
            parent_context: None,
        }
    }

    #[test]
    fn record_renders_header_and_diff() {
        let rendered = render_record(&sample_record());
        assert!(rendered.contains("User: Rosa (rosa@example.com)"));
        assert!(rendered.contains("Action: update"));
        assert!(rendered.contains("Item Type: Task"));
        assert!(rendered.contains("Item ID: 42"));
        assert!(rendered.contains("Modified value: \"new\" → \"in_progress\""));
    }

    #[test]
    fn empty_listing_is_a_message_not_an_error() {
        let listing = ChangeListing {
            scope: AuditScope::Personal("Rosa (rosa@example.com)".to_string()),
            window: TimeWindow::new(0, 1_000_000).expect("window"),
            records: vec![],
        };
        let rendered = render_listing(&listing);
        assert!(rendered.starts_with("No changes found by Rosa"));
    }

    #[test]
    fn team_listing_header_names_the_team() {
        let listing = ChangeListing {
            scope: AuditScope::Team("Platform".to_string()),
            window: TimeWindow::new(0, 1_000_000).expect("window"),
            records: vec![sample_record()],
        };
        let rendered = render_listing(&listing);
        assert!(rendered.starts_with("Found 1 change(s) by Team 'Platform' members"));
        assert!(rendered.contains("\n---\n"));
    }

    #[test]
    fn long_strings_are_elided() {
        let long = "x".repeat(150);
        let rendered = format_value(&json!(long));
        assert!(rendered.ends_with("...\""));
        assert!(rendered.len() < 110);
    }

    #[test]
    fn nested_collections_summarize_when_large() {
        let big: Vec<String> = (0..50).map(|i| format!("entry-{i}")).collect();
        assert_eq!(format_value(&json!(big)), "[...]");
        assert_eq!(format_value(&json!({"a": 1})), "{\"a\":1}");
        assert_eq!(format_value(&json!(null)), "nil");
        assert_eq!(format_value(&json!(12)), "12");
    }
}
