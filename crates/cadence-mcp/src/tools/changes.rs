//! Audit-trail tool: `list_user_changes`.

use serde_json::{Value, json};

use cadence_core::audit::query::{self, TimeWindow};
use cadence_core::audit::render;
use cadence_core::clock::now_us;
use cadence_core::model::TeamId;

use super::{ToolFailure, actor, opt_i64, opt_str, user_id_property};
use crate::McpServer;

const DEFAULT_LIMIT: usize = 100;
const DAY_US: i64 = 86_400_000_000;

pub(crate) fn definitions() -> Vec<Value> {
    vec![json!({
        "name": "list_user_changes",
        "description": "List changes from the audit log (Tasks, Scopes, Projects, Notes, Links, Attachments). \
                        Shows the acting user's changes by default. If team_id is specified, shows changes \
                        by all team members (the user must be associated with the team or its organization).",
        "inputSchema": {
            "type": "object",
            "properties": {
                "user_id": user_id_property(),
                "start_time": { "type": "string", "description": "Start datetime (ISO8601 format, e.g., '2025-11-03T00:00:00Z'). Defaults to 24 hours ago." },
                "end_time": { "type": "string", "description": "End datetime (ISO8601 format, e.g., '2025-11-04T00:00:00Z'). Defaults to now." },
                "team_id": { "type": "integer", "description": "Show changes by all team members on team-related items. Requires association with the team or its organization." },
                "limit": { "type": "integer", "description": "Maximum number of versions to return (default: 100)" },
            },
            "required": ["user_id"],
        },
    })]
}

fn parse_datetime(raw: Option<&str>) -> Result<Option<i64>, ToolFailure> {
    let Some(raw) = raw else { return Ok(None) };
    if raw.is_empty() {
        return Ok(None);
    }
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| Some(dt.timestamp_micros()))
        .map_err(|_| ToolFailure::new(format!("Invalid ISO 8601 datetime: '{raw}'")))
}

pub(crate) fn list_user_changes(
    server: &mut McpServer,
    args: &Value,
) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let now = now_us();

    let end_us = parse_datetime(opt_str(args, "end_time")?)?.unwrap_or(now);
    let start_us = parse_datetime(opt_str(args, "start_time")?)?.unwrap_or(end_us - DAY_US);
    let window = TimeWindow::new(start_us, end_us)?;

    let team = opt_i64(args, "team_id")?.map(TeamId);
    let limit = opt_i64(args, "limit")?
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(DEFAULT_LIMIT);

    let listing = query::list_changes(&server.conn, actor, window, team, limit)?;
    Ok(render::render_listing(&listing))
}
