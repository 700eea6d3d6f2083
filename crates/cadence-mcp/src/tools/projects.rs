//! Project tools.

use serde_json::{Value, json};

use cadence_core::auth::{Action, Target};
use cadence_core::error::CoreError;
use cadence_core::model::{ProjectId, TeamId};
use cadence_core::store::projects;

use super::{ToolFailure, actor, format, opt_i64, require_i64, user_id_property};
use crate::McpServer;

pub(crate) fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_project",
            "description": "Get details for a project, including its risk state and estimate rollups",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "project_id": { "type": "integer", "description": "ID of the project" },
                },
                "required": ["user_id", "project_id"],
            },
        }),
        json!({
            "name": "list_projects",
            "description": "List projects visible to the acting user, optionally for one team",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "team_id": { "type": "integer", "description": "Filter by team" },
                },
                "required": ["user_id"],
            },
        }),
    ]
}

pub(crate) fn get_project(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let project_id = ProjectId(require_i64(args, "project_id")?);

    let project = projects::get(&server.conn, project_id)?;
    let visible = !project.deleted()
        && server.gate.authorized(
            &server.conn,
            actor,
            Action::Show,
            &Target::Project(&project),
        )?;
    if !visible {
        return Err(CoreError::NotFound {
            kind: "Project",
            id: project_id.0,
        }
        .into());
    }

    Ok(format::format_project_summary(&server.conn, &project)?)
}

pub(crate) fn list_projects(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let team_id = opt_i64(args, "team_id")?.map(TeamId);

    let visible_ids = server.gate.visible_project_ids(&server.conn, actor)?;
    let mut visible = Vec::new();
    for project in projects::list(&server.conn, team_id, false)? {
        if visible_ids.contains(&project.id) {
            visible.push(project);
        }
    }
    Ok(format::format_projects(&server.conn, &visible)?)
}
