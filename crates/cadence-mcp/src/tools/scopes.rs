//! Scope tools.

use serde_json::{Value, json};

use cadence_core::auth::{Action, Target};
use cadence_core::error::CoreError;
use cadence_core::model::{NewScope, ProjectId, Scope, ScopeId, UserId};
use cadence_core::store::scopes::{self, ScopePatch};

use super::{ToolFailure, actor, format, has_key, opt_i64, opt_str, require_i64, require_str, user_id_property};
use crate::McpServer;

pub(crate) fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_scope",
            "description": "Get details for a scope, including its completion percentage",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "scope_id": { "type": "integer", "description": "ID of the scope" },
                },
                "required": ["user_id", "scope_id"],
            },
        }),
        json!({
            "name": "list_scopes",
            "description": "List scopes visible to the acting user, optionally for one project",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "project_id": { "type": "integer", "description": "Filter by project" },
                },
                "required": ["user_id"],
            },
        }),
        json!({
            "name": "create_scope",
            "description": "Create a new scope in a project",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "project_id": { "type": "integer", "description": "Project the scope belongs to" },
                    "name": { "type": "string", "description": "Name of the scope" },
                    "description": { "type": "string", "description": "Description of the scope" },
                },
                "required": ["user_id", "project_id", "name"],
            },
        }),
        json!({
            "name": "update_scope",
            "description": "Update scope fields; pass null to clear the description",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "scope_id": { "type": "integer", "description": "ID of the scope to update" },
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                },
                "required": ["user_id", "scope_id"],
            },
        }),
    ]
}

fn scope_not_found(id: ScopeId) -> ToolFailure {
    CoreError::NotFound {
        kind: "Scope",
        id: id.0,
    }
    .into()
}

fn visible_scope(server: &McpServer, actor: UserId, id: ScopeId) -> Result<Scope, ToolFailure> {
    let scope = scopes::get(&server.conn, id)?;
    if scope.deleted() {
        return Err(scope_not_found(id));
    }
    let visible = server
        .gate
        .authorized(&server.conn, actor, Action::Show, &Target::Scope(&scope))?;
    if visible {
        Ok(scope)
    } else {
        Err(scope_not_found(id))
    }
}

pub(crate) fn get_scope(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let scope = visible_scope(server, actor, ScopeId(require_i64(args, "scope_id")?))?;
    Ok(format::format_scope_summary(&server.conn, &scope)?)
}

pub(crate) fn list_scopes(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let project_id = opt_i64(args, "project_id")?.map(ProjectId);

    let mut visible = Vec::new();
    for scope in scopes::list(&server.conn, project_id, false)? {
        if server
            .gate
            .authorized(&server.conn, actor, Action::Show, &Target::Scope(&scope))?
        {
            visible.push(scope);
        }
    }
    Ok(format::format_scopes(&server.conn, &visible)?)
}

pub(crate) fn create_scope(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let project_id = ProjectId(require_i64(args, "project_id")?);

    let project = cadence_core::store::projects::get(&server.conn, project_id)?;
    let allowed = !project.deleted()
        && server.gate.authorized(
            &server.conn,
            actor,
            Action::Create,
            &Target::Project(&project),
        )?;
    if !allowed {
        return Err(CoreError::NotFound {
            kind: "Project",
            id: project_id.0,
        }
        .into());
    }

    let scope = scopes::create(
        &mut server.conn,
        &NewScope {
            project_id,
            name: require_str(args, "name")?.to_string(),
            description: opt_str(args, "description")?.map(ToString::to_string),
        },
        Some(actor),
    )?;
    Ok(format!(
        "Scope created successfully!\n\n{}",
        format::format_scope_summary(&server.conn, &scope)?
    ))
}

pub(crate) fn update_scope(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let scope_id = ScopeId(require_i64(args, "scope_id")?);
    let scope = visible_scope(server, actor, scope_id)?;

    let allowed = server
        .gate
        .authorized(&server.conn, actor, Action::Update, &Target::Scope(&scope))?;
    if !allowed {
        return Err(
            CoreError::Unauthorized(format!("Not authorized to update Scope {scope_id}")).into(),
        );
    }

    let mut patch = ScopePatch::default();
    if has_key(args, "name") {
        patch.name = Some(require_str(args, "name")?.to_string());
    }
    if has_key(args, "description") {
        patch.description = Some(opt_str(args, "description")?.map(ToString::to_string));
    }

    let updated = scopes::update(&mut server.conn, scope_id, &patch, Some(actor))?;
    Ok(format!(
        "Scope updated successfully!\n\n{}",
        format::format_scope_summary(&server.conn, &updated)?
    ))
}
