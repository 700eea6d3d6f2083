//! Task tools: CRUD, assignment, and workflow transitions.

use serde_json::{Value, json};
use std::str::FromStr;

use cadence_core::auth::{Action, Target};
use cadence_core::error::CoreError;
use cadence_core::machine;
use cadence_core::model::{NewTask, ProjectId, ScopeId, Task, TaskId, TaskPatch, TaskState, UserId};
use cadence_core::store::tasks::{self, TaskFilter};

use super::{
    ToolFailure, actor, format, has_key, opt_bool, opt_i64, opt_str, require_i64, require_str,
    user_id_property,
};
use crate::McpServer;

pub(crate) fn definitions() -> Vec<Value> {
    vec![
        json!({
            "name": "get_task",
            "description": "Get full details for a task, including its state history and allowed transitions",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "task_id": { "type": "integer", "description": "ID of the task" },
                },
                "required": ["user_id", "task_id"],
            },
        }),
        json!({
            "name": "list_tasks",
            "description": "List tasks visible to the acting user, with optional filters",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "project_id": { "type": "integer", "description": "Filter by project" },
                    "scope_id": { "type": "integer", "description": "Filter by scope" },
                    "responsible_user_id": { "type": "integer", "description": "Filter by assignee" },
                    "state": { "type": "string", "description": "Filter by state (new, in_progress, in_review, done, blocked)" },
                },
                "required": ["user_id"],
            },
        }),
        json!({
            "name": "create_task",
            "description": "Create a new task",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "name": { "type": "string", "description": "Name of the task" },
                    "description": { "type": "string", "description": "Description of the task" },
                    "project_id": { "type": "integer", "description": "Project ID for the task" },
                    "scope_id": { "type": "integer", "description": "Scope ID for the task" },
                    "responsible_user_id": { "type": "integer", "description": "ID of the user responsible for the task" },
                    "due_at": { "type": "string", "description": "Due date in ISO 8601 format (e.g., '2024-12-31T23:59:59Z')" },
                    "nice_to_have": { "type": "boolean", "description": "Whether the task is nice to have (not required)" },
                    "unassisted_estimate": { "type": "integer", "description": "Unassisted time estimate in hours" },
                    "ai_assisted_estimate": { "type": "integer", "description": "AI-assisted time estimate in hours" },
                    "actual_manhours": { "type": "integer", "description": "Actual time spent in hours" },
                },
                "required": ["user_id", "name"],
            },
        }),
        json!({
            "name": "update_task",
            "description": "Update task fields; pass null to clear an optional field",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "task_id": { "type": "integer", "description": "ID of the task to update" },
                    "name": { "type": "string" },
                    "description": { "type": "string" },
                    "project_id": { "type": "integer" },
                    "scope_id": { "type": "integer" },
                    "responsible_user_id": { "type": "integer" },
                    "due_at": { "type": "string", "description": "ISO 8601 datetime" },
                    "nice_to_have": { "type": "boolean" },
                    "unassisted_estimate": { "type": "integer" },
                    "ai_assisted_estimate": { "type": "integer" },
                    "actual_manhours": { "type": "integer" },
                },
                "required": ["user_id", "task_id"],
            },
        }),
        json!({
            "name": "assign_task",
            "description": "Assign a task to a user",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "task_id": { "type": "integer", "description": "ID of the task" },
                    "responsible_user_id": { "type": "integer", "description": "ID of the user to assign" },
                },
                "required": ["user_id", "task_id", "responsible_user_id"],
            },
        }),
        json!({
            "name": "transition_task_state",
            "description": "Transition a task to a new state using the state machine",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "user_id": user_id_property(),
                    "task_id": { "type": "integer", "description": "ID of the task to transition" },
                    "state": { "type": "string", "description": "Target state (new, in_progress, in_review, done, blocked)" },
                },
                "required": ["user_id", "task_id", "state"],
            },
        }),
    ]
}

fn task_not_found(id: TaskId) -> ToolFailure {
    CoreError::NotFound {
        kind: "Task",
        id: id.0,
    }
    .into()
}

/// Fetch a task the actor may see. Records outside the visible scope are
/// reported exactly like absent ones.
fn visible_task(server: &McpServer, actor: UserId, id: TaskId) -> Result<Task, ToolFailure> {
    let task = tasks::get(&server.conn, id)?;
    if task.deleted() {
        return Err(task_not_found(id));
    }
    let visible = server
        .gate
        .authorized(&server.conn, actor, Action::Show, &Target::Task(&task))?;
    if visible {
        Ok(task)
    } else {
        Err(task_not_found(id))
    }
}

fn authorize_update(server: &McpServer, actor: UserId, task: &Task) -> Result<(), ToolFailure> {
    let allowed = server
        .gate
        .authorized(&server.conn, actor, Action::Update, &Target::Task(task))?;
    if allowed {
        Ok(())
    } else {
        Err(CoreError::Unauthorized(format!("Not authorized to update Task {}", task.id)).into())
    }
}

fn parse_state(raw: &str) -> Result<TaskState, ToolFailure> {
    TaskState::from_str(raw).map_err(|err| ToolFailure::new(err.to_string()))
}

fn parse_due_at(raw: &str) -> Result<i64, ToolFailure> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp_micros())
        .map_err(|_| ToolFailure::new(format!("Invalid ISO 8601 datetime: '{raw}'")))
}

pub(crate) fn get_task(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let task = visible_task(server, actor, TaskId(require_i64(args, "task_id")?))?;
    Ok(format::format_task_details(&server.conn, &task)?)
}

pub(crate) fn list_tasks(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let filter = TaskFilter {
        project_id: opt_i64(args, "project_id")?,
        scope_id: opt_i64(args, "scope_id")?,
        responsible_user_id: opt_i64(args, "responsible_user_id")?,
        state: opt_str(args, "state")?.map(parse_state).transpose()?,
        include_deleted: false,
    };

    let mut visible = Vec::new();
    for task in tasks::list(&server.conn, &filter)? {
        if server
            .gate
            .authorized(&server.conn, actor, Action::Show, &Target::Task(&task))?
        {
            visible.push(task);
        }
    }
    Ok(format::format_tasks(&server.conn, &visible)?)
}

pub(crate) fn create_task(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let new = NewTask {
        name: require_str(args, "name")?.to_string(),
        description: opt_str(args, "description")?.map(ToString::to_string),
        project_id: opt_i64(args, "project_id")?.map(ProjectId),
        scope_id: opt_i64(args, "scope_id")?.map(ScopeId),
        responsible_user_id: opt_i64(args, "responsible_user_id")?.map(UserId),
        nice_to_have: opt_bool(args, "nice_to_have")?.unwrap_or(false),
        due_at_us: opt_str(args, "due_at")?.map(parse_due_at).transpose()?,
        unassisted_estimate: opt_i64(args, "unassisted_estimate")?,
        ai_assisted_estimate: opt_i64(args, "ai_assisted_estimate")?,
        actual_manhours: opt_i64(args, "actual_manhours")?,
    };

    if let Some(project_id) = new.project_id {
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
    }

    let task = tasks::create(&mut server.conn, &new, Some(actor))?;
    Ok(format!(
        "Task created successfully!\n\n{}",
        format::format_task_details(&server.conn, &task)?
    ))
}

fn build_patch(args: &Value) -> Result<TaskPatch, ToolFailure> {
    let mut patch = TaskPatch::default();
    if has_key(args, "name") {
        patch.name = Some(require_str(args, "name")?.to_string());
    }
    if has_key(args, "description") {
        patch.description = Some(opt_str(args, "description")?.map(ToString::to_string));
    }
    if has_key(args, "project_id") {
        patch.project_id = Some(opt_i64(args, "project_id")?.map(ProjectId));
    }
    if has_key(args, "scope_id") {
        patch.scope_id = Some(opt_i64(args, "scope_id")?.map(ScopeId));
    }
    if has_key(args, "responsible_user_id") {
        patch.responsible_user_id = Some(opt_i64(args, "responsible_user_id")?.map(UserId));
    }
    if has_key(args, "nice_to_have") {
        patch.nice_to_have = opt_bool(args, "nice_to_have")?;
    }
    if has_key(args, "due_at") {
        patch.due_at_us = Some(opt_str(args, "due_at")?.map(parse_due_at).transpose()?);
    }
    if has_key(args, "unassisted_estimate") {
        patch.unassisted_estimate = Some(opt_i64(args, "unassisted_estimate")?);
    }
    if has_key(args, "ai_assisted_estimate") {
        patch.ai_assisted_estimate = Some(opt_i64(args, "ai_assisted_estimate")?);
    }
    if has_key(args, "actual_manhours") {
        patch.actual_manhours = Some(opt_i64(args, "actual_manhours")?);
    }
    Ok(patch)
}

pub(crate) fn update_task(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let task_id = TaskId(require_i64(args, "task_id")?);
    let task = visible_task(server, actor, task_id)?;
    authorize_update(server, actor, &task)?;

    let patch = build_patch(args)?;
    let updated = tasks::update(&mut server.conn, task_id, &patch, Some(actor))?;
    Ok(format!(
        "Task updated successfully!\n\n{}",
        format::format_task_details(&server.conn, &updated)?
    ))
}

pub(crate) fn assign_task(server: &mut McpServer, args: &Value) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let task_id = TaskId(require_i64(args, "task_id")?);
    let assignee = UserId(require_i64(args, "responsible_user_id")?);
    let task = visible_task(server, actor, task_id)?;
    authorize_update(server, actor, &task)?;

    let patch = TaskPatch {
        responsible_user_id: Some(Some(assignee)),
        ..TaskPatch::default()
    };
    let updated = tasks::update(&mut server.conn, task_id, &patch, Some(actor))?;
    Ok(format!(
        "Task assigned successfully!\n\n{}",
        format::format_task_details(&server.conn, &updated)?
    ))
}

pub(crate) fn transition_task_state(
    server: &mut McpServer,
    args: &Value,
) -> Result<String, ToolFailure> {
    let actor = actor(args)?;
    let task_id = TaskId(require_i64(args, "task_id")?);
    let target = parse_state(require_str(args, "state")?)?;
    let task = visible_task(server, actor, task_id)?;
    authorize_update(server, actor, &task)?;

    machine::task::transition_task(
        &mut server.conn,
        task_id,
        target,
        json!({"user_id": actor.0}),
        server.sink.as_ref(),
    )?;

    let task = tasks::get(&server.conn, task_id)?;
    Ok(format!(
        "Task state transitioned successfully to {target}!\n\n{}",
        format::format_task_details(&server.conn, &task)?
    ))
}
