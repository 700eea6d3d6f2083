//! Tool registry: definitions, dispatch, and shared argument plumbing.
//!
//! Every tool takes the acting user as an explicit `user_id` argument.
//! Mutating tools pass through the authorization gate before touching the
//! core; reads are scoped so that records outside the actor's visible
//! scope are indistinguishable from absent ones.

mod changes;
mod format;
mod projects;
mod scopes;
mod tasks;

use serde_json::{Value, json};

use cadence_core::error::CoreError;
use cadence_core::model::UserId;

use crate::McpServer;

/// A failed tool call, rendered as an MCP error content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolFailure {
    pub message: String,
}

impl ToolFailure {
    pub(crate) fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<CoreError> for ToolFailure {
    fn from(err: CoreError) -> Self {
        Self::new(format!("[{}] {err}", err.code()))
    }
}

/// Tool definitions advertised by `tools/list`.
#[must_use]
pub fn tool_definitions() -> Vec<Value> {
    let mut defs = Vec::new();
    defs.extend(tasks::definitions());
    defs.extend(scopes::definitions());
    defs.extend(projects::definitions());
    defs.extend(changes::definitions());
    defs
}

/// Dispatch a `tools/call` to its handler.
///
/// # Errors
///
/// Returns a [`ToolFailure`] for unknown tools, bad arguments, and every
/// core error, with the stable error code in the message.
pub fn dispatch(server: &mut McpServer, name: &str, args: &Value) -> Result<String, ToolFailure> {
    match name {
        "get_task" => tasks::get_task(server, args),
        "list_tasks" => tasks::list_tasks(server, args),
        "create_task" => tasks::create_task(server, args),
        "update_task" => tasks::update_task(server, args),
        "assign_task" => tasks::assign_task(server, args),
        "transition_task_state" => tasks::transition_task_state(server, args),
        "get_scope" => scopes::get_scope(server, args),
        "list_scopes" => scopes::list_scopes(server, args),
        "create_scope" => scopes::create_scope(server, args),
        "update_scope" => scopes::update_scope(server, args),
        "get_project" => projects::get_project(server, args),
        "list_projects" => projects::list_projects(server, args),
        "list_user_changes" => changes::list_user_changes(server, args),
        other => Err(ToolFailure::new(format!("Unknown tool: {other}"))),
    }
}

/// Shared schema fragment for the required acting-user argument.
pub(crate) fn user_id_property() -> Value {
    json!({
        "type": "integer",
        "description": "ID of the user performing the call (the acting identity; required)",
    })
}

pub(crate) fn actor(args: &Value) -> Result<UserId, ToolFailure> {
    require_i64(args, "user_id").map(UserId)
}

pub(crate) fn require_i64(args: &Value, key: &str) -> Result<i64, ToolFailure> {
    opt_i64(args, key)?.ok_or_else(|| ToolFailure::new(format!("Missing required argument: {key}")))
}

pub(crate) fn opt_i64(args: &Value, key: &str) -> Result<Option<i64>, ToolFailure> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| ToolFailure::new(format!("Argument {key} must be an integer"))),
        Some(_) => Err(ToolFailure::new(format!(
            "Argument {key} must be an integer"
        ))),
    }
}

pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, ToolFailure> {
    opt_str(args, key)?.ok_or_else(|| ToolFailure::new(format!("Missing required argument: {key}")))
}

pub(crate) fn opt_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>, ToolFailure> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ToolFailure::new(format!("Argument {key} must be a string"))),
    }
}

pub(crate) fn opt_bool(args: &Value, key: &str) -> Result<Option<bool>, ToolFailure> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(ToolFailure::new(format!("Argument {key} must be a boolean"))),
    }
}

/// Whether `key` is present at all (including explicit `null`, which means
/// "clear the field" on update tools).
pub(crate) fn has_key(args: &Value, key: &str) -> bool {
    args.get(key).is_some()
}

#[cfg(test)]
mod tests {
    use super::{ToolFailure, opt_i64, require_i64, require_str};
    use cadence_core::error::CoreError;
    use serde_json::json;

    #[test]
    fn argument_helpers_validate_types() {
        let args = json!({"task_id": 4, "state": "done", "flag": true});
        assert_eq!(require_i64(&args, "task_id").expect("int"), 4);
        assert_eq!(require_str(&args, "state").expect("str"), "done");
        assert!(require_i64(&args, "state").is_err());
        assert!(require_i64(&args, "missing").is_err());
        assert_eq!(opt_i64(&args, "missing").expect("opt"), None);
        assert_eq!(opt_i64(&json!({"x": null}), "x").expect("opt"), None);
    }

    #[test]
    fn core_errors_carry_their_code() {
        let failure = ToolFailure::from(CoreError::InvalidTimeRange);
        assert!(failure.message.starts_with("[E4001]"));
        assert!(failure.message.contains("start_time"));
    }
}
