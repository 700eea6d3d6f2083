//! Task persistence: CRUD, soft delete/restore, and the explicit
//! estimate-rollup reconciliation each mutation carries.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::{Map, Value};

use crate::audit::{self, VersionEvent};
use crate::clock::now_us;
use crate::error::{CoreError, CoreResult};
use crate::estimate;
use crate::model::{NewTask, Task, TaskId, TaskPatch, TaskState, UserId};
use crate::transition::{self, TASK_TRANSITIONS};

/// Filters for task listings. `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<i64>,
    pub scope_id: Option<i64>,
    pub responsible_user_id: Option<i64>,
    pub state: Option<TaskState>,
    pub include_deleted: bool,
}

const SELECT_COLUMNS: &str = "id, project_id, scope_id, responsible_user_id, name, description,
    state, nice_to_have, due_at_us, unassisted_estimate, ai_assisted_estimate,
    actual_manhours, deleted_at_us, created_at_us, updated_at_us";

/// Create a task, record its audit version, and reconcile parent rollups.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn create(conn: &mut Connection, new: &NewTask, actor: Option<UserId>) -> CoreResult<Task> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO tasks (project_id, scope_id, responsible_user_id, name, description,
                            nice_to_have, due_at_us, unassisted_estimate, ai_assisted_estimate,
                            actual_manhours, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            new.project_id.map(|id| id.0),
            new.scope_id.map(|id| id.0),
            new.responsible_user_id.map(|id| id.0),
            new.name,
            new.description,
            i64::from(new.nice_to_have),
            new.due_at_us,
            new.unassisted_estimate,
            new.ai_assisted_estimate,
            new.actual_manhours,
            now,
        ],
    )?;
    let id = TaskId(tx.last_insert_rowid());
    let task = get(&tx, id)?;

    let changes = audit::diff_objects(&Map::new(), &image(&task));
    audit::record(&tx, "Task", id.0, VersionEvent::Create, Some(&changes), actor, now)?;
    estimate::reconcile_task_parents(&tx, None, None, task.scope_id, task.project_id)?;

    tx.commit()?;
    Ok(task)
}

/// Fetch a task by id, soft-deleted rows included.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn get(conn: &Connection, id: TaskId) -> CoreResult<Task> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM tasks WHERE id = ?1");
    conn.query_row(&sql, params![id.0], row_to_task)
        .optional()?
        .ok_or(CoreError::NotFound {
            kind: "Task",
            id: id.0,
        })
}

/// List tasks matching the filter, newest update first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(conn: &Connection, filter: &TaskFilter) -> CoreResult<Vec<Task>> {
    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM tasks WHERE 1 = 1");
    let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !filter.include_deleted {
        sql.push_str(" AND deleted_at_us IS NULL");
    }
    if let Some(project_id) = filter.project_id {
        args.push(Box::new(project_id));
        sql.push_str(&format!(" AND project_id = ?{}", args.len()));
    }
    if let Some(scope_id) = filter.scope_id {
        args.push(Box::new(scope_id));
        sql.push_str(&format!(" AND scope_id = ?{}", args.len()));
    }
    if let Some(user_id) = filter.responsible_user_id {
        args.push(Box::new(user_id));
        sql.push_str(&format!(" AND responsible_user_id = ?{}", args.len()));
    }
    if let Some(state) = filter.state {
        args.push(Box::new(state.to_string()));
        sql.push_str(&format!(" AND state = ?{}", args.len()));
    }
    sql.push_str(" ORDER BY updated_at_us DESC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args.iter().map(AsRef::as_ref)), row_to_task)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Apply a partial update, record the field diff, and reconcile rollups on
/// every touched parent (old and new when the task is reassigned).
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve, or an
/// error if any statement fails.
pub fn update(
    conn: &mut Connection,
    id: TaskId,
    patch: &TaskPatch,
    actor: Option<UserId>,
) -> CoreResult<Task> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let old = get(&tx, id)?;
    let mut next = old.clone();
    apply_patch(&mut next, patch);
    next.updated_at_us = now;

    tx.execute(
        "UPDATE tasks SET project_id = ?1, scope_id = ?2, responsible_user_id = ?3,
             name = ?4, description = ?5, nice_to_have = ?6, due_at_us = ?7,
             unassisted_estimate = ?8, ai_assisted_estimate = ?9, actual_manhours = ?10,
             updated_at_us = ?11
         WHERE id = ?12",
        params![
            next.project_id.map(|p| p.0),
            next.scope_id.map(|s| s.0),
            next.responsible_user_id.map(|u| u.0),
            next.name,
            next.description,
            i64::from(next.nice_to_have),
            next.due_at_us,
            next.unassisted_estimate,
            next.ai_assisted_estimate,
            next.actual_manhours,
            now,
            id.0,
        ],
    )?;

    let changes = audit::diff_objects(&image(&old), &image(&next));
    if !changes.is_empty() {
        audit::record(&tx, "Task", id.0, VersionEvent::Update, Some(&changes), actor, now)?;
    }
    estimate::reconcile_task_parents(
        &tx,
        old.scope_id,
        old.project_id,
        next.scope_id,
        next.project_id,
    )?;

    tx.commit()?;
    Ok(next)
}

/// Soft-delete the task and reconcile parent rollups.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn destroy(conn: &mut Connection, id: TaskId, actor: Option<UserId>) -> CoreResult<Task> {
    set_deleted(conn, id, actor, true)
}

/// Restore a soft-deleted task and reconcile parent rollups.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn restore(conn: &mut Connection, id: TaskId, actor: Option<UserId>) -> CoreResult<Task> {
    set_deleted(conn, id, actor, false)
}

fn set_deleted(
    conn: &mut Connection,
    id: TaskId,
    actor: Option<UserId>,
    deleted: bool,
) -> CoreResult<Task> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let old = get(&tx, id)?;
    let deleted_at_us = deleted.then_some(now);
    tx.execute(
        "UPDATE tasks SET deleted_at_us = ?1, updated_at_us = ?2 WHERE id = ?3",
        params![deleted_at_us, now, id.0],
    )?;

    let event = if deleted {
        VersionEvent::Destroy
    } else {
        VersionEvent::Update
    };
    let changes = audit::diff_objects(
        &scalar_image("deleted_at_us", old.deleted_at_us),
        &scalar_image("deleted_at_us", deleted_at_us),
    );
    audit::record(&tx, "Task", id.0, event, Some(&changes), actor, now)?;
    estimate::reconcile_task_parents(&tx, None, None, old.scope_id, old.project_id)?;

    tx.commit()?;
    get(conn, id)
}

/// Microseconds the task has sat in its current state, or `None` when it
/// never transitioned.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn time_in_current_state(
    conn: &Connection,
    id: TaskId,
    now_us: i64,
) -> CoreResult<Option<i64>> {
    Ok(transition::most_recent(conn, &TASK_TRANSITIONS, id.0)?
        .map(|row| now_us - row.created_at_us))
}

fn apply_patch(task: &mut Task, patch: &TaskPatch) {
    if let Some(name) = &patch.name {
        task.name.clone_from(name);
    }
    if let Some(description) = &patch.description {
        task.description.clone_from(description);
    }
    if let Some(project_id) = patch.project_id {
        task.project_id = project_id;
    }
    if let Some(scope_id) = patch.scope_id {
        task.scope_id = scope_id;
    }
    if let Some(responsible_user_id) = patch.responsible_user_id {
        task.responsible_user_id = responsible_user_id;
    }
    if let Some(nice_to_have) = patch.nice_to_have {
        task.nice_to_have = nice_to_have;
    }
    if let Some(due_at_us) = patch.due_at_us {
        task.due_at_us = due_at_us;
    }
    if let Some(unassisted) = patch.unassisted_estimate {
        task.unassisted_estimate = unassisted;
    }
    if let Some(ai_assisted) = patch.ai_assisted_estimate {
        task.ai_assisted_estimate = ai_assisted;
    }
    if let Some(actual) = patch.actual_manhours {
        task.actual_manhours = actual;
    }
}

/// JSON image used for audit diffs. Row identity and bookkeeping
/// timestamps are not part of the audited surface.
fn image(task: &Task) -> Map<String, Value> {
    let mut map = match serde_json::to_value(task) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.remove("id");
    map.remove("created_at_us");
    map.remove("updated_at_us");
    map
}

fn scalar_image(field: &str, value: Option<i64>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(field.to_string(), value.map_or(Value::Null, Value::from));
    map
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let state: String = row.get(6)?;
    Ok(Task {
        id: TaskId(row.get(0)?),
        project_id: row.get::<_, Option<i64>>(1)?.map(Into::into),
        scope_id: row.get::<_, Option<i64>>(2)?.map(Into::into),
        responsible_user_id: row.get::<_, Option<i64>>(3)?.map(Into::into),
        name: row.get(4)?,
        description: row.get(5)?,
        state: state.parse().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                6,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })?,
        nice_to_have: row.get::<_, i64>(7)? != 0,
        due_at_us: row.get(8)?,
        unassisted_estimate: row.get(9)?,
        ai_assisted_estimate: row.get(10)?,
        actual_manhours: row.get(11)?,
        deleted_at_us: row.get(12)?,
        created_at_us: row.get(13)?,
        updated_at_us: row.get(14)?,
    })
}
