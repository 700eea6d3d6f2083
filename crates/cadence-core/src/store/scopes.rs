//! Scope persistence.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::{Map, Value};

use crate::audit::{self, VersionEvent};
use crate::clock::now_us;
use crate::error::{CoreError, CoreResult};
use crate::model::{NewScope, ProjectId, Scope, ScopeId, UserId};

/// Partial update for a scope; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ScopePatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

const SELECT_COLUMNS: &str = "id, project_id, name, description,
    cached_unassisted_estimate, cached_ai_assisted_estimate, cached_actual_manhours,
    deleted_at_us, created_at_us, updated_at_us";

/// Create a scope and record its audit version.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn create(conn: &mut Connection, new: &NewScope, actor: Option<UserId>) -> CoreResult<Scope> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO scopes (project_id, name, description, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![new.project_id.0, new.name, new.description, now],
    )?;
    let id = ScopeId(tx.last_insert_rowid());
    let scope = get(&tx, id)?;

    let changes = audit::diff_objects(&Map::new(), &image(&scope));
    audit::record(&tx, "Scope", id.0, VersionEvent::Create, Some(&changes), actor, now)?;

    tx.commit()?;
    Ok(scope)
}

/// Fetch a scope by id, soft-deleted rows included.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn get(conn: &Connection, id: ScopeId) -> CoreResult<Scope> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM scopes WHERE id = ?1");
    conn.query_row(&sql, params![id.0], row_to_scope)
        .optional()?
        .ok_or(CoreError::NotFound {
            kind: "Scope",
            id: id.0,
        })
}

/// List scopes, optionally restricted to a project, newest update first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(
    conn: &Connection,
    project_id: Option<ProjectId>,
    include_deleted: bool,
) -> CoreResult<Vec<Scope>> {
    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM scopes WHERE 1 = 1");
    let mut args: Vec<i64> = Vec::new();
    if !include_deleted {
        sql.push_str(" AND deleted_at_us IS NULL");
    }
    if let Some(project_id) = project_id {
        args.push(project_id.0);
        sql.push_str(&format!(" AND project_id = ?{}", args.len()));
    }
    sql.push_str(" ORDER BY updated_at_us DESC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_scope)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Apply a partial update and record the field diff.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn update(
    conn: &mut Connection,
    id: ScopeId,
    patch: &ScopePatch,
    actor: Option<UserId>,
) -> CoreResult<Scope> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let old = get(&tx, id)?;
    let mut next = old.clone();
    if let Some(name) = &patch.name {
        next.name.clone_from(name);
    }
    if let Some(description) = &patch.description {
        next.description.clone_from(description);
    }
    next.updated_at_us = now;

    tx.execute(
        "UPDATE scopes SET name = ?1, description = ?2, updated_at_us = ?3 WHERE id = ?4",
        params![next.name, next.description, now, id.0],
    )?;

    let changes = audit::diff_objects(&image(&old), &image(&next));
    if !changes.is_empty() {
        audit::record(&tx, "Scope", id.0, VersionEvent::Update, Some(&changes), actor, now)?;
    }

    tx.commit()?;
    Ok(next)
}

/// Soft-delete the scope.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn destroy(conn: &mut Connection, id: ScopeId, actor: Option<UserId>) -> CoreResult<Scope> {
    set_deleted(conn, id, actor, true)
}

/// Restore a soft-deleted scope.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn restore(conn: &mut Connection, id: ScopeId, actor: Option<UserId>) -> CoreResult<Scope> {
    set_deleted(conn, id, actor, false)
}

fn set_deleted(
    conn: &mut Connection,
    id: ScopeId,
    actor: Option<UserId>,
    deleted: bool,
) -> CoreResult<Scope> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let old = get(&tx, id)?;
    let deleted_at_us = deleted.then_some(now);
    tx.execute(
        "UPDATE scopes SET deleted_at_us = ?1, updated_at_us = ?2 WHERE id = ?3",
        params![deleted_at_us, now, id.0],
    )?;

    let event = if deleted {
        VersionEvent::Destroy
    } else {
        VersionEvent::Update
    };
    let mut old_map = Map::new();
    old_map.insert(
        "deleted_at_us".to_string(),
        old.deleted_at_us.map_or(Value::Null, Value::from),
    );
    let mut new_map = Map::new();
    new_map.insert(
        "deleted_at_us".to_string(),
        deleted_at_us.map_or(Value::Null, Value::from),
    );
    audit::record(
        &tx,
        "Scope",
        id.0,
        event,
        Some(&audit::diff_objects(&old_map, &new_map)),
        actor,
        now,
    )?;

    tx.commit()?;
    get(conn, id)
}

/// Share (0..=100) of the scope's tasks whose most-recent transition is
/// `done`, rounded to the nearest integer. Zero tasks yields zero.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn percent_done(conn: &Connection, id: ScopeId) -> CoreResult<i64> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM tasks WHERE scope_id = ?1 AND deleted_at_us IS NULL",
        params![id.0],
        |row| row.get(0),
    )?;
    if total == 0 {
        return Ok(0);
    }

    let done: i64 = conn.query_row(
        "SELECT COUNT(DISTINCT tasks.id)
         FROM tasks
         JOIN task_transitions ON task_transitions.task_id = tasks.id
         WHERE tasks.scope_id = ?1
           AND tasks.deleted_at_us IS NULL
           AND task_transitions.most_recent = 1
           AND task_transitions.to_state = 'done'",
        params![id.0],
        |row| row.get(0),
    )?;

    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    let percent = ((done as f64 / total as f64) * 100.0).round() as i64;
    Ok(percent)
}

fn image(scope: &Scope) -> Map<String, Value> {
    let mut map = match serde_json::to_value(scope) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.remove("id");
    map.remove("created_at_us");
    map.remove("updated_at_us");
    map.remove("cached_unassisted_estimate");
    map.remove("cached_ai_assisted_estimate");
    map.remove("cached_actual_manhours");
    map
}

fn row_to_scope(row: &rusqlite::Row<'_>) -> rusqlite::Result<Scope> {
    Ok(Scope {
        id: ScopeId(row.get(0)?),
        project_id: ProjectId(row.get(1)?),
        name: row.get(2)?,
        description: row.get(3)?,
        cached_unassisted_estimate: row.get(4)?,
        cached_ai_assisted_estimate: row.get(5)?,
        cached_actual_manhours: row.get(6)?,
        deleted_at_us: row.get(7)?,
        created_at_us: row.get(8)?,
        updated_at_us: row.get(9)?,
    })
}
