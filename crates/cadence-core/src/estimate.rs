//! Estimate rollup caches on scopes and projects.
//!
//! Each scope/project carries cached sums of its active tasks' estimates.
//! Recomputation is an explicit step invoked by the task mutation
//! functions themselves — it appears in their contracts, not in hidden
//! lifecycle hooks. Reassigning a task reconciles both the old and the
//! new parent.

use rusqlite::{Connection, params};

use crate::error::CoreResult;
use crate::model::{ProjectId, ScopeId};

/// Recompute the cached estimate sums for one scope.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn recalculate_for_scope(conn: &Connection, scope_id: ScopeId) -> CoreResult<()> {
    conn.execute(
        "UPDATE scopes SET
            cached_unassisted_estimate = (
                SELECT COALESCE(SUM(unassisted_estimate), 0) FROM tasks
                WHERE tasks.scope_id = scopes.id AND tasks.deleted_at_us IS NULL),
            cached_ai_assisted_estimate = (
                SELECT COALESCE(SUM(ai_assisted_estimate), 0) FROM tasks
                WHERE tasks.scope_id = scopes.id AND tasks.deleted_at_us IS NULL),
            cached_actual_manhours = (
                SELECT COALESCE(SUM(actual_manhours), 0) FROM tasks
                WHERE tasks.scope_id = scopes.id AND tasks.deleted_at_us IS NULL)
         WHERE id = ?1",
        params![scope_id.0],
    )?;
    Ok(())
}

/// Recompute the cached estimate sums for one project.
///
/// # Errors
///
/// Returns an error if the update fails.
pub fn recalculate_for_project(conn: &Connection, project_id: ProjectId) -> CoreResult<()> {
    conn.execute(
        "UPDATE projects SET
            cached_unassisted_estimate = (
                SELECT COALESCE(SUM(unassisted_estimate), 0) FROM tasks
                WHERE tasks.project_id = projects.id AND tasks.deleted_at_us IS NULL),
            cached_ai_assisted_estimate = (
                SELECT COALESCE(SUM(ai_assisted_estimate), 0) FROM tasks
                WHERE tasks.project_id = projects.id AND tasks.deleted_at_us IS NULL),
            cached_actual_manhours = (
                SELECT COALESCE(SUM(actual_manhours), 0) FROM tasks
                WHERE tasks.project_id = projects.id AND tasks.deleted_at_us IS NULL)
         WHERE id = ?1",
        params![project_id.0],
    )?;
    Ok(())
}

/// Reconcile every parent touched by a task mutation: the old scope and
/// project (when the task moved away from them) and the current ones.
///
/// # Errors
///
/// Returns an error if any recalculation fails.
pub fn reconcile_task_parents(
    conn: &Connection,
    old_scope: Option<ScopeId>,
    old_project: Option<ProjectId>,
    new_scope: Option<ScopeId>,
    new_project: Option<ProjectId>,
) -> CoreResult<()> {
    if let Some(scope_id) = old_scope {
        if old_scope != new_scope {
            recalculate_for_scope(conn, scope_id)?;
        }
    }
    if let Some(project_id) = old_project {
        if old_project != new_project {
            recalculate_for_project(conn, project_id)?;
        }
    }
    if let Some(scope_id) = new_scope {
        recalculate_for_scope(conn, scope_id)?;
    }
    if let Some(project_id) = new_project {
        recalculate_for_project(conn, project_id)?;
    }
    Ok(())
}
