//! Task workflow machine.
//!
//! Edges are declared on [`TaskState`]. One guard is registered: any edge
//! into `in_progress` requires a responsible user plus both estimates —
//! work cannot start undefined.

use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;

use super::{now_us, with_conflict_retry};
use crate::audit::{self, VersionEvent};
use crate::error::{CoreError, CoreResult};
use crate::model::{Task, TaskId, TaskState, UserId};
use crate::notify::{NotificationSink, TransitionEvent, TransitionOwner};
use crate::store::tasks;
use crate::transition::{self, TASK_TRANSITIONS, TransitionRow, user_id_from_metadata};

/// Guard verdict for a single edge.
fn guard(task: &Task, target: TaskState) -> Result<(), &'static str> {
    if target == TaskState::InProgress
        && (task.responsible_user_id.is_none()
            || task.unassisted_estimate.is_none()
            || task.ai_assisted_estimate.is_none())
    {
        return Err(
            "a responsible user, an unassisted estimate, and an AI-assisted estimate are required",
        );
    }
    Ok(())
}

/// Whether the task may move to `target`: the edge must exist in the graph
/// and the guard must accept the task's current attributes.
#[must_use]
pub fn can_transition_to(task: &Task, target: TaskState) -> bool {
    task.state.has_edge_to(target) && guard(task, target).is_ok()
}

/// States reachable from the task's current state, guards included.
#[must_use]
pub fn allowed_transitions(task: &Task) -> Vec<TaskState> {
    task.state
        .edges()
        .iter()
        .copied()
        .filter(|target| guard(task, *target).is_ok())
        .collect()
}

fn invalid_transition(task: &Task, target: TaskState) -> CoreError {
    CoreError::InvalidTransition {
        from: task.state.to_string(),
        to: target.to_string(),
        allowed: allowed_transitions(task)
            .iter()
            .map(ToString::to_string)
            .collect(),
    }
}

/// Apply `target` to the task as one atomic unit.
///
/// Re-validates the edge and guard inside the transaction, appends the
/// transition row, updates the cached `state` column, and records an audit
/// version for the state change. After commit the sink receives the event
/// (fire-and-forget). A transient sort-key race is retried once.
///
/// # Errors
///
/// [`CoreError::InvalidTransition`] when no edge exists or the guard
/// rejects (the message lists allowed transitions);
/// [`CoreError::ConcurrencyConflict`] when retries exhaust;
/// [`CoreError::NotFound`] when the task does not exist.
pub fn transition_task(
    conn: &mut Connection,
    task_id: TaskId,
    target: TaskState,
    metadata: Value,
    sink: &dyn NotificationSink,
) -> CoreResult<TransitionRow> {
    transition_task_at(conn, task_id, target, metadata, sink, now_us())
}

/// [`transition_task`] with an explicit timestamp, for deterministic tests
/// and backfills.
///
/// # Errors
///
/// Same as [`transition_task`].
pub fn transition_task_at(
    conn: &mut Connection,
    task_id: TaskId,
    target: TaskState,
    metadata: Value,
    sink: &dyn NotificationSink,
    now_us: i64,
) -> CoreResult<TransitionRow> {
    let row = with_conflict_retry(|| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let task = tasks::get(&tx, task_id)?;
        if !task.state.has_edge_to(target) || guard(&task, target).is_err() {
            return Err(invalid_transition(&task, target));
        }

        let row = transition::append_in_tx(
            &tx,
            &TASK_TRANSITIONS,
            task_id.0,
            target.as_str(),
            &metadata,
            now_us,
        )?;

        let changes = audit::state_change("state", task.state.as_str(), target.as_str());
        audit::record(
            &tx,
            "Task",
            task_id.0,
            VersionEvent::Update,
            Some(&changes),
            user_id_from_metadata(&metadata).map(UserId),
            now_us,
        )?;

        tx.commit()?;
        Ok(row)
    })?;

    sink.transition_recorded(&TransitionEvent {
        owner: TransitionOwner::Task(task_id),
        transition_id: row.id,
        to_state: row.to_state.clone(),
        sort_key: row.sort_key,
        user_id: row.user_id(),
        created_at_us: row.created_at_us,
    });

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::{allowed_transitions, can_transition_to, transition_task_at};
    use crate::db;
    use crate::error::CoreError;
    use crate::model::{NewTask, TaskState, UserId};
    use crate::notify::NoopSink;
    use crate::store::tasks;
    use crate::transition::{self, TASK_TRANSITIONS};
    use serde_json::json;

    fn startable_task(conn: &mut rusqlite::Connection) -> crate::model::Task {
        conn.execute(
            "INSERT INTO users (id, name, email, created_at_us, updated_at_us)
             VALUES (7, 'Imogen', 'imogen@example.com', 0, 0)",
            [],
        )
        .expect("insert user");
        tasks::create(
            conn,
            &NewTask {
                name: "wire up retries".into(),
                responsible_user_id: Some(UserId(7)),
                unassisted_estimate: Some(8),
                ai_assisted_estimate: Some(3),
                ..NewTask::default()
            },
            Some(UserId(7)),
        )
        .expect("create task")
    }

    #[test]
    fn guard_blocks_undefined_work() {
        let mut conn = db::open_in_memory().expect("open db");
        let task = tasks::create(
            &mut conn,
            &NewTask {
                name: "mystery work".into(),
                ..NewTask::default()
            },
            None,
        )
        .expect("create task");

        assert!(!can_transition_to(&task, TaskState::InProgress));
        assert!(allowed_transitions(&task).is_empty());

        let err = transition_task_at(
            &mut conn,
            task.id,
            TaskState::InProgress,
            json!({}),
            &NoopSink,
            10,
        )
        .expect_err("guard must reject");
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert!(err.to_string().contains("(none)"));

        // Rejection leaves the log and cached state untouched.
        assert!(
            transition::history(&conn, &TASK_TRANSITIONS, task.id.0)
                .expect("history")
                .is_empty()
        );
        let current = tasks::get(&conn, task.id).expect("reload");
        assert_eq!(current.state, TaskState::New);
    }

    #[test]
    fn satisfying_the_guard_makes_the_same_call_succeed() {
        let mut conn = db::open_in_memory().expect("open db");
        let task = startable_task(&mut conn);

        assert!(can_transition_to(&task, TaskState::InProgress));
        let row = transition_task_at(
            &mut conn,
            task.id,
            TaskState::InProgress,
            json!({"user_id": 7}),
            &NoopSink,
            10,
        )
        .expect("transition");
        assert_eq!(row.to_state, "in_progress");
        assert_eq!(row.sort_key, 0);

        let current = tasks::get(&conn, task.id).expect("reload");
        assert_eq!(current.state, TaskState::InProgress);
    }

    #[test]
    fn graph_position_updates_after_each_apply() {
        let mut conn = db::open_in_memory().expect("open db");
        let task = startable_task(&mut conn);

        transition_task_at(
            &mut conn,
            task.id,
            TaskState::InProgress,
            json!({"user_id": 7}),
            &NoopSink,
            10,
        )
        .expect("start");

        let task = tasks::get(&conn, task.id).expect("reload");
        assert!(!can_transition_to(&task, TaskState::New));
        assert!(can_transition_to(&task, TaskState::InReview));
        assert!(can_transition_to(&task, TaskState::Blocked));
        assert!(!can_transition_to(&task, TaskState::Done));
    }

    #[test]
    fn unreachable_state_is_rejected_with_allowed_list() {
        let mut conn = db::open_in_memory().expect("open db");
        let task = startable_task(&mut conn);

        let err = transition_task_at(
            &mut conn,
            task.id,
            TaskState::Done,
            json!({"user_id": 7}),
            &NoopSink,
            10,
        )
        .expect_err("no edge new -> done");
        let message = err.to_string();
        assert!(message.contains("from new to done"));
        assert!(message.contains("in_progress"));
    }

    #[test]
    fn transition_records_an_audit_version() {
        let mut conn = db::open_in_memory().expect("open db");
        let task = startable_task(&mut conn);

        transition_task_at(
            &mut conn,
            task.id,
            TaskState::InProgress,
            json!({"user_id": 7}),
            &NoopSink,
            10,
        )
        .expect("transition");

        let (event, whodunnit): (String, String) = conn
            .query_row(
                "SELECT event, whodunnit FROM versions
                 WHERE item_type = 'Task' AND item_id = ?1 AND event = 'update'
                 ORDER BY id DESC LIMIT 1",
                [task.id.0],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .expect("version row");
        assert_eq!(event, "update");
        assert_eq!(whodunnit, "7");
    }

    #[test]
    fn done_can_reopen_to_in_review_only() {
        let mut conn = db::open_in_memory().expect("open db");
        let task = startable_task(&mut conn);
        for (state, at) in [
            (TaskState::InProgress, 10),
            (TaskState::InReview, 20),
            (TaskState::Done, 30),
        ] {
            transition_task_at(&mut conn, task.id, state, json!({"user_id": 7}), &NoopSink, at)
                .expect("walk to done");
        }

        let task = tasks::get(&conn, task.id).expect("reload");
        assert_eq!(allowed_transitions(&task), vec![TaskState::InReview]);
    }
}
