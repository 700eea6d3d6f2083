//! Append-only transition log primitives shared by both state machines.
//!
//! Each owning entity (task, project) has its own log table. Per owner:
//! - `sort_key` is a monotonically increasing integer, unique per owner,
//!   establishing total order independent of wall-clock time
//! - exactly one row carries `most_recent = 1`, and it is always the row
//!   with the maximum `sort_key`
//!
//! Both properties are backed by unique indexes; a constraint violation on
//! insert means two writers raced on the same owner and is surfaced as
//! [`CoreError::ConcurrencyConflict`] for the caller to retry.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::model::TransitionId;

/// Descriptor binding a transition log table to its owning entity table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionTable {
    /// The log table, e.g. `task_transitions`.
    pub log_table: &'static str,
    /// The owning entity table, e.g. `tasks`.
    pub owner_table: &'static str,
    /// The log table's foreign key to the owner, e.g. `task_id`.
    pub owner_fk: &'static str,
    /// The owner's denormalized current-state column, e.g. `state`.
    pub state_column: &'static str,
    /// The machine's initial state, cached on owners with no history.
    pub initial_state: &'static str,
}

/// Task workflow log.
pub const TASK_TRANSITIONS: TransitionTable = TransitionTable {
    log_table: "task_transitions",
    owner_table: "tasks",
    owner_fk: "task_id",
    state_column: "state",
    initial_state: "new",
};

/// Project risk log.
pub const PROJECT_RISK_TRANSITIONS: TransitionTable = TransitionTable {
    log_table: "project_risk_transitions",
    owner_table: "projects",
    owner_fk: "project_id",
    state_column: "risk_state",
    initial_state: "green",
};

/// One recorded state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionRow {
    pub id: TransitionId,
    pub owner_id: i64,
    pub to_state: String,
    pub sort_key: i64,
    pub most_recent: bool,
    pub metadata: Value,
    pub created_at_us: i64,
}

impl TransitionRow {
    /// The acting user recorded in metadata, when present.
    #[must_use]
    pub fn user_id(&self) -> Option<i64> {
        user_id_from_metadata(&self.metadata)
    }
}

/// Extract `user_id` from a metadata map, tolerating numbers and
/// numeric strings.
#[must_use]
pub fn user_id_from_metadata(metadata: &Value) -> Option<i64> {
    match metadata.get("user_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Full history for one owner, in `sort_key` order.
///
/// # Errors
///
/// Returns an error if the query fails or stored metadata is not valid JSON.
pub fn history(conn: &Connection, table: &TransitionTable, owner_id: i64) -> CoreResult<Vec<TransitionRow>> {
    let sql = format!(
        "SELECT id, {fk}, to_state, sort_key, most_recent, metadata, created_at_us
         FROM {log}
         WHERE {fk} = ?1
         ORDER BY sort_key ASC",
        log = table.log_table,
        fk = table.owner_fk,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![owner_id], row_to_transition)?
        .collect::<Result<Vec<_>, _>>()?;
    rows.into_iter().map(parse_metadata).collect()
}

/// The most-recent transition for one owner, when any exists.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn most_recent(
    conn: &Connection,
    table: &TransitionTable,
    owner_id: i64,
) -> CoreResult<Option<TransitionRow>> {
    let sql = format!(
        "SELECT id, {fk}, to_state, sort_key, most_recent, metadata, created_at_us
         FROM {log}
         WHERE {fk} = ?1 AND most_recent = 1",
        log = table.log_table,
        fk = table.owner_fk,
    );
    let row = conn
        .query_row(&sql, params![owner_id], row_to_transition)
        .optional()?;
    row.map(parse_metadata).transpose()
}

/// The owner's current state as recorded in the log: the most-recent
/// transition's `to_state`, or `None` when the owner never transitioned.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn current_state(
    conn: &Connection,
    table: &TransitionTable,
    owner_id: i64,
) -> CoreResult<Option<String>> {
    Ok(most_recent(conn, table, owner_id)?.map(|row| row.to_state))
}

/// Append a transition inside an already-open transaction.
///
/// Allocates `sort_key = max + 1` (0 when the log is empty), clears the
/// previous most-recent flag, inserts the new row as most-recent, and
/// updates the owner's denormalized state column. The caller owns the
/// transaction boundary and commit.
///
/// # Errors
///
/// Returns [`CoreError::ConcurrencyConflict`] when a concurrent writer
/// claimed the same `sort_key` or most-recent slot, or another error if
/// the statements fail.
pub fn append_in_tx(
    tx: &Connection,
    table: &TransitionTable,
    owner_id: i64,
    to_state: &str,
    metadata: &Value,
    now_us: i64,
) -> CoreResult<TransitionRow> {
    let next_sort_key: i64 = tx.query_row(
        &format!(
            "SELECT COALESCE(MAX(sort_key), -1) + 1 FROM {log} WHERE {fk} = ?1",
            log = table.log_table,
            fk = table.owner_fk,
        ),
        params![owner_id],
        |row| row.get(0),
    )?;

    tx.execute(
        &format!(
            "UPDATE {log} SET most_recent = 0 WHERE {fk} = ?1 AND most_recent = 1",
            log = table.log_table,
            fk = table.owner_fk,
        ),
        params![owner_id],
    )?;

    let metadata_json = serde_json::to_string(metadata)?;
    let inserted = tx.execute(
        &format!(
            "INSERT INTO {log} ({fk}, to_state, sort_key, most_recent, metadata, created_at_us)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            log = table.log_table,
            fk = table.owner_fk,
        ),
        params![owner_id, to_state, next_sort_key, metadata_json, now_us],
    );

    match inserted {
        Ok(_) => {}
        Err(err) if is_unique_violation(&err) => return Err(CoreError::ConcurrencyConflict),
        Err(err) => return Err(err.into()),
    }

    let id = tx.last_insert_rowid();

    tx.execute(
        &format!(
            "UPDATE {owner} SET {state} = ?1, updated_at_us = ?2 WHERE id = ?3",
            owner = table.owner_table,
            state = table.state_column,
        ),
        params![to_state, now_us, owner_id],
    )?;

    debug!(
        log = table.log_table,
        owner_id,
        to_state,
        sort_key = next_sort_key,
        "transition appended"
    );

    Ok(TransitionRow {
        id: TransitionId(id),
        owner_id,
        to_state: to_state.to_string(),
        sort_key: next_sort_key,
        most_recent: true,
        metadata: metadata.clone(),
        created_at_us: now_us,
    })
}

/// Delete a transition (corrective rollback) and repair the invariants.
///
/// Runs in one transaction: removes the row; when it was most-recent,
/// re-elects the remaining row with the maximum `sort_key` and reconciles
/// the owner's denormalized state column — back to the machine's initial
/// state when no transitions remain. Never deferred or asynchronous: there
/// is no observable window with zero or two most-recent rows.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the transition does not exist, or
/// another error if the statements fail.
pub fn delete(
    conn: &mut Connection,
    table: &TransitionTable,
    transition_id: TransitionId,
    now_us: i64,
) -> CoreResult<Option<TransitionRow>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let sql = format!(
        "SELECT id, {fk}, to_state, sort_key, most_recent, metadata, created_at_us
         FROM {log}
         WHERE id = ?1",
        log = table.log_table,
        fk = table.owner_fk,
    );
    let Some(victim) = tx
        .query_row(&sql, params![transition_id.0], row_to_transition)
        .optional()?
    else {
        return Err(CoreError::NotFound {
            kind: "Transition",
            id: transition_id.0,
        });
    };
    let victim = parse_metadata(victim)?;

    tx.execute(
        &format!("DELETE FROM {log} WHERE id = ?1", log = table.log_table),
        params![transition_id.0],
    )?;

    let re_elected = if victim.most_recent {
        let owner_id = victim.owner_id;
        let last: Option<i64> = tx
            .query_row(
                &format!(
                    "SELECT id FROM {log}
                     WHERE {fk} = ?1
                     ORDER BY sort_key DESC
                     LIMIT 1",
                    log = table.log_table,
                    fk = table.owner_fk,
                ),
                params![owner_id],
                |row| row.get(0),
            )
            .optional()?;

        let new_state = if let Some(last_id) = last {
            tx.execute(
                &format!(
                    "UPDATE {log} SET most_recent = 1 WHERE id = ?1",
                    log = table.log_table,
                ),
                params![last_id],
            )?;
            tx.query_row(
                &format!(
                    "SELECT to_state FROM {log} WHERE id = ?1",
                    log = table.log_table,
                ),
                params![last_id],
                |row| row.get::<_, String>(0),
            )?
        } else {
            table.initial_state.to_string()
        };

        // Reconcile the denormalized column so the cached-state invariant
        // holds after deletion, not only after application.
        tx.execute(
            &format!(
                "UPDATE {owner} SET {state} = ?1, updated_at_us = ?2 WHERE id = ?3",
                owner = table.owner_table,
                state = table.state_column,
            ),
            params![new_state, now_us, owner_id],
        )?;

        last
    } else {
        None
    };

    tx.commit()?;

    debug!(
        log = table.log_table,
        transition_id = transition_id.0,
        re_elected = ?re_elected,
        "transition deleted"
    );

    let re_elected_row = match re_elected {
        Some(_) => most_recent(conn, table, victim.owner_id)?,
        None => None,
    };
    Ok(re_elected_row)
}

fn row_to_transition(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawTransition> {
    Ok(RawTransition {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        to_state: row.get(2)?,
        sort_key: row.get(3)?,
        most_recent: row.get::<_, i64>(4)? != 0,
        metadata: row.get(5)?,
        created_at_us: row.get(6)?,
    })
}

struct RawTransition {
    id: i64,
    owner_id: i64,
    to_state: String,
    sort_key: i64,
    most_recent: bool,
    metadata: String,
    created_at_us: i64,
}

fn parse_metadata(raw: RawTransition) -> CoreResult<TransitionRow> {
    Ok(TransitionRow {
        id: TransitionId(raw.id),
        owner_id: raw.owner_id,
        to_state: raw.to_state,
        sort_key: raw.sort_key,
        most_recent: raw.most_recent,
        metadata: serde_json::from_str(&raw.metadata)?,
        created_at_us: raw.created_at_us,
    })
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error {
                code: rusqlite::ffi::ErrorCode::ConstraintViolation,
                ..
            },
            _,
        )
    )
}

#[cfg(test)]
mod tests {
    use super::{
        PROJECT_RISK_TRANSITIONS, TASK_TRANSITIONS, append_in_tx, current_state, delete, history,
        most_recent, user_id_from_metadata,
    };
    use crate::db;
    use crate::error::CoreError;
    use crate::model::TransitionId;
    use rusqlite::Connection;
    use serde_json::json;

    fn conn_with_task() -> Connection {
        let conn = db::open_in_memory().expect("open db");
        conn.execute(
            "INSERT INTO tasks (id, name, created_at_us, updated_at_us)
             VALUES (1, 'fix auth retry', 0, 0)",
            [],
        )
        .expect("insert task");
        conn
    }

    fn append(conn: &mut Connection, to_state: &str, now_us: i64) -> super::TransitionRow {
        let tx = conn.transaction().expect("tx");
        let row = append_in_tx(
            &tx,
            &TASK_TRANSITIONS,
            1,
            to_state,
            &json!({"user_id": 7}),
            now_us,
        )
        .expect("append");
        tx.commit().expect("commit");
        row
    }

    fn assert_invariant(conn: &Connection) {
        let rows = history(conn, &TASK_TRANSITIONS, 1).expect("history");
        if rows.is_empty() {
            return;
        }
        let recent: Vec<_> = rows.iter().filter(|row| row.most_recent).collect();
        assert_eq!(recent.len(), 1, "exactly one most_recent row");
        let max_key = rows.iter().map(|row| row.sort_key).max().expect("max");
        assert_eq!(recent[0].sort_key, max_key, "most_recent has max sort_key");
    }

    fn cached_state(conn: &Connection) -> String {
        conn.query_row("SELECT state FROM tasks WHERE id = 1", [], |row| row.get(0))
            .expect("cached state")
    }

    #[test]
    fn append_allocates_monotonic_sort_keys() {
        let mut conn = conn_with_task();
        assert_eq!(append(&mut conn, "new", 10).sort_key, 0);
        assert_eq!(append(&mut conn, "in_progress", 20).sort_key, 1);
        assert_eq!(append(&mut conn, "in_review", 30).sort_key, 2);
        assert_invariant(&conn);
        assert_eq!(cached_state(&conn), "in_review");
        assert_eq!(
            current_state(&conn, &TASK_TRANSITIONS, 1).expect("state"),
            Some("in_review".to_string())
        );
    }

    #[test]
    fn delete_of_most_recent_re_elects_and_reconciles() {
        let mut conn = conn_with_task();
        append(&mut conn, "new", 10);
        append(&mut conn, "in_progress", 20);
        let last = append(&mut conn, "in_review", 30);

        let re_elected = delete(&mut conn, &TASK_TRANSITIONS, last.id, 40)
            .expect("delete")
            .expect("re-elected row");
        assert_eq!(re_elected.to_state, "in_progress");
        assert!(re_elected.most_recent);
        assert_invariant(&conn);
        assert_eq!(cached_state(&conn), "in_progress");
    }

    #[test]
    fn delete_of_middle_row_keeps_most_recent() {
        let mut conn = conn_with_task();
        append(&mut conn, "new", 10);
        let middle = append(&mut conn, "in_progress", 20);
        append(&mut conn, "in_review", 30);

        let re_elected = delete(&mut conn, &TASK_TRANSITIONS, middle.id, 40).expect("delete");
        assert!(re_elected.is_none());
        assert_invariant(&conn);
        assert_eq!(cached_state(&conn), "in_review");
    }

    #[test]
    fn delete_of_last_remaining_row_resets_to_initial() {
        let mut conn = conn_with_task();
        let only = append(&mut conn, "new", 10);

        let re_elected = delete(&mut conn, &TASK_TRANSITIONS, only.id, 20).expect("delete");
        assert!(re_elected.is_none());
        assert!(
            history(&conn, &TASK_TRANSITIONS, 1)
                .expect("history")
                .is_empty()
        );
        assert_eq!(cached_state(&conn), "new");
    }

    #[test]
    fn delete_of_unknown_transition_is_not_found() {
        let mut conn = conn_with_task();
        let err = delete(&mut conn, &TASK_TRANSITIONS, TransitionId(99), 0)
            .expect_err("missing transition");
        assert!(matches!(err, CoreError::NotFound { kind: "Transition", .. }));
    }

    #[test]
    fn logs_for_different_owners_are_independent() {
        let mut conn = conn_with_task();
        conn.execute(
            "INSERT INTO projects (id, name, created_at_us, updated_at_us)
             VALUES (1, 'billing revamp', 0, 0)",
            [],
        )
        .expect("insert project");

        append(&mut conn, "new", 10);

        let tx = conn.transaction().expect("tx");
        append_in_tx(
            &tx,
            &PROJECT_RISK_TRANSITIONS,
            1,
            "yellow",
            &json!({"user_id": 3}),
            15,
        )
        .expect("append risk");
        tx.commit().expect("commit");

        assert_eq!(
            current_state(&conn, &PROJECT_RISK_TRANSITIONS, 1).expect("state"),
            Some("yellow".to_string())
        );
        assert_eq!(
            current_state(&conn, &TASK_TRANSITIONS, 1).expect("state"),
            Some("new".to_string())
        );
        let risk: String = conn
            .query_row("SELECT risk_state FROM projects WHERE id = 1", [], |row| {
                row.get(0)
            })
            .expect("risk_state");
        assert_eq!(risk, "yellow");
    }

    #[test]
    fn metadata_user_id_tolerates_numbers_and_strings() {
        assert_eq!(user_id_from_metadata(&json!({"user_id": 7})), Some(7));
        assert_eq!(user_id_from_metadata(&json!({"user_id": "7"})), Some(7));
        assert_eq!(user_id_from_metadata(&json!({"user_id": null})), None);
        assert_eq!(user_id_from_metadata(&json!({})), None);
    }

    #[test]
    fn most_recent_is_none_for_unknown_owner() {
        let conn = db::open_in_memory().expect("open db");
        assert!(
            most_recent(&conn, &TASK_TRANSITIONS, 42)
                .expect("query")
                .is_none()
        );
    }
}
