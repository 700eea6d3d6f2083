//! Flow analytics derived purely from the transition log.
//!
//! All three operations are read-only and tolerate entities with zero or
//! one transitions without error — sparse data yields empty aggregates,
//! never failures. `versions` rows are never consulted here.

use rusqlite::Connection;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::CoreResult;
use crate::model::{ProjectId, TaskId, TaskState};
use crate::transition::{TransitionRow, user_id_from_metadata};

/// The set of tasks an analysis runs over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSelection {
    /// Every task in the store.
    All,
    /// Tasks belonging to one project.
    Project(ProjectId),
    /// An explicit id list.
    Ids(Vec<TaskId>),
}

/// Aggregate time spent in one state across the selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateDuration {
    pub state: String,
    pub avg_us: i64,
    pub min_us: i64,
    pub max_us: i64,
    pub count: usize,
}

/// Aggregate time one user's transitions spent in one state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserStateDuration {
    pub user_id: i64,
    pub state: String,
    pub avg_us: i64,
    pub min_us: i64,
    pub max_us: i64,
    pub count: usize,
}

/// Aggregate start-to-end cycle time per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserCycleTime {
    pub user_id: i64,
    pub avg_us: i64,
    pub median_us: i64,
    pub min_us: i64,
    pub max_us: i64,
    pub count: usize,
}

/// Time spent in each state, aggregated across the selection.
///
/// For every consecutive transition pair `(a, b)` of a task, the span
/// `b.created_at - a.created_at` is attributed to `a.to_state`. A task
/// with fewer than two transitions contributes nothing; the final
/// transition never contributes (it has no successor to measure against).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn state_durations(conn: &Connection, selection: &TaskSelection) -> CoreResult<Vec<StateDuration>> {
    let mut durations: BTreeMap<String, Vec<i64>> = BTreeMap::new();

    for rows in transitions_by_task(conn, selection)?.values() {
        for pair in rows.windows(2) {
            durations
                .entry(pair[0].to_state.clone())
                .or_default()
                .push(pair[1].created_at_us - pair[0].created_at_us);
        }
    }

    Ok(durations
        .into_iter()
        .map(|(state, spans)| {
            let (avg_us, min_us, max_us, count) = aggregate(&spans);
            StateDuration {
                state,
                avg_us,
                min_us,
                max_us,
                count,
            }
        })
        .collect())
}

/// Same walk as [`state_durations`], keyed by the acting user recorded on
/// the earlier transition's metadata. Transitions lacking a user id are
/// skipped entirely.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn per_user_state_durations(
    conn: &Connection,
    selection: &TaskSelection,
) -> CoreResult<Vec<UserStateDuration>> {
    let mut durations: BTreeMap<(i64, String), Vec<i64>> = BTreeMap::new();

    for rows in transitions_by_task(conn, selection)?.values() {
        for pair in rows.windows(2) {
            let Some(user_id) = user_id_from_metadata(&pair[0].metadata) else {
                continue;
            };
            durations
                .entry((user_id, pair[0].to_state.clone()))
                .or_default()
                .push(pair[1].created_at_us - pair[0].created_at_us);
        }
    }

    Ok(durations
        .into_iter()
        .map(|((user_id, state), spans)| {
            let (avg_us, min_us, max_us, count) = aggregate(&spans);
            UserStateDuration {
                user_id,
                state,
                avg_us,
                min_us,
                max_us,
                count,
            }
        })
        .collect())
}

/// Cycle time from the first transition into `start_state` to the first
/// transition into `end_state` strictly after it, attributed to the user
/// on the start transition. Tasks missing either milestone, or lacking a
/// user on the start transition, are excluded. Median takes the
/// lower-middle element of the sorted list — no interpolation.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn per_user_cycle_times(
    conn: &Connection,
    selection: &TaskSelection,
    start_state: TaskState,
    end_state: TaskState,
) -> CoreResult<Vec<UserCycleTime>> {
    let start_state = start_state.to_string();
    let end_state = end_state.to_string();
    let mut durations: BTreeMap<i64, Vec<i64>> = BTreeMap::new();

    for rows in transitions_by_task(conn, selection)?.values() {
        let Some(start_index) = rows.iter().position(|row| row.to_state == start_state) else {
            continue;
        };
        let start = &rows[start_index];
        let Some(end) = rows[start_index + 1..]
            .iter()
            .find(|row| row.to_state == end_state)
        else {
            continue;
        };
        if end.created_at_us <= start.created_at_us {
            continue;
        }
        let Some(user_id) = user_id_from_metadata(&start.metadata) else {
            continue;
        };
        durations
            .entry(user_id)
            .or_default()
            .push(end.created_at_us - start.created_at_us);
    }

    Ok(durations
        .into_iter()
        .map(|(user_id, mut spans)| {
            spans.sort_unstable();
            let (avg_us, min_us, max_us, count) = aggregate(&spans);
            let median_us = spans[(spans.len() - 1) / 2];
            UserCycleTime {
                user_id,
                avg_us,
                median_us,
                min_us,
                max_us,
                count,
            }
        })
        .collect())
}

fn aggregate(spans: &[i64]) -> (i64, i64, i64, usize) {
    let count = spans.len();
    let sum: i64 = spans.iter().sum();
    let avg = if count == 0 {
        0
    } else {
        sum / i64::try_from(count).unwrap_or(1)
    };
    let min = spans.iter().copied().min().unwrap_or(0);
    let max = spans.iter().copied().max().unwrap_or(0);
    (avg, min, max, count)
}

fn transitions_by_task(
    conn: &Connection,
    selection: &TaskSelection,
) -> CoreResult<BTreeMap<i64, Vec<TransitionRow>>> {
    let base = "SELECT t.id, t.task_id, t.to_state, t.sort_key, t.most_recent, t.metadata,
                       t.created_at_us
                FROM task_transitions t";
    let (sql, args): (String, Vec<i64>) = match selection {
        TaskSelection::All => (format!("{base} ORDER BY t.task_id, t.sort_key"), vec![]),
        TaskSelection::Project(project_id) => (
            format!(
                "{base} JOIN tasks ON tasks.id = t.task_id
                 WHERE tasks.project_id = ?1
                 ORDER BY t.task_id, t.sort_key"
            ),
            vec![project_id.0],
        ),
        TaskSelection::Ids(ids) => {
            if ids.is_empty() {
                return Ok(BTreeMap::new());
            }
            let placeholders = (1..=ids.len())
                .map(|n| format!("?{n}"))
                .collect::<Vec<_>>()
                .join(", ");
            (
                format!(
                    "{base} WHERE t.task_id IN ({placeholders})
                     ORDER BY t.task_id, t.sort_key"
                ),
                ids.iter().map(|id| id.0).collect(),
            )
        }
    };

    let mut stmt = conn.prepare(&sql)?;
    let mut grouped: BTreeMap<i64, Vec<TransitionRow>> = BTreeMap::new();
    let rows = stmt.query_map(rusqlite::params_from_iter(args), |row| {
        Ok((
            row.get::<_, i64>(1)?,
            row.get::<_, i64>(0)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, String>(5)?,
            row.get::<_, i64>(6)?,
        ))
    })?;
    for row in rows {
        let (task_id, id, to_state, sort_key, most_recent, metadata, created_at_us) = row?;
        grouped.entry(task_id).or_default().push(TransitionRow {
            id: crate::model::TransitionId(id),
            owner_id: task_id,
            to_state,
            sort_key,
            most_recent: most_recent != 0,
            metadata: serde_json::from_str(&metadata)?,
            created_at_us,
        });
    }
    Ok(grouped)
}
