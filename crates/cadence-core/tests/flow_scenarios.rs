//! Flow analytics driven end to end through the state machine, with
//! controlled timestamps.

use cadence_core::db;
use cadence_core::flow::{
    TaskSelection, per_user_cycle_times, per_user_state_durations, state_durations,
};
use cadence_core::machine::task::transition_task_at;
use cadence_core::model::{NewTask, TaskId, TaskState, UserId};
use cadence_core::notify::NoopSink;
use cadence_core::store::{parties, tasks};
use cadence_core::transition::{self, TASK_TRANSITIONS};
use rusqlite::Connection;
use serde_json::json;

const HOUR_US: i64 = 3_600_000_000;

fn new_task(conn: &mut Connection, owner: UserId, name: &str) -> TaskId {
    tasks::create(
        conn,
        &NewTask {
            name: name.into(),
            responsible_user_id: Some(owner),
            unassisted_estimate: Some(4),
            ai_assisted_estimate: Some(2),
            ..NewTask::default()
        },
        Some(owner),
    )
    .expect("task")
    .id
}

fn walk(conn: &mut Connection, task_id: TaskId, user: i64, steps: &[(TaskState, i64)]) {
    for (state, at) in steps {
        transition_task_at(
            conn,
            task_id,
            *state,
            json!({"user_id": user}),
            &NoopSink,
            *at,
        )
        .expect("walk step");
    }
}

#[test]
fn machine_driven_walk_matches_the_documented_scenario() {
    let mut conn = db::open_in_memory().expect("open db");
    let owner = parties::create_user(&conn, "Sol", "sol@example.com").expect("user");
    let task_id = new_task(&mut conn, owner.id, "the scenario");

    // new -> in_progress at T0, -> in_review at T0+2h, -> done at T0+5h
    walk(
        &mut conn,
        task_id,
        owner.id.0,
        &[
            (TaskState::InProgress, 0),
            (TaskState::InReview, 2 * HOUR_US),
            (TaskState::Done, 5 * HOUR_US),
        ],
    );

    let stats = state_durations(&conn, &TaskSelection::All).expect("durations");
    let find = |state: &str| {
        stats
            .iter()
            .find(|stat| stat.state == state)
            .unwrap_or_else(|| panic!("missing {state}"))
    };
    assert_eq!(find("in_progress").avg_us, 2 * HOUR_US);
    assert_eq!(find("in_progress").count, 1);
    assert_eq!(find("in_review").avg_us, 3 * HOUR_US);
    assert!(
        !stats.iter().any(|stat| stat.state == "done"),
        "done has no successor and contributes nothing"
    );
}

#[test]
fn per_user_durations_split_by_acting_user() {
    let mut conn = db::open_in_memory().expect("open db");
    let ana = parties::create_user(&conn, "Ana", "ana@example.com").expect("user");
    let ben = parties::create_user(&conn, "Ben", "ben@example.com").expect("user");

    let first = new_task(&mut conn, ana.id, "ana's");
    walk(
        &mut conn,
        first,
        ana.id.0,
        &[(TaskState::InProgress, 0), (TaskState::InReview, HOUR_US)],
    );

    let second = new_task(&mut conn, ben.id, "ben's");
    walk(
        &mut conn,
        second,
        ben.id.0,
        &[(TaskState::InProgress, 0), (TaskState::InReview, 3 * HOUR_US)],
    );

    let stats = per_user_state_durations(&conn, &TaskSelection::All).expect("durations");
    let for_user = |user: i64| {
        stats
            .iter()
            .find(|stat| stat.user_id == user && stat.state == "in_progress")
            .unwrap_or_else(|| panic!("missing user {user}"))
    };
    assert_eq!(for_user(ana.id.0).avg_us, HOUR_US);
    assert_eq!(for_user(ben.id.0).avg_us, 3 * HOUR_US);
}

#[test]
fn cycle_times_survive_a_corrective_rollback() {
    let mut conn = db::open_in_memory().expect("open db");
    let owner = parties::create_user(&conn, "Io", "io@example.com").expect("user");
    let task_id = new_task(&mut conn, owner.id, "reworked");

    walk(
        &mut conn,
        task_id,
        owner.id.0,
        &[
            (TaskState::InProgress, 0),
            (TaskState::InReview, HOUR_US),
            (TaskState::Done, 2 * HOUR_US),
        ],
    );

    // roll back the premature `done`, then finish later
    let done = transition::most_recent(&conn, &TASK_TRANSITIONS, task_id.0)
        .expect("query")
        .expect("row");
    transition::delete(&mut conn, &TASK_TRANSITIONS, done.id, 3 * HOUR_US).expect("rollback");
    walk(&mut conn, task_id, owner.id.0, &[(TaskState::Done, 6 * HOUR_US)]);

    let cycles = per_user_cycle_times(
        &conn,
        &TaskSelection::All,
        TaskState::InProgress,
        TaskState::Done,
    )
    .expect("cycles");
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].user_id, owner.id.0);
    // first in_progress at 0, first (surviving) done at 6h
    assert_eq!(cycles[0].avg_us, 6 * HOUR_US);
}

#[test]
fn selection_by_ids_narrows_the_aggregates() {
    let mut conn = db::open_in_memory().expect("open db");
    let owner = parties::create_user(&conn, "Uma", "uma@example.com").expect("user");

    let counted = new_task(&mut conn, owner.id, "counted");
    walk(
        &mut conn,
        counted,
        owner.id.0,
        &[(TaskState::InProgress, 0), (TaskState::InReview, HOUR_US)],
    );

    let ignored = new_task(&mut conn, owner.id, "ignored");
    walk(
        &mut conn,
        ignored,
        owner.id.0,
        &[(TaskState::InProgress, 0), (TaskState::InReview, 5 * HOUR_US)],
    );

    let stats = state_durations(&conn, &TaskSelection::Ids(vec![counted])).expect("durations");
    let in_progress = stats
        .iter()
        .find(|stat| stat.state == "in_progress")
        .expect("in_progress stat");
    assert_eq!(in_progress.count, 1);
    assert_eq!(in_progress.max_us, HOUR_US);
}
