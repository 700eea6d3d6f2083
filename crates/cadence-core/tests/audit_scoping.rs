//! Team-scoped audit queries end to end: membership gating, item
//! restriction, polymorphic parent resolution, and soft-delete exclusion.

use cadence_core::audit::query::{AuditScope, TimeWindow, list_changes};
use cadence_core::audit::render::render_listing;
use cadence_core::db;
use cadence_core::error::CoreError;
use cadence_core::model::{
    NewProject, NewScope, NewTask, ParentRef, Party, ProjectId, TeamId, UserId,
};
use cadence_core::store::{children, parties, projects, scopes, tasks};
use rusqlite::Connection;

struct World {
    conn: Connection,
    team: TeamId,
    member: UserId,
    other_member: UserId,
    rival_member: UserId,
    team_project: ProjectId,
    rival_project: ProjectId,
}

/// Two teams in one organization, one project each, one member each
/// (plus a second member on the first team).
fn world() -> World {
    let mut conn = db::open_in_memory().expect("open db");
    let org = parties::create_organization(&conn, "Acme", "UTC").expect("org");
    let team = parties::create_team(&conn, org.id, "Platform").expect("team");
    let rival = parties::create_team(&conn, org.id, "Growth").expect("team");

    let member = parties::create_user(&conn, "Mira", "mira@example.com").expect("user");
    let other_member = parties::create_user(&conn, "Noor", "noor@example.com").expect("user");
    let rival_member = parties::create_user(&conn, "Rex", "rex@example.com").expect("user");
    parties::add_membership(&conn, member.id, Party::Team(team.id), "member").expect("grant");
    parties::add_membership(&conn, other_member.id, Party::Team(team.id), "member").expect("grant");
    parties::add_membership(&conn, rival_member.id, Party::Team(rival.id), "member")
        .expect("grant");

    let team_project = projects::create(
        &mut conn,
        &NewProject {
            name: "alpha".into(),
            team_id: Some(team.id),
            ..NewProject::default()
        },
        Some(member.id),
    )
    .expect("project");
    let rival_project = projects::create(
        &mut conn,
        &NewProject {
            name: "omega".into(),
            team_id: Some(rival.id),
            ..NewProject::default()
        },
        Some(rival_member.id),
    )
    .expect("project");

    World {
        conn,
        team: team.id,
        member: member.id,
        other_member: other_member.id,
        rival_member: rival_member.id,
        team_project: team_project.id,
        rival_project: rival_project.id,
    }
}

fn window() -> TimeWindow {
    TimeWindow::new(0, i64::MAX).expect("window")
}

#[test]
fn team_query_returns_members_changes_on_team_items_only() {
    let mut world = world();

    let ours = tasks::create(
        &mut world.conn,
        &NewTask {
            name: "team task".into(),
            project_id: Some(world.team_project),
            ..NewTask::default()
        },
        Some(world.other_member),
    )
    .expect("task");
    tasks::create(
        &mut world.conn,
        &NewTask {
            name: "rival task".into(),
            project_id: Some(world.rival_project),
            ..NewTask::default()
        },
        Some(world.rival_member),
    )
    .expect("rival task");

    let listing = list_changes(&world.conn, world.member, window(), Some(world.team), 100)
        .expect("team query");
    assert!(matches!(listing.scope, AuditScope::Team(ref name) if name == "Platform"));

    let item_ids: Vec<(String, i64)> = listing
        .records
        .iter()
        .map(|record| (record.version.item_type.clone(), record.version.item_id))
        .collect();
    assert!(item_ids.contains(&("Task".to_string(), ours.id.0)));
    assert!(item_ids.contains(&("Project".to_string(), world.team_project.0)));
    assert!(
        !item_ids.contains(&("Project".to_string(), world.rival_project.0)),
        "rival project changes must not leak"
    );
}

#[test]
fn note_versions_follow_their_polymorphic_parent() {
    let mut world = world();

    let ours = tasks::create(
        &mut world.conn,
        &NewTask {
            name: "host the retro".into(),
            project_id: Some(world.team_project),
            ..NewTask::default()
        },
        Some(world.member),
    )
    .expect("task");
    let theirs = tasks::create(
        &mut world.conn,
        &NewTask {
            name: "their retro".into(),
            project_id: Some(world.rival_project),
            ..NewTask::default()
        },
        Some(world.rival_member),
    )
    .expect("rival task");

    let note = children::create_note(
        &mut world.conn,
        ParentRef::Task(ours.id),
        "agenda drafted",
        Some(world.member),
    )
    .expect("note");
    children::create_note(
        &mut world.conn,
        ParentRef::Task(theirs.id),
        "identical body",
        Some(world.rival_member),
    )
    .expect("rival note");

    let listing = list_changes(&world.conn, world.member, window(), Some(world.team), 100)
        .expect("team query");
    let notes: Vec<_> = listing
        .records
        .iter()
        .filter(|record| record.version.item_type == "Note")
        .collect();
    assert_eq!(notes.len(), 1, "only the team's note is visible");
    assert_eq!(notes[0].version.item_id, note.id.0);
    assert_eq!(
        notes[0].parent_context.as_deref(),
        Some(format!("Parent: Task #{} (host the retro)", ours.id).as_str())
    );
}

#[test]
fn soft_deleted_parents_exclude_their_childrens_versions() {
    let mut world = world();

    let task = tasks::create(
        &mut world.conn,
        &NewTask {
            name: "doomed task".into(),
            project_id: Some(world.team_project),
            ..NewTask::default()
        },
        Some(world.member),
    )
    .expect("task");
    children::create_note(
        &mut world.conn,
        ParentRef::Task(task.id),
        "context note",
        Some(world.member),
    )
    .expect("note");

    let before = list_changes(&world.conn, world.member, window(), Some(world.team), 100)
        .expect("team query");
    assert!(
        before
            .records
            .iter()
            .any(|record| record.version.item_type == "Note")
    );

    tasks::destroy(&mut world.conn, task.id, Some(world.member)).expect("soft delete");

    let after = list_changes(&world.conn, world.member, window(), Some(world.team), 100)
        .expect("team query");
    assert!(
        !after
            .records
            .iter()
            .any(|record| record.version.item_type == "Note"),
        "notes on a deleted task must disappear from team results"
    );
    assert!(
        !after
            .records
            .iter()
            .any(|record| record.version.item_type == "Task"
                && record.version.item_id == task.id.0),
        "the deleted task's own versions must disappear too"
    );
}

#[test]
fn soft_deleted_project_hides_the_whole_subtree() {
    let mut world = world();

    let _scope = scopes::create(
        &mut world.conn,
        &NewScope {
            project_id: world.team_project,
            name: "phase one".into(),
            description: None,
        },
        Some(world.member),
    )
    .expect("scope");
    let _task = tasks::create(
        &mut world.conn,
        &NewTask {
            name: "inside".into(),
            project_id: Some(world.team_project),
            scope_id: Some(_scope.id),
            ..NewTask::default()
        },
        Some(world.member),
    )
    .expect("task");

    projects::destroy(&mut world.conn, world.team_project, Some(world.member))
        .expect("delete project");

    let listing = list_changes(&world.conn, world.member, window(), Some(world.team), 100)
        .expect("team query");
    assert!(
        listing.records.is_empty(),
        "every item under the deleted project is excluded, got {:?}",
        listing
            .records
            .iter()
            .map(|record| (&record.version.item_type, record.version.item_id))
            .collect::<Vec<_>>()
    );
}

#[test]
fn personal_results_stay_personal() {
    let mut world = world();
    let task = tasks::create(
        &mut world.conn,
        &NewTask {
            name: "by mira".into(),
            project_id: Some(world.team_project),
            ..NewTask::default()
        },
        Some(world.member),
    )
    .expect("task");

    let mine = list_changes(&world.conn, world.member, window(), None, 100).expect("personal");
    assert!(
        mine.records
            .iter()
            .any(|record| record.version.item_id == task.id.0)
    );

    let theirs =
        list_changes(&world.conn, world.other_member, window(), None, 100).expect("personal");
    assert!(
        theirs.records.is_empty(),
        "user B must not see user A's versions"
    );
}

#[test]
fn rendering_covers_found_and_empty_cases() {
    let mut world = world();
    tasks::create(
        &mut world.conn,
        &NewTask {
            name: "render me".into(),
            project_id: Some(world.team_project),
            ..NewTask::default()
        },
        Some(world.member),
    )
    .expect("task");

    let listing = list_changes(&world.conn, world.member, window(), Some(world.team), 100)
        .expect("team query");
    let rendered = render_listing(&listing);
    assert!(rendered.starts_with("Found"));
    assert!(rendered.contains("by Team 'Platform' members"));
    assert!(rendered.contains("Item Type: Task"));

    let empty_window = TimeWindow::new(0, 0).expect("window");
    let empty = list_changes(
        &world.conn,
        world.member,
        empty_window,
        Some(world.team),
        100,
    )
    .expect("empty query");
    assert!(render_listing(&empty).starts_with("No changes found"));
}

#[test]
fn authorization_failures_are_distinct_from_missing_teams() {
    let world = world();

    let err = list_changes(
        &world.conn,
        world.rival_member,
        window(),
        Some(world.team),
        100,
    )
    .expect_err("rival is not associated with Platform");
    assert!(matches!(err, CoreError::Unauthorized(_)));

    let err = list_changes(&world.conn, world.member, window(), Some(TeamId(999)), 100)
        .expect_err("unknown team id");
    assert!(matches!(err, CoreError::NotFound { .. }));
}

#[test]
fn inverted_window_fails_before_querying() {
    let err = TimeWindow::new(10, 5).expect_err("start after end");
    assert!(matches!(err, CoreError::InvalidTimeRange));
}
