//! Project risk machine. Fully connected graph, no guards.

use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;

use super::{now_us, with_conflict_retry};
use crate::audit::{self, VersionEvent};
use crate::error::{CoreError, CoreResult};
use crate::model::{Project, ProjectId, RiskState, UserId};
use crate::notify::{NotificationSink, TransitionEvent, TransitionOwner};
use crate::store::projects;
use crate::transition::{self, PROJECT_RISK_TRANSITIONS, TransitionRow, user_id_from_metadata};

/// Whether the project's risk may move to `target`.
#[must_use]
pub fn can_transition_to(project: &Project, target: RiskState) -> bool {
    project.risk_state.has_edge_to(target)
}

/// Risk states reachable from the project's current state.
#[must_use]
pub fn allowed_transitions(project: &Project) -> Vec<RiskState> {
    project.risk_state.edges().to_vec()
}

/// Apply `target` to the project's risk state as one atomic unit.
///
/// Same transactional shape as the task machine: validate, append, flip,
/// update the cached `risk_state` column, record an audit version, commit,
/// notify.
///
/// # Errors
///
/// [`CoreError::InvalidTransition`] for self-transitions (the only
/// impossible move in a fully connected graph);
/// [`CoreError::ConcurrencyConflict`] when retries exhaust;
/// [`CoreError::NotFound`] when the project does not exist.
pub fn transition_project_risk(
    conn: &mut Connection,
    project_id: ProjectId,
    target: RiskState,
    metadata: Value,
    sink: &dyn NotificationSink,
) -> CoreResult<TransitionRow> {
    transition_project_risk_at(conn, project_id, target, metadata, sink, now_us())
}

/// [`transition_project_risk`] with an explicit timestamp.
///
/// # Errors
///
/// Same as [`transition_project_risk`].
pub fn transition_project_risk_at(
    conn: &mut Connection,
    project_id: ProjectId,
    target: RiskState,
    metadata: Value,
    sink: &dyn NotificationSink,
    now_us: i64,
) -> CoreResult<TransitionRow> {
    let row = with_conflict_retry(|| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let project = projects::get(&tx, project_id)?;
        if !project.risk_state.has_edge_to(target) {
            return Err(CoreError::InvalidTransition {
                from: project.risk_state.to_string(),
                to: target.to_string(),
                allowed: allowed_transitions(&project)
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            });
        }

        let row = transition::append_in_tx(
            &tx,
            &PROJECT_RISK_TRANSITIONS,
            project_id.0,
            target.as_str(),
            &metadata,
            now_us,
        )?;

        let changes = audit::state_change("risk_state", project.risk_state.as_str(), target.as_str());
        audit::record(
            &tx,
            "Project",
            project_id.0,
            VersionEvent::Update,
            Some(&changes),
            user_id_from_metadata(&metadata).map(UserId),
            now_us,
        )?;

        tx.commit()?;
        Ok(row)
    })?;

    sink.transition_recorded(&TransitionEvent {
        owner: TransitionOwner::Project(project_id),
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
    use super::{can_transition_to, transition_project_risk_at};
    use crate::db;
    use crate::error::CoreError;
    use crate::model::{NewProject, RiskState};
    use crate::notify::NoopSink;
    use crate::store::projects;
    use serde_json::json;

    #[test]
    fn risk_walks_the_fully_connected_graph() {
        let mut conn = db::open_in_memory().expect("open db");
        let project = projects::create(
            &mut conn,
            &NewProject {
                name: "billing revamp".into(),
                ..NewProject::default()
            },
            None,
        )
        .expect("create project");

        assert!(can_transition_to(&project, RiskState::Red));

        transition_project_risk_at(
            &mut conn,
            project.id,
            RiskState::Red,
            json!({"user_id": 2}),
            &NoopSink,
            10,
        )
        .expect("green -> red");
        transition_project_risk_at(
            &mut conn,
            project.id,
            RiskState::Yellow,
            json!({"user_id": 2}),
            &NoopSink,
            20,
        )
        .expect("red -> yellow");

        let project = projects::get(&conn, project.id).expect("reload");
        assert_eq!(project.risk_state, RiskState::Yellow);
    }

    #[test]
    fn self_transition_is_rejected() {
        let mut conn = db::open_in_memory().expect("open db");
        let project = projects::create(
            &mut conn,
            &NewProject {
                name: "billing revamp".into(),
                ..NewProject::default()
            },
            None,
        )
        .expect("create project");

        let err = transition_project_risk_at(
            &mut conn,
            project.id,
            RiskState::Green,
            json!({}),
            &NoopSink,
            10,
        )
        .expect_err("green -> green has no edge");
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }
}
