//! Authorization gate, consumed by the tool surface.
//!
//! Core mutation paths take the gate's verdict as a precondition; they do
//! not embed access rules themselves. The default [`MembershipGate`] is
//! backed by `user_party_roles`: owning a task, or holding a role on its
//! project, the project's team, or the team's organization grants access.
//! "Outside the visible scope" and "does not exist" are deliberately
//! indistinguishable to callers.

use rusqlite::{Connection, params};

use crate::error::CoreResult;
use crate::model::{Project, ProjectId, Scope, Task, UserId};

/// The actions the gate distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Show,
    Create,
    Update,
    Destroy,
}

/// The record a gate decision applies to.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Task(&'a Task),
    Scope(&'a Scope),
    Project(&'a Project),
}

/// Yes/no access decisions plus query scoping.
pub trait Gate {
    /// Whether `actor` may perform `action` on `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if a membership lookup fails.
    fn authorized(
        &self,
        conn: &Connection,
        actor: UserId,
        action: Action,
        target: &Target<'_>,
    ) -> CoreResult<bool>;

    /// Ids of active projects the actor may see, used to scope listings.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    fn visible_project_ids(&self, conn: &Connection, actor: UserId) -> CoreResult<Vec<ProjectId>>;
}

/// Membership-backed gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct MembershipGate;

impl MembershipGate {
    /// Whether the actor holds a role on the project, its team, or the
    /// team's organization.
    fn project_access(conn: &Connection, actor: UserId, project_id: ProjectId) -> CoreResult<bool> {
        let granted: i64 = conn.query_row(
            "SELECT EXISTS(
                SELECT 1 FROM user_party_roles upr
                WHERE upr.user_id = ?1 AND (
                    (upr.party_type = 'project' AND upr.party_id = ?2)
                 OR (upr.party_type = 'team' AND upr.party_id =
                        (SELECT team_id FROM projects WHERE id = ?2))
                 OR (upr.party_type = 'organization' AND upr.party_id =
                        (SELECT t.organization_id FROM teams t
                         JOIN projects p ON p.team_id = t.id
                         WHERE p.id = ?2))
                )
            )",
            params![actor.0, project_id.0],
            |row| row.get(0),
        )?;
        Ok(granted != 0)
    }

    fn task_access(conn: &Connection, actor: UserId, task: &Task) -> CoreResult<bool> {
        if task.responsible_user_id == Some(actor) {
            return Ok(true);
        }
        match task.project_id {
            Some(project_id) => Self::project_access(conn, actor, project_id),
            None => Ok(false),
        }
    }
}

impl Gate for MembershipGate {
    fn authorized(
        &self,
        conn: &Connection,
        actor: UserId,
        action: Action,
        target: &Target<'_>,
    ) -> CoreResult<bool> {
        match target {
            Target::Task(task) => match action {
                Action::Destroy => Ok(task.responsible_user_id == Some(actor)),
                Action::Show | Action::Create | Action::Update => {
                    Self::task_access(conn, actor, task)
                }
            },
            Target::Scope(scope) => Self::project_access(conn, actor, scope.project_id),
            Target::Project(project) => Self::project_access(conn, actor, project.id),
        }
    }

    fn visible_project_ids(&self, conn: &Connection, actor: UserId) -> CoreResult<Vec<ProjectId>> {
        let mut stmt = conn.prepare(
            "SELECT DISTINCT p.id
             FROM projects p
             WHERE p.deleted_at_us IS NULL AND (
                 p.id IN (SELECT party_id FROM user_party_roles
                          WHERE user_id = ?1 AND party_type = 'project')
              OR p.team_id IN (SELECT party_id FROM user_party_roles
                               WHERE user_id = ?1 AND party_type = 'team')
              OR p.team_id IN (
                     SELECT t.id FROM teams t
                     WHERE t.deleted_at_us IS NULL
                       AND t.organization_id IN (
                           SELECT party_id FROM user_party_roles
                           WHERE user_id = ?1 AND party_type = 'organization'))
             )
             ORDER BY p.id",
        )?;
        let rows = stmt
            .query_map(params![actor.0], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(ProjectId).collect())
    }
}

/// Gate that admits everything; single-user CLI contexts and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Gate for AllowAll {
    fn authorized(
        &self,
        _conn: &Connection,
        _actor: UserId,
        _action: Action,
        _target: &Target<'_>,
    ) -> CoreResult<bool> {
        Ok(true)
    }

    fn visible_project_ids(&self, conn: &Connection, _actor: UserId) -> CoreResult<Vec<ProjectId>> {
        let mut stmt =
            conn.prepare("SELECT id FROM projects WHERE deleted_at_us IS NULL ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(ProjectId).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{Action, Gate, MembershipGate, Target};
    use crate::db;
    use crate::model::{NewProject, NewTask, Party, ProjectId, UserId};
    use crate::store::{parties, projects, tasks};

    struct Fixture {
        conn: rusqlite::Connection,
        member: UserId,
        outsider: UserId,
        project: ProjectId,
    }

    fn fixture() -> Fixture {
        let mut conn = db::open_in_memory().expect("open db");
        let org = parties::create_organization(&conn, "Acme", "UTC").expect("org");
        let team = parties::create_team(&conn, org.id, "Platform").expect("team");
        let member = parties::create_user(&conn, "Meg", "meg@example.com").expect("user");
        let outsider = parties::create_user(&conn, "Oz", "oz@example.com").expect("user");
        parties::add_membership(&conn, member.id, Party::Team(team.id), "member").expect("grant");

        let project = projects::create(
            &mut conn,
            &NewProject {
                name: "alpha".into(),
                team_id: Some(team.id),
                ..NewProject::default()
            },
            None,
        )
        .expect("project");

        Fixture {
            conn,
            member: member.id,
            outsider: outsider.id,
            project: project.id,
        }
    }

    #[test]
    fn team_membership_grants_project_and_task_access() {
        let mut fx = fixture();
        let task = tasks::create(
            &mut fx.conn,
            &NewTask {
                name: "build it".into(),
                project_id: Some(fx.project),
                ..NewTask::default()
            },
            None,
        )
        .expect("task");

        let gate = MembershipGate;
        assert!(
            gate.authorized(&fx.conn, fx.member, Action::Update, &Target::Task(&task))
                .expect("verdict")
        );
        assert!(
            !gate
                .authorized(&fx.conn, fx.outsider, Action::Update, &Target::Task(&task))
                .expect("verdict")
        );

        assert_eq!(
            gate.visible_project_ids(&fx.conn, fx.member).expect("scope"),
            vec![fx.project]
        );
        assert!(
            gate.visible_project_ids(&fx.conn, fx.outsider)
                .expect("scope")
                .is_empty()
        );
    }

    #[test]
    fn destroy_requires_ownership() {
        let mut fx = fixture();
        let task = tasks::create(
            &mut fx.conn,
            &NewTask {
                name: "mine".into(),
                project_id: Some(fx.project),
                responsible_user_id: Some(fx.outsider),
                ..NewTask::default()
            },
            None,
        )
        .expect("task");

        let gate = MembershipGate;
        // a team member may edit, but only the responsible user may destroy
        assert!(
            gate.authorized(&fx.conn, fx.member, Action::Update, &Target::Task(&task))
                .expect("verdict")
        );
        assert!(
            !gate
                .authorized(&fx.conn, fx.member, Action::Destroy, &Target::Task(&task))
                .expect("verdict")
        );
        assert!(
            gate.authorized(&fx.conn, fx.outsider, Action::Destroy, &Target::Task(&task))
                .expect("verdict")
        );
    }
}
