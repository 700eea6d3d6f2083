//! Policy-scoped audit queries: "who changed what, when".
//!
//! Personal queries return only the actor's own versions. Team queries
//! require the actor to be associated with the team or its parent
//! organization, return versions authored by direct team members, and
//! restrict results to items that belong to the team — including notes,
//! links, and attachments whose polymorphic parent resolves to a team
//! item. Soft-deleted parents exclude their children's versions.

use rusqlite::{Connection, params};
use serde::Serialize;

use super::{RawVersion, Version, row_to_version};
use crate::error::{CoreError, CoreResult};
use crate::model::{ChildKind, TeamId, UserId};
use crate::store::{children, parties};

/// Inclusive query window in epoch microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start_us: i64,
    end_us: i64,
}

impl TimeWindow {
    /// Validate and build a window. Rejected before any query executes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTimeRange`] when `start > end`.
    pub fn new(start_us: i64, end_us: i64) -> CoreResult<Self> {
        if start_us > end_us {
            return Err(CoreError::InvalidTimeRange);
        }
        Ok(Self { start_us, end_us })
    }

    /// Window start, microseconds.
    #[must_use]
    pub const fn start_us(self) -> i64 {
        self.start_us
    }

    /// Window end, microseconds.
    #[must_use]
    pub const fn end_us(self) -> i64 {
        self.end_us
    }
}

/// One audit row enriched for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeRecord {
    pub version: Version,
    /// Actor display name, falling back to `User ID <n>` for unknown ids.
    pub actor_display: String,
    /// `Parent: <Type> #<id> (<name>)` for note/link/attachment items.
    pub parent_context: Option<String>,
}

/// The resolved scope of a change listing, for report headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum AuditScope {
    /// Personal query: the actor's own display name.
    Personal(String),
    /// Team query: the team's name.
    Team(String),
}

/// A change listing plus the scope it was resolved against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeListing {
    pub scope: AuditScope,
    pub window: TimeWindow,
    pub records: Vec<ChangeRecord>,
}

const VERSION_COLUMNS: &str =
    "v.id, v.item_type, v.item_id, v.event, v.object_changes, v.whodunnit, v.created_at_us";

/// List changes visible to `actor` within the window, newest first.
///
/// # Errors
///
/// [`CoreError::NotFound`] for an unknown team id;
/// [`CoreError::Unauthorized`] when the actor is associated with neither
/// the team nor its organization; or a storage error.
pub fn list_changes(
    conn: &Connection,
    actor: UserId,
    window: TimeWindow,
    team: Option<TeamId>,
    limit: usize,
) -> CoreResult<ChangeListing> {
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);

    let (scope, raw) = match team {
        Some(team_id) => {
            let team = parties::get_team(conn, team_id)?;
            let associated = parties::has_membership(
                conn,
                actor,
                crate::model::Party::Team(team_id),
            )? || parties::has_membership(
                conn,
                actor,
                crate::model::Party::Organization(team.organization_id),
            )?;
            if !associated {
                return Err(CoreError::Unauthorized(format!(
                    "Not authorized to view changes for Team {team_id}. \
                     You must be associated with the team or its organization."
                )));
            }
            (
                AuditScope::Team(team.name.clone()),
                team_versions(conn, team_id, window, limit)?,
            )
        }
        None => {
            let display = parties::find_user(conn, actor)?
                .map_or_else(|| format!("User ID {actor}"), |user| user.display());
            (
                AuditScope::Personal(display),
                personal_versions(conn, actor, window, limit)?,
            )
        }
    };

    let mut records = Vec::with_capacity(raw.len());
    for version in raw {
        let version = version.parse()?;
        let actor_display = actor_display(conn, version.whodunnit.as_deref())?;
        let parent_context = parent_context(conn, &version)?;
        records.push(ChangeRecord {
            version,
            actor_display,
            parent_context,
        });
    }

    Ok(ChangeListing {
        scope,
        window,
        records,
    })
}

fn personal_versions(
    conn: &Connection,
    actor: UserId,
    window: TimeWindow,
    limit: i64,
) -> CoreResult<Vec<RawVersion>> {
    let sql = format!(
        "SELECT {VERSION_COLUMNS}
         FROM versions v
         WHERE v.whodunnit = ?1
           AND v.created_at_us >= ?2 AND v.created_at_us <= ?3
         ORDER BY v.created_at_us DESC, v.id DESC
         LIMIT ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![actor.to_string(), window.start_us, window.end_us, limit],
            row_to_version,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// One query does all the scoping: the `WITH` block materializes the
/// team's active projects/tasks/scopes once, and each `item_type` branch
/// restricts versions to those ids (children through their join tables).
fn team_versions(
    conn: &Connection,
    team_id: TeamId,
    window: TimeWindow,
    limit: i64,
) -> CoreResult<Vec<RawVersion>> {
    let sql = format!(
        "WITH team_projects AS (
             SELECT id FROM projects
             WHERE team_id = ?1 AND deleted_at_us IS NULL
         ),
         team_tasks AS (
             SELECT id FROM tasks
             WHERE deleted_at_us IS NULL
               AND project_id IN (SELECT id FROM team_projects)
         ),
         team_scopes AS (
             SELECT id FROM scopes
             WHERE deleted_at_us IS NULL
               AND project_id IN (SELECT id FROM team_projects)
         ),
         team_members AS (
             SELECT CAST(user_id AS TEXT) AS whodunnit
             FROM user_party_roles
             WHERE party_type = 'team' AND party_id = ?1
         )
         SELECT {VERSION_COLUMNS}
         FROM versions v
         WHERE v.whodunnit IN (SELECT whodunnit FROM team_members)
           AND v.created_at_us >= ?2 AND v.created_at_us <= ?3
           AND (
               (v.item_type = 'Project' AND v.item_id IN (SELECT id FROM team_projects))
            OR (v.item_type = 'Task' AND v.item_id IN (SELECT id FROM team_tasks))
            OR (v.item_type = 'Scope' AND v.item_id IN (SELECT id FROM team_scopes))
            OR (v.item_type = 'Note' AND v.item_id IN (
                    SELECT n.id FROM notes n
                    JOIN notables j ON j.id = n.notable_id
                    WHERE n.deleted_at_us IS NULL AND (
                        (j.parent_type = 'project' AND j.parent_id IN (SELECT id FROM team_projects))
                     OR (j.parent_type = 'task' AND j.parent_id IN (SELECT id FROM team_tasks))
                     OR (j.parent_type = 'scope' AND j.parent_id IN (SELECT id FROM team_scopes)))))
            OR (v.item_type = 'Link' AND v.item_id IN (
                    SELECT l.id FROM links l
                    JOIN linkables j ON j.id = l.linkable_id
                    WHERE l.deleted_at_us IS NULL AND (
                        (j.parent_type = 'project' AND j.parent_id IN (SELECT id FROM team_projects))
                     OR (j.parent_type = 'task' AND j.parent_id IN (SELECT id FROM team_tasks))
                     OR (j.parent_type = 'scope' AND j.parent_id IN (SELECT id FROM team_scopes)))))
            OR (v.item_type = 'Attachment' AND v.item_id IN (
                    SELECT a.id FROM attachments a
                    JOIN attachables j ON j.id = a.attachable_id
                    WHERE a.deleted_at_us IS NULL AND (
                        (j.parent_type = 'project' AND j.parent_id IN (SELECT id FROM team_projects))
                     OR (j.parent_type = 'task' AND j.parent_id IN (SELECT id FROM team_tasks))
                     OR (j.parent_type = 'scope' AND j.parent_id IN (SELECT id FROM team_scopes)))))
           )
         ORDER BY v.created_at_us DESC, v.id DESC
         LIMIT ?4"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![team_id.0, window.start_us, window.end_us, limit],
            row_to_version,
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn actor_display(conn: &Connection, whodunnit: Option<&str>) -> CoreResult<String> {
    let Some(raw) = whodunnit else {
        return Ok("(system)".to_string());
    };
    if let Ok(id) = raw.parse::<i64>() {
        if let Some(user) = parties::find_user(conn, UserId(id))? {
            return Ok(user.display());
        }
    }
    Ok(format!("User ID {raw}"))
}

fn parent_context(conn: &Connection, version: &Version) -> CoreResult<Option<String>> {
    let Some(kind) = ChildKind::from_item_type(&version.item_type) else {
        return Ok(None);
    };
    let Some(parent) = children::parent_of(conn, kind, version.item_id)? else {
        return Ok(None);
    };
    Ok(Some(parent.context_line(conn)?))
}

#[cfg(test)]
mod tests {
    use super::{TimeWindow, list_changes};
    use crate::audit::{self, VersionEvent};
    use crate::db;
    use crate::error::CoreError;
    use crate::model::{Party, TeamId, UserId};
    use crate::store::parties;

    #[test]
    fn window_rejects_inverted_ranges() {
        assert!(matches!(
            TimeWindow::new(100, 0),
            Err(CoreError::InvalidTimeRange)
        ));
        assert!(TimeWindow::new(0, 0).is_ok());
    }

    #[test]
    fn personal_query_sees_only_own_versions() {
        let conn = db::open_in_memory().expect("open db");
        let alice = parties::create_user(&conn, "Alice", "alice@example.com").expect("user");
        let bob = parties::create_user(&conn, "Bob", "bob@example.com").expect("user");

        audit::record(&conn, "Task", 1, VersionEvent::Create, None, Some(alice.id), 10)
            .expect("alice version");
        audit::record(&conn, "Task", 2, VersionEvent::Create, None, Some(bob.id), 20)
            .expect("bob version");

        let window = TimeWindow::new(0, 100).expect("window");
        let mine = list_changes(&conn, alice.id, window, None, 100).expect("query");
        assert_eq!(mine.records.len(), 1);
        assert_eq!(mine.records[0].version.item_id, 1);
        assert_eq!(mine.records[0].actor_display, "Alice (alice@example.com)");

        let theirs = list_changes(&conn, bob.id, window, None, 100).expect("query");
        assert_eq!(theirs.records.len(), 1);
        assert_eq!(theirs.records[0].version.item_id, 2);
    }

    #[test]
    fn personal_query_respects_the_window_and_limit() {
        let conn = db::open_in_memory().expect("open db");
        let user = parties::create_user(&conn, "Cal", "cal@example.com").expect("user");
        for (item_id, at) in [(1, 10), (2, 20), (3, 30), (4, 200)] {
            audit::record(&conn, "Task", item_id, VersionEvent::Update, None, Some(user.id), at)
                .expect("version");
        }

        let window = TimeWindow::new(0, 100).expect("window");
        let listing = list_changes(&conn, user.id, window, None, 2).expect("query");
        // newest first, clipped to the limit, the out-of-window row gone
        let ids: Vec<i64> = listing
            .records
            .iter()
            .map(|record| record.version.item_id)
            .collect();
        assert_eq!(ids, vec![3, 2]);
    }

    #[test]
    fn team_query_requires_association() {
        let conn = db::open_in_memory().expect("open db");
        let org = parties::create_organization(&conn, "Acme", "UTC").expect("org");
        let team = parties::create_team(&conn, org.id, "Platform").expect("team");
        let outsider = parties::create_user(&conn, "Out", "out@example.com").expect("user");

        let window = TimeWindow::new(0, 100).expect("window");
        let err = list_changes(&conn, outsider.id, window, Some(team.id), 100)
            .expect_err("outsider must be rejected");
        assert!(matches!(err, CoreError::Unauthorized(_)));

        parties::add_membership(&conn, outsider.id, Party::Organization(org.id), "member")
            .expect("grant org role");
        assert!(list_changes(&conn, outsider.id, window, Some(team.id), 100).is_ok());
    }

    #[test]
    fn unknown_team_is_not_found() {
        let conn = db::open_in_memory().expect("open db");
        let user = parties::create_user(&conn, "Solo", "solo@example.com").expect("user");
        let window = TimeWindow::new(0, 100).expect("window");
        let err = list_changes(&conn, user.id, window, Some(TeamId(404)), 100)
            .expect_err("unknown team");
        assert!(matches!(err, CoreError::NotFound { kind: "Team", .. }));
    }
}
