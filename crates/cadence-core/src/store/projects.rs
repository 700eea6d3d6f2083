//! Project persistence.

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use serde_json::{Map, Value};

use crate::audit::{self, VersionEvent};
use crate::clock::now_us;
use crate::error::{CoreError, CoreResult};
use crate::model::{NewProject, Project, ProjectId, RiskState, TeamId, UserId};
use crate::transition::{self, PROJECT_RISK_TRANSITIONS};

/// Partial update for a project; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub team_id: Option<Option<TeamId>>,
}

const SELECT_COLUMNS: &str = "id, team_id, name, description, risk_state,
    cached_unassisted_estimate, cached_ai_assisted_estimate, cached_actual_manhours,
    deleted_at_us, created_at_us, updated_at_us";

/// Create a project (risk starts `green`) and record its audit version.
///
/// # Errors
///
/// Returns an error if any statement fails.
pub fn create(conn: &mut Connection, new: &NewProject, actor: Option<UserId>) -> CoreResult<Project> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute(
        "INSERT INTO projects (team_id, name, description, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?4, ?4)",
        params![new.team_id.map(|id| id.0), new.name, new.description, now],
    )?;
    let id = ProjectId(tx.last_insert_rowid());
    let project = get(&tx, id)?;

    let changes = audit::diff_objects(&Map::new(), &image(&project));
    audit::record(&tx, "Project", id.0, VersionEvent::Create, Some(&changes), actor, now)?;

    tx.commit()?;
    Ok(project)
}

/// Fetch a project by id, soft-deleted rows included.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn get(conn: &Connection, id: ProjectId) -> CoreResult<Project> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM projects WHERE id = ?1");
    conn.query_row(&sql, params![id.0], row_to_project)
        .optional()?
        .ok_or(CoreError::NotFound {
            kind: "Project",
            id: id.0,
        })
}

/// List projects, optionally restricted to a team, newest update first.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn list(
    conn: &Connection,
    team_id: Option<TeamId>,
    include_deleted: bool,
) -> CoreResult<Vec<Project>> {
    let mut sql = format!("SELECT {SELECT_COLUMNS} FROM projects WHERE 1 = 1");
    let mut args: Vec<i64> = Vec::new();
    if !include_deleted {
        sql.push_str(" AND deleted_at_us IS NULL");
    }
    if let Some(team_id) = team_id {
        args.push(team_id.0);
        sql.push_str(&format!(" AND team_id = ?{}", args.len()));
    }
    sql.push_str(" ORDER BY updated_at_us DESC, id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(args), row_to_project)?
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
    id: ProjectId,
    patch: &ProjectPatch,
    actor: Option<UserId>,
) -> CoreResult<Project> {
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
    if let Some(team_id) = patch.team_id {
        next.team_id = team_id;
    }
    next.updated_at_us = now;

    tx.execute(
        "UPDATE projects SET team_id = ?1, name = ?2, description = ?3, updated_at_us = ?4
         WHERE id = ?5",
        params![
            next.team_id.map(|t| t.0),
            next.name,
            next.description,
            now,
            id.0
        ],
    )?;

    let changes = audit::diff_objects(&image(&old), &image(&next));
    if !changes.is_empty() {
        audit::record(&tx, "Project", id.0, VersionEvent::Update, Some(&changes), actor, now)?;
    }

    tx.commit()?;
    Ok(next)
}

/// Soft-delete the project.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn destroy(conn: &mut Connection, id: ProjectId, actor: Option<UserId>) -> CoreResult<Project> {
    set_deleted(conn, id, actor, true)
}

/// Restore a soft-deleted project.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn restore(conn: &mut Connection, id: ProjectId, actor: Option<UserId>) -> CoreResult<Project> {
    set_deleted(conn, id, actor, false)
}

fn set_deleted(
    conn: &mut Connection,
    id: ProjectId,
    actor: Option<UserId>,
    deleted: bool,
) -> CoreResult<Project> {
    let now = now_us();
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let old = get(&tx, id)?;
    let deleted_at_us = deleted.then_some(now);
    tx.execute(
        "UPDATE projects SET deleted_at_us = ?1, updated_at_us = ?2 WHERE id = ?3",
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
    let changes = audit::diff_objects(&old_map, &new_map);
    audit::record(&tx, "Project", id.0, event, Some(&changes), actor, now)?;

    tx.commit()?;
    get(conn, id)
}

/// Microseconds the project has sat in its current risk state, or `None`
/// when it never transitioned.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn time_in_current_risk_state(
    conn: &Connection,
    id: ProjectId,
    now_us: i64,
) -> CoreResult<Option<i64>> {
    Ok(
        transition::most_recent(conn, &PROJECT_RISK_TRANSITIONS, id.0)?
            .map(|row| now_us - row.created_at_us),
    )
}

fn image(project: &Project) -> Map<String, Value> {
    let mut map = match serde_json::to_value(project) {
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

fn row_to_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
    let risk: String = row.get(4)?;
    Ok(Project {
        id: ProjectId(row.get(0)?),
        team_id: row.get::<_, Option<i64>>(1)?.map(Into::into),
        name: row.get(2)?,
        description: row.get(3)?,
        risk_state: risk.parse::<RiskState>().map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })?,
        cached_unassisted_estimate: row.get(5)?,
        cached_ai_assisted_estimate: row.get(6)?,
        cached_actual_manhours: row.get(7)?,
        deleted_at_us: row.get(8)?,
        created_at_us: row.get(9)?,
        updated_at_us: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{ProjectPatch, create, destroy, get, list, update};
    use crate::db;
    use crate::model::{NewProject, RiskState};

    #[test]
    fn create_starts_green() {
        let mut conn = db::open_in_memory().expect("open db");
        let project = create(
            &mut conn,
            &NewProject {
                name: "alpha".into(),
                ..NewProject::default()
            },
            None,
        )
        .expect("create");
        assert_eq!(project.risk_state, RiskState::Green);
    }

    #[test]
    fn update_records_diff_and_destroy_hides_from_list() {
        let mut conn = db::open_in_memory().expect("open db");
        let project = create(
            &mut conn,
            &NewProject {
                name: "alpha".into(),
                ..NewProject::default()
            },
            None,
        )
        .expect("create");

        update(
            &mut conn,
            project.id,
            &ProjectPatch {
                name: Some("alpha prime".into()),
                ..ProjectPatch::default()
            },
            None,
        )
        .expect("update");
        assert_eq!(get(&conn, project.id).expect("reload").name, "alpha prime");

        destroy(&mut conn, project.id, None).expect("destroy");
        assert!(list(&conn, None, false).expect("list").is_empty());
        assert_eq!(list(&conn, None, true).expect("list all").len(), 1);
    }
}
