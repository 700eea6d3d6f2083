//! Organizations, teams, users, and memberships.

use rusqlite::{Connection, OptionalExtension, params};

use crate::clock::now_us;
use crate::error::{CoreError, CoreResult};
use crate::model::{OrgId, Organization, Party, Team, TeamId, User, UserId};

/// Create an organization.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn create_organization(conn: &Connection, name: &str, timezone: &str) -> CoreResult<Organization> {
    let now = now_us();
    conn.execute(
        "INSERT INTO organizations (name, timezone, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?3)",
        params![name, timezone, now],
    )?;
    get_organization(conn, OrgId(conn.last_insert_rowid()))
}

/// Fetch an organization by id.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn get_organization(conn: &Connection, id: OrgId) -> CoreResult<Organization> {
    conn.query_row(
        "SELECT id, name, timezone, deleted_at_us, created_at_us, updated_at_us
         FROM organizations WHERE id = ?1",
        params![id.0],
        |row| {
            Ok(Organization {
                id: OrgId(row.get(0)?),
                name: row.get(1)?,
                timezone: row.get(2)?,
                deleted_at_us: row.get(3)?,
                created_at_us: row.get(4)?,
                updated_at_us: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or(CoreError::NotFound {
        kind: "Organization",
        id: id.0,
    })
}

/// Create a team inside an organization.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn create_team(conn: &Connection, organization_id: OrgId, name: &str) -> CoreResult<Team> {
    let now = now_us();
    conn.execute(
        "INSERT INTO teams (organization_id, name, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?3)",
        params![organization_id.0, name, now],
    )?;
    get_team(conn, TeamId(conn.last_insert_rowid()))
}

/// Fetch a team by id.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn get_team(conn: &Connection, id: TeamId) -> CoreResult<Team> {
    conn.query_row(
        "SELECT id, organization_id, name, deleted_at_us, created_at_us, updated_at_us
         FROM teams WHERE id = ?1",
        params![id.0],
        |row| {
            Ok(Team {
                id: TeamId(row.get(0)?),
                organization_id: OrgId(row.get(1)?),
                name: row.get(2)?,
                deleted_at_us: row.get(3)?,
                created_at_us: row.get(4)?,
                updated_at_us: row.get(5)?,
            })
        },
    )
    .optional()?
    .ok_or(CoreError::NotFound {
        kind: "Team",
        id: id.0,
    })
}

/// Create a user.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn create_user(conn: &Connection, name: &str, email: &str) -> CoreResult<User> {
    let now = now_us();
    conn.execute(
        "INSERT INTO users (name, email, created_at_us, updated_at_us)
         VALUES (?1, ?2, ?3, ?3)",
        params![name, email, now],
    )?;
    get_user(conn, UserId(conn.last_insert_rowid()))
}

/// Fetch a user by id.
///
/// # Errors
///
/// Returns [`CoreError::NotFound`] when the id does not resolve.
pub fn get_user(conn: &Connection, id: UserId) -> CoreResult<User> {
    conn.query_row(
        "SELECT id, name, email, created_at_us, updated_at_us FROM users WHERE id = ?1",
        params![id.0],
        |row| {
            Ok(User {
                id: UserId(row.get(0)?),
                name: row.get(1)?,
                email: row.get(2)?,
                created_at_us: row.get(3)?,
                updated_at_us: row.get(4)?,
            })
        },
    )
    .optional()?
    .ok_or(CoreError::NotFound {
        kind: "User",
        id: id.0,
    })
}

/// Look up a user by id, tolerating absence (audit rendering falls back to
/// the raw identifier).
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn find_user(conn: &Connection, id: UserId) -> CoreResult<Option<User>> {
    match get_user(conn, id) {
        Ok(user) => Ok(Some(user)),
        Err(CoreError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err),
    }
}

/// Grant a user a role on a party. Idempotent per `(user, party)`.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn add_membership(conn: &Connection, user_id: UserId, party: Party, role: &str) -> CoreResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_party_roles (user_id, party_type, party_id, role)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            user_id.0,
            party.party_type().as_str(),
            party.party_id(),
            role
        ],
    )?;
    Ok(())
}

/// Whether the user holds any role on the given party.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn has_membership(conn: &Connection, user_id: UserId, party: Party) -> CoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM user_party_roles
            WHERE user_id = ?1 AND party_type = ?2 AND party_id = ?3
        )",
        params![user_id.0, party.party_type().as_str(), party.party_id()],
        |row| row.get(0),
    )?;
    Ok(exists != 0)
}

/// Direct members of a team. Organization-level roles grant access to
/// team queries but do not make their holders team members.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn team_member_ids(conn: &Connection, team_id: TeamId) -> CoreResult<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT user_id
         FROM user_party_roles
         WHERE party_type = 'team' AND party_id = ?1
         ORDER BY user_id",
    )?;
    let rows = stmt
        .query_map(params![team_id.0], |row| row.get::<_, i64>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows.into_iter().map(UserId).collect())
}

#[cfg(test)]
mod tests {
    use super::{
        add_membership, create_organization, create_team, create_user, has_membership,
        team_member_ids,
    };
    use crate::db;
    use crate::model::Party;

    #[test]
    fn team_members_are_direct_roles_only() {
        let conn = db::open_in_memory().expect("open db");
        let org = create_organization(&conn, "Acme", "UTC").expect("org");
        let team = create_team(&conn, org.id, "Platform").expect("team");

        let direct = create_user(&conn, "Dana", "dana@example.com").expect("user");
        let via_org = create_user(&conn, "Orin", "orin@example.com").expect("user");
        let outsider = create_user(&conn, "Pat", "pat@example.com").expect("user");

        add_membership(&conn, direct.id, Party::Team(team.id), "member").expect("grant");
        add_membership(&conn, via_org.id, Party::Organization(org.id), "admin").expect("grant");

        let members = team_member_ids(&conn, team.id).expect("members");
        assert_eq!(members, vec![direct.id]);

        assert!(has_membership(&conn, direct.id, Party::Team(team.id)).expect("query"));
        assert!(has_membership(&conn, via_org.id, Party::Organization(org.id)).expect("query"));
        assert!(!has_membership(&conn, outsider.id, Party::Team(team.id)).expect("query"));
    }
}
