//! Canonical SQLite schema for cadence.
//!
//! The schema is normalized around the ownership hierarchy and the two
//! append-only logs:
//! - `organizations` → `teams` → `projects` → `scopes` → `tasks` hold the
//!   hierarchy, each level soft-deletable via `deleted_at_us`
//! - `task_transitions` / `project_risk_transitions` are the ordered state
//!   logs; per owner, `sort_key` is unique and exactly one row carries
//!   `most_recent = 1` (enforced by partial unique index)
//! - `versions` is the append-only audit log, decoupled from transitions
//! - `notables` / `linkables` / `attachables` are thin polymorphic joins
//!   mapping child records to one concrete parent

/// Migration v1: core tables, transition logs, audit log, meta row.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS organizations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    timezone TEXT NOT NULL DEFAULT 'UTC',
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS teams (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_id INTEGER NOT NULL REFERENCES organizations(id),
    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    email TEXT NOT NULL UNIQUE,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_party_roles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    party_type TEXT NOT NULL CHECK (party_type IN ('organization', 'team', 'project')),
    party_id INTEGER NOT NULL,
    role TEXT NOT NULL DEFAULT 'member',
    UNIQUE (user_id, party_type, party_id)
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    team_id INTEGER REFERENCES teams(id),
    name TEXT NOT NULL,
    description TEXT,
    risk_state TEXT NOT NULL DEFAULT 'green'
        CHECK (risk_state IN ('green', 'yellow', 'red')),
    cached_unassisted_estimate INTEGER NOT NULL DEFAULT 0,
    cached_ai_assisted_estimate INTEGER NOT NULL DEFAULT 0,
    cached_actual_manhours INTEGER NOT NULL DEFAULT 0,
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS scopes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id),
    name TEXT NOT NULL,
    description TEXT,
    cached_unassisted_estimate INTEGER NOT NULL DEFAULT 0,
    cached_ai_assisted_estimate INTEGER NOT NULL DEFAULT 0,
    cached_actual_manhours INTEGER NOT NULL DEFAULT 0,
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER REFERENCES projects(id),
    scope_id INTEGER REFERENCES scopes(id),
    responsible_user_id INTEGER REFERENCES users(id),
    name TEXT NOT NULL,
    description TEXT,
    state TEXT NOT NULL DEFAULT 'new'
        CHECK (state IN ('new', 'in_progress', 'in_review', 'done', 'blocked')),
    nice_to_have INTEGER NOT NULL DEFAULT 0 CHECK (nice_to_have IN (0, 1)),
    due_at_us INTEGER,
    unassisted_estimate INTEGER,
    ai_assisted_estimate INTEGER,
    actual_manhours INTEGER,
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS task_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
    to_state TEXT NOT NULL,
    sort_key INTEGER NOT NULL,
    most_recent INTEGER NOT NULL CHECK (most_recent IN (0, 1)),
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at_us INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_task_transitions_parent_sort
    ON task_transitions(task_id, sort_key);

CREATE UNIQUE INDEX IF NOT EXISTS idx_task_transitions_parent_most_recent
    ON task_transitions(task_id) WHERE most_recent = 1;

CREATE TABLE IF NOT EXISTS project_risk_transitions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
    to_state TEXT NOT NULL,
    sort_key INTEGER NOT NULL,
    most_recent INTEGER NOT NULL CHECK (most_recent IN (0, 1)),
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at_us INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_project_risk_transitions_parent_sort
    ON project_risk_transitions(project_id, sort_key);

CREATE UNIQUE INDEX IF NOT EXISTS idx_project_risk_transitions_parent_most_recent
    ON project_risk_transitions(project_id) WHERE most_recent = 1;

CREATE TABLE IF NOT EXISTS notables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_type TEXT NOT NULL
        CHECK (parent_type IN ('task', 'scope', 'project', 'team', 'organization')),
    parent_id INTEGER NOT NULL,
    UNIQUE (parent_type, parent_id)
);

CREATE TABLE IF NOT EXISTS notes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    notable_id INTEGER NOT NULL REFERENCES notables(id),
    body TEXT NOT NULL,
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS linkables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_type TEXT NOT NULL
        CHECK (parent_type IN ('task', 'scope', 'project', 'team', 'organization')),
    parent_id INTEGER NOT NULL,
    UNIQUE (parent_type, parent_id)
);

CREATE TABLE IF NOT EXISTS links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    linkable_id INTEGER NOT NULL REFERENCES linkables(id),
    url TEXT NOT NULL,
    title TEXT,
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS attachables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parent_type TEXT NOT NULL
        CHECK (parent_type IN ('task', 'scope', 'project', 'team', 'organization')),
    parent_id INTEGER NOT NULL,
    UNIQUE (parent_type, parent_id)
);

CREATE TABLE IF NOT EXISTS attachments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    attachable_id INTEGER NOT NULL REFERENCES attachables(id),
    filename TEXT NOT NULL,
    content_type TEXT,
    byte_size INTEGER,
    deleted_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_type TEXT NOT NULL,
    item_id INTEGER NOT NULL,
    event TEXT NOT NULL CHECK (event IN ('create', 'update', 'destroy')),
    object_changes TEXT,
    whodunnit TEXT,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS cadence_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO cadence_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for audit queries and list views.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_versions_whodunnit_created
    ON versions(whodunnit, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_versions_item
    ON versions(item_type, item_id);

CREATE INDEX IF NOT EXISTS idx_tasks_project
    ON tasks(project_id);

CREATE INDEX IF NOT EXISTS idx_tasks_scope
    ON tasks(scope_id);

CREATE INDEX IF NOT EXISTS idx_tasks_active
    ON tasks(deleted_at_us) WHERE deleted_at_us IS NULL;

CREATE INDEX IF NOT EXISTS idx_scopes_project
    ON scopes(project_id);

CREATE INDEX IF NOT EXISTS idx_projects_team
    ON projects(team_id);

CREATE INDEX IF NOT EXISTS idx_user_party_roles_party
    ON user_party_roles(party_type, party_id, user_id);

CREATE INDEX IF NOT EXISTS idx_notes_notable
    ON notes(notable_id);

CREATE INDEX IF NOT EXISTS idx_links_linkable
    ON links(linkable_id);

CREATE INDEX IF NOT EXISTS idx_attachments_attachable
    ON attachments(attachable_id);

UPDATE cadence_meta SET schema_version = 2 WHERE id = 1;
";

/// Indexes expected by the audit and list query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "idx_task_transitions_parent_sort",
    "idx_task_transitions_parent_most_recent",
    "idx_project_risk_transitions_parent_sort",
    "idx_project_risk_transitions_parent_most_recent",
    "idx_versions_whodunnit_created",
    "idx_versions_item",
    "idx_tasks_project",
    "idx_tasks_scope",
    "idx_tasks_active",
    "idx_scopes_project",
    "idx_projects_team",
    "idx_user_party_roles_party",
    "idx_notes_notable",
    "idx_links_linkable",
    "idx_attachments_attachable",
];

#[cfg(test)]
mod tests {
    use crate::db::migrations;
    use rusqlite::Connection;

    fn migrated_conn() -> rusqlite::Result<Connection> {
        let mut conn = Connection::open_in_memory()?;
        migrations::migrate(&mut conn)?;
        Ok(conn)
    }

    #[test]
    fn most_recent_is_unique_per_task() -> rusqlite::Result<()> {
        let conn = migrated_conn()?;
        conn.execute_batch(
            "INSERT INTO tasks (id, name, created_at_us, updated_at_us)
             VALUES (1, 'fix auth retry', 0, 0);
             INSERT INTO task_transitions
                 (task_id, to_state, sort_key, most_recent, created_at_us)
             VALUES (1, 'new', 0, 1, 0);",
        )?;

        let dup = conn.execute(
            "INSERT INTO task_transitions
                 (task_id, to_state, sort_key, most_recent, created_at_us)
             VALUES (1, 'in_progress', 1, 1, 1)",
            [],
        );
        assert!(dup.is_err(), "second most_recent row must violate the index");

        Ok(())
    }

    #[test]
    fn sort_key_is_unique_per_task() -> rusqlite::Result<()> {
        let conn = migrated_conn()?;
        conn.execute_batch(
            "INSERT INTO tasks (id, name, created_at_us, updated_at_us)
             VALUES (1, 'fix auth retry', 0, 0);
             INSERT INTO task_transitions
                 (task_id, to_state, sort_key, most_recent, created_at_us)
             VALUES (1, 'new', 0, 1, 0);",
        )?;

        let dup = conn.execute(
            "INSERT INTO task_transitions
                 (task_id, to_state, sort_key, most_recent, created_at_us)
             VALUES (1, 'in_progress', 0, 0, 1)",
            [],
        );
        assert!(dup.is_err(), "reused sort_key must violate the index");

        Ok(())
    }

    #[test]
    fn versions_reject_unknown_events() -> rusqlite::Result<()> {
        let conn = migrated_conn()?;
        let bad = conn.execute(
            "INSERT INTO versions (item_type, item_id, event, created_at_us)
             VALUES ('Task', 1, 'touch', 0)",
            [],
        );
        assert!(bad.is_err());
        Ok(())
    }
}
