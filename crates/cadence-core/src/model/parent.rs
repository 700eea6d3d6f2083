//! Polymorphic parent resolution.
//!
//! Notes, links, and attachments hang off a thin join row (`notables`,
//! `linkables`, `attachables`) that maps them to one concrete parent.
//! The parent is the closed [`ParentRef`] union — a type tag plus id,
//! resolved through typed lookups with an exhaustive match. There is no
//! string-keyed class dispatch anywhere in this path.

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::{OrgId, ProjectId, ScopeId, TaskId, TeamId};
use super::task::ParseStateError;
use crate::error::CoreResult;

/// The concrete record a note/link/attachment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum ParentRef {
    Task(TaskId),
    Scope(ScopeId),
    Project(ProjectId),
    Team(TeamId),
    Organization(OrgId),
}

impl ParentRef {
    /// Storage tag for the join-row `parent_type` column.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Task(_) => "task",
            Self::Scope(_) => "scope",
            Self::Project(_) => "project",
            Self::Team(_) => "team",
            Self::Organization(_) => "organization",
        }
    }

    /// Display name of the parent type (`Task`, `Scope`, …) for audit output.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Task(_) => "Task",
            Self::Scope(_) => "Scope",
            Self::Project(_) => "Project",
            Self::Team(_) => "Team",
            Self::Organization(_) => "Organization",
        }
    }

    /// The raw parent id for storage.
    #[must_use]
    pub const fn id(self) -> i64 {
        match self {
            Self::Task(id) => id.0,
            Self::Scope(id) => id.0,
            Self::Project(id) => id.0,
            Self::Team(id) => id.0,
            Self::Organization(id) => id.0,
        }
    }

    /// Rebuild a reference from the stored `(parent_type, parent_id)` pair.
    ///
    /// # Errors
    ///
    /// Returns a parse error for tags outside the closed set.
    pub fn from_stored(tag: &str, id: i64) -> Result<Self, ParseStateError> {
        match tag {
            "task" => Ok(Self::Task(TaskId(id))),
            "scope" => Ok(Self::Scope(ScopeId(id))),
            "project" => Ok(Self::Project(ProjectId(id))),
            "team" => Ok(Self::Team(TeamId(id))),
            "organization" => Ok(Self::Organization(OrgId(id))),
            _ => Err(ParseStateError {
                expected: "parent type",
                got: tag.to_string(),
            }),
        }
    }

    /// Look up the parent's display name through the typed registry.
    ///
    /// Returns `None` when the parent row no longer exists. Soft-deleted
    /// parents still resolve here; visibility filtering is the audit
    /// query's concern, display context is ours.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup query fails.
    pub fn display_name(self, conn: &Connection) -> CoreResult<Option<String>> {
        let (sql, id) = match self {
            Self::Task(id) => ("SELECT name FROM tasks WHERE id = ?1", id.0),
            Self::Scope(id) => ("SELECT name FROM scopes WHERE id = ?1", id.0),
            Self::Project(id) => ("SELECT name FROM projects WHERE id = ?1", id.0),
            Self::Team(id) => ("SELECT name FROM teams WHERE id = ?1", id.0),
            Self::Organization(id) => ("SELECT name FROM organizations WHERE id = ?1", id.0),
        };
        let name = conn
            .query_row(sql, params![id], |row| row.get::<_, String>(0))
            .optional()?;
        Ok(name)
    }

    /// Render the `Parent: <Type> #<id> (<name>)` audit context line.
    ///
    /// # Errors
    ///
    /// Returns an error if the name lookup fails.
    pub fn context_line(self, conn: &Connection) -> CoreResult<String> {
        let mut line = format!("Parent: {} #{}", self.type_name(), self.id());
        if let Some(name) = self.display_name(conn)? {
            if !name.is_empty() {
                line.push_str(&format!(" ({name})"));
            }
        }
        Ok(line)
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} #{}", self.type_name(), self.id())
    }
}

/// The three polymorphic child record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildKind {
    Note,
    Link,
    Attachment,
}

impl ChildKind {
    /// Audit `item_type` name for the child record.
    #[must_use]
    pub const fn item_type(self) -> &'static str {
        match self {
            Self::Note => "Note",
            Self::Link => "Link",
            Self::Attachment => "Attachment",
        }
    }

    /// The join table mapping children of this kind to their parent.
    #[must_use]
    pub const fn join_table(self) -> &'static str {
        match self {
            Self::Note => "notables",
            Self::Link => "linkables",
            Self::Attachment => "attachables",
        }
    }

    /// The child table itself.
    #[must_use]
    pub const fn child_table(self) -> &'static str {
        match self {
            Self::Note => "notes",
            Self::Link => "links",
            Self::Attachment => "attachments",
        }
    }

    /// The child table's foreign key to the join row.
    #[must_use]
    pub const fn join_fk(self) -> &'static str {
        match self {
            Self::Note => "notable_id",
            Self::Link => "linkable_id",
            Self::Attachment => "attachable_id",
        }
    }

    /// Match an audit `item_type` back to a child kind.
    #[must_use]
    pub fn from_item_type(item_type: &str) -> Option<Self> {
        match item_type {
            "Note" => Some(Self::Note),
            "Link" => Some(Self::Link),
            "Attachment" => Some(Self::Attachment),
            _ => None,
        }
    }
}

impl FromStr for ParentRef {
    type Err = ParseStateError;

    /// Parse `"task:12"`-style references used by tools and the CLI.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, id) = s.split_once(':').ok_or_else(|| ParseStateError {
            expected: "parent reference (type:id)",
            got: s.to_string(),
        })?;
        let id: i64 = id.trim().parse().map_err(|_| ParseStateError {
            expected: "parent reference (type:id)",
            got: s.to_string(),
        })?;
        Self::from_stored(tag.trim(), id)
    }
}
