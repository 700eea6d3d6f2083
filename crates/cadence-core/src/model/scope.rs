use serde::{Deserialize, Serialize};

use super::ids::{ProjectId, ScopeId};

/// A scope groups tasks within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub id: ScopeId,
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
    pub cached_unassisted_estimate: i64,
    pub cached_ai_assisted_estimate: i64,
    pub cached_actual_manhours: i64,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Scope {
    /// Whether the row is soft-deleted.
    #[must_use]
    pub const fn deleted(&self) -> bool {
        self.deleted_at_us.is_some()
    }
}

/// Caller-supplied fields for creating a scope.
#[derive(Debug, Clone)]
pub struct NewScope {
    pub project_id: ProjectId,
    pub name: String,
    pub description: Option<String>,
}
