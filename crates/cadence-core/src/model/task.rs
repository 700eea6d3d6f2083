use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::{ProjectId, ScopeId, TaskId, UserId};

/// Workflow lifecycle states for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    New,
    InProgress,
    InReview,
    Done,
    Blocked,
}

impl TaskState {
    /// The machine's initial state for tasks that never transitioned.
    pub const INITIAL: Self = Self::New;

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InProgress => "in_progress",
            Self::InReview => "in_review",
            Self::Done => "done",
            Self::Blocked => "blocked",
        }
    }

    /// States reachable from `self` in the declared workflow graph.
    ///
    /// Edges:
    /// - `new -> in_progress`
    /// - `in_progress -> in_review | blocked`
    /// - `in_review -> done | blocked`
    /// - `blocked -> in_progress`
    /// - `done -> in_review` (reopen)
    #[must_use]
    pub const fn edges(self) -> &'static [Self] {
        match self {
            Self::New => &[Self::InProgress],
            Self::InProgress => &[Self::InReview, Self::Blocked],
            Self::InReview => &[Self::Done, Self::Blocked],
            Self::Blocked => &[Self::InProgress],
            Self::Done => &[Self::InReview],
        }
    }

    /// Whether an edge `self -> target` exists, ignoring guards.
    #[must_use]
    pub fn has_edge_to(self, target: Self) -> bool {
        self.edges().contains(&target)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(Self::New),
            "in_progress" => Ok(Self::InProgress),
            "in_review" => Ok(Self::InReview),
            "done" => Ok(Self::Done),
            "blocked" => Ok(Self::Blocked),
            _ => Err(ParseStateError {
                expected: "task state",
                got: s.to_string(),
            }),
        }
    }
}

/// Error returned when parsing a state value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseStateError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseStateError {}

/// All persisted fields for a task row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub project_id: Option<ProjectId>,
    pub scope_id: Option<ScopeId>,
    pub responsible_user_id: Option<UserId>,
    pub name: String,
    pub description: Option<String>,
    pub state: TaskState,
    pub nice_to_have: bool,
    pub due_at_us: Option<i64>,
    pub unassisted_estimate: Option<i64>,
    pub ai_assisted_estimate: Option<i64>,
    pub actual_manhours: Option<i64>,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Task {
    /// Whether the row is soft-deleted.
    #[must_use]
    pub const fn deleted(&self) -> bool {
        self.deleted_at_us.is_some()
    }
}

/// Caller-supplied fields for creating a task.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub project_id: Option<ProjectId>,
    pub scope_id: Option<ScopeId>,
    pub responsible_user_id: Option<UserId>,
    pub nice_to_have: bool,
    pub due_at_us: Option<i64>,
    pub unassisted_estimate: Option<i64>,
    pub ai_assisted_estimate: Option<i64>,
    pub actual_manhours: Option<i64>,
}

/// Partial update for a task; `None` fields are left untouched.
///
/// Double-option fields distinguish "leave as-is" (`None`) from
/// "set to NULL" (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub project_id: Option<Option<ProjectId>>,
    pub scope_id: Option<Option<ScopeId>>,
    pub responsible_user_id: Option<Option<UserId>>,
    pub nice_to_have: Option<bool>,
    pub due_at_us: Option<Option<i64>>,
    pub unassisted_estimate: Option<Option<i64>>,
    pub ai_assisted_estimate: Option<Option<i64>>,
    pub actual_manhours: Option<Option<i64>>,
}

impl TaskPatch {
    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.project_id.is_none()
            && self.scope_id.is_none()
            && self.responsible_user_id.is_none()
            && self.nice_to_have.is_none()
            && self.due_at_us.is_none()
            && self.unassisted_estimate.is_none()
            && self.ai_assisted_estimate.is_none()
            && self.actual_manhours.is_none()
    }
}
