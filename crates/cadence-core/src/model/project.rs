use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::{ProjectId, TeamId};
use super::task::ParseStateError;

/// Risk lifecycle states for a project. The graph is fully connected:
/// every state can move to either other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskState {
    Green,
    Yellow,
    Red,
}

impl RiskState {
    /// The machine's initial state for projects that never transitioned.
    pub const INITIAL: Self = Self::Green;

    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Green => "green",
            Self::Yellow => "yellow",
            Self::Red => "red",
        }
    }

    /// States reachable from `self`. Fully connected, no self-loops.
    #[must_use]
    pub const fn edges(self) -> &'static [Self] {
        match self {
            Self::Green => &[Self::Yellow, Self::Red],
            Self::Yellow => &[Self::Green, Self::Red],
            Self::Red => &[Self::Yellow, Self::Green],
        }
    }

    /// Whether an edge `self -> target` exists.
    #[must_use]
    pub fn has_edge_to(self, target: Self) -> bool {
        self.edges().contains(&target)
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskState {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "green" => Ok(Self::Green),
            "yellow" => Ok(Self::Yellow),
            "red" => Ok(Self::Red),
            _ => Err(ParseStateError {
                expected: "risk state",
                got: s.to_string(),
            }),
        }
    }
}

/// All persisted fields for a project row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub team_id: Option<TeamId>,
    pub name: String,
    pub description: Option<String>,
    pub risk_state: RiskState,
    pub cached_unassisted_estimate: i64,
    pub cached_ai_assisted_estimate: i64,
    pub cached_actual_manhours: i64,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl Project {
    /// Whether the row is soft-deleted.
    #[must_use]
    pub const fn deleted(&self) -> bool {
        self.deleted_at_us.is_some()
    }
}

/// Caller-supplied fields for creating a project.
#[derive(Debug, Clone, Default)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    pub team_id: Option<TeamId>,
}
