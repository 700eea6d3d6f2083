//! Organizations, teams, users, and membership roles.
//!
//! Membership is a `user_party_roles` row binding a user to one concrete
//! party (organization, team, or project) with a role string. The party
//! target is the closed [`PartyType`] enum, not a free-form class name.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ids::{OrgId, ProjectId, TeamId, UserId};
use super::task::ParseStateError;

/// The closed set of membership targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartyType {
    Organization,
    Team,
    Project,
}

impl PartyType {
    pub(crate) const fn as_str(self) -> &'static str {
        match self {
            Self::Organization => "organization",
            Self::Team => "team",
            Self::Project => "project",
        }
    }
}

impl fmt::Display for PartyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PartyType {
    type Err = ParseStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "organization" => Ok(Self::Organization),
            "team" => Ok(Self::Team),
            "project" => Ok(Self::Project),
            _ => Err(ParseStateError {
                expected: "party type",
                got: s.to_string(),
            }),
        }
    }
}

/// A membership target: type tag plus id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Organization(OrgId),
    Team(TeamId),
    Project(ProjectId),
}

impl Party {
    /// The type tag for storage.
    #[must_use]
    pub const fn party_type(self) -> PartyType {
        match self {
            Self::Organization(_) => PartyType::Organization,
            Self::Team(_) => PartyType::Team,
            Self::Project(_) => PartyType::Project,
        }
    }

    /// The raw target id for storage.
    #[must_use]
    pub const fn party_id(self) -> i64 {
        match self {
            Self::Organization(id) => id.0,
            Self::Team(id) => id.0,
            Self::Project(id) => id.0,
        }
    }
}

/// An organization row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrgId,
    pub name: String,
    pub timezone: String,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

/// A team row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: TeamId,
    pub organization_id: OrgId,
    pub name: String,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

/// A user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

impl User {
    /// Display form used in audit output: `Name (email)`.
    #[must_use]
    pub fn display(&self) -> String {
        format!("{} ({})", self.name, self.email)
    }
}
