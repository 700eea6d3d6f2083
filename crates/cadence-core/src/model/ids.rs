//! Typed row identifiers.
//!
//! Every table gets its own id newtype so a `TaskId` can never be passed
//! where a `ProjectId` is expected. All of them serialize as plain integers.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            /// The raw integer value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(
    /// Identifier of an organization.
    OrgId
);
id_newtype!(
    /// Identifier of a team.
    TeamId
);
id_newtype!(
    /// Identifier of a user.
    UserId
);
id_newtype!(
    /// Identifier of a project.
    ProjectId
);
id_newtype!(
    /// Identifier of a scope.
    ScopeId
);
id_newtype!(
    /// Identifier of a task.
    TaskId
);
id_newtype!(
    /// Identifier of a transition row (task or project risk).
    TransitionId
);
id_newtype!(
    /// Identifier of a note.
    NoteId
);
id_newtype!(
    /// Identifier of a link.
    LinkId
);
id_newtype!(
    /// Identifier of an attachment.
    AttachmentId
);
id_newtype!(
    /// Identifier of an audit version row.
    VersionId
);

#[cfg(test)]
mod tests {
    use super::{TaskId, UserId};

    #[test]
    fn ids_serialize_as_plain_integers() {
        let id = TaskId(42);
        assert_eq!(serde_json::to_string(&id).expect("serialize"), "42");
        let back: TaskId = serde_json::from_str("42").expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn ids_display_their_value() {
        assert_eq!(UserId(7).to_string(), "7");
        assert_eq!(UserId(7).get(), 7);
    }
}
