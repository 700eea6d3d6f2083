//! Domain model: typed ids, hierarchy records, and workflow state enums.

pub mod ids;
pub mod note;
pub mod parent;
pub mod party;
pub mod project;
pub mod scope;
pub mod task;

pub use ids::{
    AttachmentId, LinkId, NoteId, OrgId, ProjectId, ScopeId, TaskId, TeamId, TransitionId, UserId,
    VersionId,
};
pub use note::{Attachment, Link, Note};
pub use parent::{ChildKind, ParentRef};
pub use party::{Organization, Party, PartyType, Team, User};
pub use project::{NewProject, Project, RiskState};
pub use scope::{NewScope, Scope};
pub use task::{NewTask, ParseStateError, Task, TaskPatch, TaskState};
