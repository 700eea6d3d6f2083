use serde::{Deserialize, Serialize};

use super::ids::{AttachmentId, LinkId, NoteId};
use super::parent::ParentRef;

/// A note attached to a parent record through the `notables` join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub parent: ParentRef,
    pub body: String,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

/// A link attached to a parent record through the `linkables` join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub parent: ParentRef,
    pub url: String,
    pub title: Option<String>,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}

/// An attachment record through the `attachables` join. Binary content
/// lives outside this store; only descriptive fields are tracked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: AttachmentId,
    pub parent: ParentRef,
    pub filename: String,
    pub content_type: Option<String>,
    pub byte_size: Option<i64>,
    pub deleted_at_us: Option<i64>,
    pub created_at_us: i64,
    pub updated_at_us: i64,
}
