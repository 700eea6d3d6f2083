//! Fire-and-forget notification sink for transition events.
//!
//! The engine pushes a `TransitionEvent` after every successful commit.
//! Delivery is best-effort: sink implementations handle their own failures
//! (log and swallow) and must never block or propagate errors back into
//! the transition path.

use serde::Serialize;
use tracing::info;

use crate::model::{ProjectId, TaskId, TransitionId};

/// The owning entity of a recorded transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum TransitionOwner {
    Task(TaskId),
    Project(ProjectId),
}

/// A committed state change, as seen by notification consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub owner: TransitionOwner,
    pub transition_id: TransitionId,
    pub to_state: String,
    pub sort_key: i64,
    pub user_id: Option<i64>,
    pub created_at_us: i64,
}

/// Receives transition events after commit.
pub trait NotificationSink {
    fn transition_recorded(&self, event: &TransitionEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn transition_recorded(&self, _event: &TransitionEvent) {}
}

/// Logs each event through `tracing`; stands in for the real-time push
/// channel in CLI and test contexts.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn transition_recorded(&self, event: &TransitionEvent) {
        info!(
            owner = ?event.owner,
            to_state = %event.to_state,
            sort_key = event.sort_key,
            "transition recorded"
        );
    }
}
