use std::fmt;

use thiserror::Error;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidTransition,
    ConcurrencyConflict,
    Unauthorized,
    NotFound,
    InvalidTimeRange,
    NoActivity,
    StorageFailure,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidTransition => "E2001",
            Self::ConcurrencyConflict => "E2002",
            Self::Unauthorized => "E3001",
            Self::NotFound => "E3002",
            Self::InvalidTimeRange => "E4001",
            Self::NoActivity => "E4002",
            Self::StorageFailure => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidTransition => "Invalid state transition",
            Self::ConcurrencyConflict => "Concurrent transition conflict",
            Self::Unauthorized => "Not authorized",
            Self::NotFound => "Record not found",
            Self::InvalidTimeRange => "Invalid time range",
            Self::NoActivity => "No recent activity",
            Self::StorageFailure => "Storage failure",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidTransition => {
                Some("Check allowed transitions from the current state before retrying.")
            }
            Self::ConcurrencyConflict => {
                Some("Another transition landed first. Re-read the entity and retry.")
            }
            Self::Unauthorized => None,
            Self::NotFound => None,
            Self::InvalidTimeRange => Some("start_time must be before end_time."),
            Self::NoActivity => {
                Some("Nothing to summarize in the window. Fall back to a blank template.")
            }
            Self::StorageFailure => Some("Check disk space and database file permissions."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Core error taxonomy.
///
/// A rejected transition leaves the entity's state and transition log
/// completely unchanged. Audit-query failures return before any partial
/// result is assembled.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Requested edge does not exist in the machine graph, or a guard failed.
    #[error(
        "cannot transition from {from} to {to}. Allowed transitions: {}",
        format_allowed(.allowed)
    )]
    InvalidTransition {
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    /// Race on `sort_key`/`most_recent`; transient, retried before surfacing.
    #[error("concurrent transition conflict; retry the request")]
    ConcurrencyConflict,

    /// Actor lacks access to the target record or team scope. Never retried.
    #[error("{0}")]
    Unauthorized(String),

    /// Entity id does not resolve, or resolves outside the actor's visible
    /// scope (deliberately indistinguishable to avoid existence leaks).
    #[error("{kind} not found with ID: {id}")]
    NotFound { kind: &'static str, id: i64 },

    /// Audit query window malformed; rejected before any query executes.
    #[error("start_time must be before end_time")]
    InvalidTimeRange,

    /// Nothing to summarize; callers fall back to a blank template.
    #[error("no recent activity found")]
    NoActivity,

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// The stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::ConcurrencyConflict => ErrorCode::ConcurrencyConflict,
            Self::Unauthorized(_) => ErrorCode::Unauthorized,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::InvalidTimeRange => ErrorCode::InvalidTimeRange,
            Self::NoActivity => ErrorCode::NoActivity,
            Self::Db(_) | Self::Json(_) => ErrorCode::StorageFailure,
        }
    }

    /// Returns `true` for transient conditions worth an immediate retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

fn format_allowed(allowed: &[String]) -> String {
    if allowed.is_empty() {
        "(none)".to_string()
    } else {
        allowed.join(", ")
    }
}
