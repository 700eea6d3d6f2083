//! State machine engine.
//!
//! Each machine is a statically declared graph (edges live on the state
//! enums in `model`) plus optional guards evaluated against the owning
//! entity's current attributes. Applying a transition is one atomic unit:
//! re-validate, allocate the next `sort_key`, insert the new most-recent
//! row, flip the previous flag, update the owner's cached state column,
//! commit. A rejected transition leaves everything untouched.

pub mod risk;
pub mod task;

use crate::error::{CoreError, CoreResult};

/// Bounded immediate retry for transient conflicts.
///
/// Two concurrent writers racing on one owner's `sort_key`/most-recent
/// slot is transient: the loser re-runs once against the winner's state.
pub(crate) fn with_conflict_retry<T>(mut run: impl FnMut() -> CoreResult<T>) -> CoreResult<T> {
    match run() {
        Err(CoreError::ConcurrencyConflict) => {
            tracing::warn!("transition conflict, retrying once");
            run()
        }
        other => other,
    }
}

pub(crate) use crate::clock::now_us;

#[cfg(test)]
mod tests {
    use super::with_conflict_retry;
    use crate::error::CoreError;

    #[test]
    fn retries_once_on_conflict() {
        let mut attempts = 0;
        let result = with_conflict_retry(|| {
            attempts += 1;
            if attempts == 1 {
                Err(CoreError::ConcurrencyConflict)
            } else {
                Ok(attempts)
            }
        });
        assert_eq!(result.expect("second attempt wins"), 2);
    }

    #[test]
    fn conflict_on_both_attempts_surfaces() {
        let result: Result<(), _> = with_conflict_retry(|| Err(CoreError::ConcurrencyConflict));
        assert!(matches!(result, Err(CoreError::ConcurrencyConflict)));
    }

    #[test]
    fn non_transient_errors_do_not_retry() {
        let mut attempts = 0;
        let result: Result<(), _> = with_conflict_retry(|| {
            attempts += 1;
            Err(CoreError::InvalidTimeRange)
        });
        assert!(matches!(result, Err(CoreError::InvalidTimeRange)));
        assert_eq!(attempts, 1);
    }
}
