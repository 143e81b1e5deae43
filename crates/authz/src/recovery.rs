//! Bounded dependency recovery.
//!
//! Management operations sometimes fail because a dependent vertex does not
//! exist yet: adding a member to a group before the member's user vertex
//! was ever created. The platform's answer is: create the missing dependent
//! and retry, a bounded number of times.
//!
//! That contract is modeled here as an explicit state machine rather than
//! nested error handlers:
//!
//! ```text
//! Attempt --success--------------------> done
//! Attempt --missing dependency--------> RecoverDependency --ok--> Attempt
//! Attempt --fatal failure-------------> GiveUp
//! Attempt --budget exhausted----------> GiveUp
//! RecoverDependency --failure---------> GiveUp
//! ```

use snafu::Snafu;
use tracing::debug;

/// Classification of an attempt failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// A dependent vertex is missing and may be created by the recovery
    /// action.
    MissingDependency,
    /// Not recoverable by creating a dependency; give up immediately.
    Fatal,
}

/// Error type for a recovery run.
#[derive(Debug, Snafu)]
pub enum RecoveryError<E>
where
    E: std::error::Error + 'static,
{
    /// The attempt budget ran out with the dependency still missing.
    #[snafu(display("gave up after {attempts} attempts: {source}"))]
    AttemptsExhausted {
        /// Attempts consumed, counting the final one.
        attempts: u32,
        /// The last attempt's failure.
        source: E,
    },

    /// The recovery action itself failed.
    #[snafu(display("dependency recovery failed: {source}"))]
    RecoveryFailed {
        /// The recovery action's failure.
        source: E,
    },

    /// The attempt failed in a way recovery cannot address.
    #[snafu(display("unrecoverable failure: {source}"))]
    Unrecoverable {
        /// The attempt's failure.
        source: E,
    },
}

/// Machine state, carrying the failure that drove the transition.
enum State<E> {
    Attempt,
    RecoverDependency(E),
    GiveUp(E),
}

/// Runs `attempt` with bounded dependency recovery.
///
/// `classify` decides whether a failure is a missing dependency; `recover`
/// creates it. `max_attempts` bounds the total number of `attempt` calls.
///
/// # Errors
///
/// - [`RecoveryError::Unrecoverable`] for a failure classified fatal
/// - [`RecoveryError::RecoveryFailed`] when `recover` fails
/// - [`RecoveryError::AttemptsExhausted`] when the budget runs out
pub fn run_with_recovery<T, E, A, C, R>(
    max_attempts: u32,
    mut attempt: A,
    classify: C,
    mut recover: R,
) -> Result<T, RecoveryError<E>>
where
    E: std::error::Error + 'static,
    A: FnMut() -> Result<T, E>,
    C: Fn(&E) -> FailureKind,
    R: FnMut() -> Result<(), E>,
{
    let mut attempts = 0u32;
    let mut state = State::Attempt;

    loop {
        state = match state {
            State::Attempt => {
                attempts += 1;
                match attempt() {
                    Ok(value) => return Ok(value),
                    Err(err) => match classify(&err) {
                        FailureKind::Fatal => {
                            return Err(RecoveryError::Unrecoverable { source: err });
                        },
                        FailureKind::MissingDependency if attempts >= max_attempts => {
                            State::GiveUp(err)
                        },
                        FailureKind::MissingDependency => State::RecoverDependency(err),
                    },
                }
            },
            State::RecoverDependency(cause) => {
                debug!(attempts, cause = %cause, "attempt failed on missing dependency; recovering");
                match recover() {
                    Ok(()) => State::Attempt,
                    Err(err) => return Err(RecoveryError::RecoveryFailed { source: err }),
                }
            },
            State::GiveUp(err) => {
                return Err(RecoveryError::AttemptsExhausted { attempts, source: err });
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use cohort_types::config::RecoveryConfig;

    use super::*;

    #[derive(Debug, Snafu, PartialEq)]
    enum TestError {
        #[snafu(display("user missing"))]
        UserMissing,
        #[snafu(display("group missing"))]
        GroupMissing,
        #[snafu(display("creation failed"))]
        CreationFailed,
    }

    fn classify(err: &TestError) -> FailureKind {
        match err {
            TestError::UserMissing => FailureKind::MissingDependency,
            _ => FailureKind::Fatal,
        }
    }

    /// The configured default attempt budget.
    fn max_attempts() -> u32 {
        RecoveryConfig::default().max_attempts
    }

    #[test]
    fn first_attempt_success_skips_recovery() {
        let mut recoveries = 0;
        let result: Result<i32, _> = run_with_recovery(
            max_attempts(),
            || Ok(7),
            classify,
            || {
                recoveries += 1;
                Ok(())
            },
        );
        assert_eq!(result.expect("should succeed"), 7);
        assert_eq!(recoveries, 0);
    }

    #[test]
    fn missing_dependency_recovers_then_succeeds() {
        let created = std::cell::Cell::new(false);
        let mut attempts = 0;
        let result = run_with_recovery(
            max_attempts(),
            || {
                attempts += 1;
                if created.get() { Ok("added") } else { Err(TestError::UserMissing) }
            },
            classify,
            || {
                created.set(true);
                Ok(())
            },
        );
        assert_eq!(result.expect("should succeed"), "added");
        assert_eq!(attempts, 2);
    }

    #[test]
    fn fatal_failure_gives_up_immediately() {
        let mut attempts = 0;
        let result: Result<(), _> = run_with_recovery(
            max_attempts(),
            || {
                attempts += 1;
                Err(TestError::GroupMissing)
            },
            classify,
            || Ok(()),
        );
        assert!(matches!(result, Err(RecoveryError::Unrecoverable { .. })));
        assert_eq!(attempts, 1);
    }

    #[test]
    fn budget_exhaustion_gives_up() {
        let mut attempts = 0;
        let result: Result<(), _> = run_with_recovery(
            max_attempts(),
            || {
                attempts += 1;
                Err(TestError::UserMissing)
            },
            classify,
            || Ok(()),
        );
        assert!(matches!(
            result,
            Err(RecoveryError::AttemptsExhausted { attempts: 4, .. })
        ));
        assert_eq!(attempts, 4);
    }

    #[test]
    fn failed_recovery_gives_up() {
        let result: Result<(), _> = run_with_recovery(
            max_attempts(),
            || Err(TestError::UserMissing),
            classify,
            || Err(TestError::CreationFailed),
        );
        assert!(matches!(result, Err(RecoveryError::RecoveryFailed { .. })));
    }
}
