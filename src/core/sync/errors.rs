/*!
 * Synchronization Errors
 *
 * Waiter-count invariant violations (fatal) and the recoverable outcomes
 * reported by predicate-driven waits.
 */

use miette::Diagnostic;
use thiserror::Error;

/// Result type for predicate-driven wait operations
pub type WaitResult<T> = Result<T, WaitError>;

/// Reasons a predicate-driven wait gave up while the predicate still held
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Diagnostic)]
pub enum WaitError {
    #[error("Wait was interrupted")]
    #[diagnostic(
        code(cond::interrupted),
        help("All waiters were released by an interrupt. Check for shutdown before waiting again.")
    )]
    Interrupted,

    #[error("Wait was cancelled")]
    #[diagnostic(
        code(cond::cancelled),
        help("The cancellation token was cancelled explicitly or through a parent token.")
    )]
    Cancelled,

    #[error("Wait operation timed out")]
    #[diagnostic(
        code(cond::timed_out),
        help("The token deadline elapsed before the condition was met.")
    )]
    TimedOut,
}

/// Waiter bookkeeping desynchronized
///
/// Never returned to callers: these are raised as panics because every
/// later `has_waiters` answer would be wrong.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Diagnostic)]
pub enum WaiterCountError {
    #[error("too many waiters; max is {max}")]
    #[diagnostic(code(cond::waiter_overflow))]
    Overflow { max: u64 },

    #[error("waiter removed more times than it was added")]
    #[diagnostic(
        code(cond::waiter_underflow),
        help("Every registration must be released exactly once.")
    )]
    Underflow,
}
