/*!
 * Timeout Condition Variable
 *
 * Condition variable whose waits can time out, be cancelled through a
 * token, or be released all at once by an interrupt, on top of the usual
 * wait/signal discipline around an external `parking_lot::Mutex`.
 */

pub mod core;
pub mod monitoring;

// Re-exports
pub use crate::core::sync::{
    CancellationToken, TimeoutCond, WaitError, WaitResult, WaiterCountError,
};
pub use crate::monitoring::{init_test_tracing, init_tracing};
