/*!
 * Core Module
 * Synchronization primitives and their error types
 */

pub mod sync;

// Re-export for convenience
pub use sync::{CancellationToken, TimeoutCond, WaitError, WaitResult, WaiterCountError};
