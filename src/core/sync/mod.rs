/*!
 * Synchronization Primitives
 *
 * Condition variable with bounded and cancellable waits:
 * - Waiter registry: checked atomic count of blocked tasks
 * - Signal channel: rendezvous handoff, replaced on every interrupt
 * - Cancellation tokens: explicit cancel and deadlines, per wait
 *
 * # Use Cases
 *
 * - **Worker pools**: idle workers wait for jobs with a shutdown interrupt
 * - **Bounded polling**: wait for state changes without hanging forever
 */

mod cancel;
mod channel;
mod cond;
mod errors;
mod waiters;

pub use cancel::CancellationToken;
pub use cond::TimeoutCond;
pub use errors::{WaitError, WaitResult, WaiterCountError};
