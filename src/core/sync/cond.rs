/*!
 * Timeout Condition Variable
 *
 * Condition variable whose waits can be bounded by a deadline, cancelled
 * through a token, or released all at once by an interrupt.
 *
 * # Design
 *
 * - Waiters rendezvous on a zero-capacity channel; `signal` is a
 *   non-blocking send, so it wakes at most one waiter and is lost when
 *   nobody is receiving.
 * - `interrupt` closes that channel and installs a fresh one. Every waiter
 *   still holding a receiver of the old channel wakes with "interrupted";
 *   later waiters subscribe to the new channel and are unaffected.
 * - A waiter subscribes while it still holds the caller's lock. `interrupt`
 *   swaps channels under the same lock, so a waiter can never miss a close
 *   that happens after it released the lock.
 */

use super::cancel::CancellationToken;
use super::channel::SignalChannel;
use super::errors::{WaitError, WaitResult};
use super::waiters::WaiterRegistry;
use arc_swap::ArcSwap;
use flume::{Receiver, Selector};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Why a blocked waiter woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WakeReason {
    Signaled,
    Interrupted,
    Cancelled,
    TimedOut,
}

/// Condition variable with timeout, cancellation and broadcast interrupt
///
/// Bound for its whole lifetime to one `Mutex<T>`, shared with the caller
/// through an `Arc`. The mutex guards the caller's state; this type never
/// touches `T`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::thread;
/// use std::time::Duration;
/// use timeout_cond::{CancellationToken, TimeoutCond};
///
/// let cond = Arc::new(TimeoutCond::with_value(false));
///
/// let producer = {
///     let cond = cond.clone();
///     thread::spawn(move || {
///         while !cond.has_waiters() {
///             thread::yield_now();
///         }
///         thread::sleep(Duration::from_millis(20));
///         let mut ready = cond.lock().lock();
///         *ready = true;
///         cond.signal();
///     })
/// };
///
/// let token = CancellationToken::with_timeout(Duration::from_secs(5));
/// let mut ready = cond.lock().lock();
/// while !*ready && !token.is_done() {
///     cond.wait(&mut ready, &token);
/// }
/// drop(ready);
/// producer.join().unwrap();
/// ```
pub struct TimeoutCond<T> {
    lock: Arc<Mutex<T>>,
    channel: ArcSwap<SignalChannel>,
    waiters: WaiterRegistry,
}

impl<T> TimeoutCond<T> {
    /// Bind a new condition variable to `lock`
    pub fn new(lock: Arc<Mutex<T>>) -> Self {
        Self {
            lock,
            channel: ArcSwap::from_pointee(SignalChannel::new()),
            waiters: WaiterRegistry::new(),
        }
    }

    /// Create the mutex together with the condition variable
    pub fn with_value(value: T) -> Self {
        Self::new(Arc::new(Mutex::new(value)))
    }

    /// The mutex this condition variable is bound to
    #[inline]
    pub fn lock(&self) -> &Arc<Mutex<T>> {
        &self.lock
    }

    /// Block until signaled, interrupted, or `cancel` fires
    ///
    /// `guard` must be a guard of [`TimeoutCond::lock`]. It is released while
    /// blocked and held again when this returns, on every path including
    /// unwinding.
    ///
    /// Returns `true` only when the wakeup came from [`TimeoutCond::interrupt`].
    /// A signal and an expired or cancelled token both return `false`, and
    /// neither says anything about the caller's predicate: re-check it.
    ///
    /// # Panics
    ///
    /// - If `guard` belongs to a different mutex
    /// - If the waiter count would overflow or underflow
    pub fn wait(&self, guard: &mut MutexGuard<'_, T>, cancel: &CancellationToken) -> bool {
        assert!(
            std::ptr::eq(MutexGuard::mutex(guard), Arc::as_ptr(&self.lock)),
            "TimeoutCond::wait called with a guard of a different mutex"
        );

        let registration = self.waiters.enter();
        // Must be captured before unlocking, see module docs.
        let signal = self.channel.load().subscribe();
        trace!(waiters = self.waiters.load(), "waiter registered");

        let start = Instant::now();
        let reason = MutexGuard::unlocked(guard, move || {
            let reason = block(&signal, cancel);
            drop(registration);
            reason
        });

        debug!(
            reason = ?reason,
            elapsed_us = start.elapsed().as_micros() as u64,
            "waiter woke"
        );

        reason == WakeReason::Interrupted
    }

    /// [`TimeoutCond::wait`] bounded by `timeout` instead of a token
    pub fn wait_timeout(&self, guard: &mut MutexGuard<'_, T>, timeout: Duration) -> bool {
        self.wait(guard, &CancellationToken::with_timeout(timeout))
    }

    /// Wait while `condition` holds
    ///
    /// The condition is checked before every wait and after every wakeup.
    /// Returns `Ok(())` as soon as it is false, or the reason waiting stopped
    /// while it was still true.
    pub fn wait_while<F>(
        &self,
        guard: &mut MutexGuard<'_, T>,
        cancel: &CancellationToken,
        mut condition: F,
    ) -> WaitResult<()>
    where
        F: FnMut(&mut T) -> bool,
    {
        loop {
            if !condition(&mut **guard) {
                return Ok(());
            }

            if let Some(err) = cancel.error() {
                return Err(err);
            }

            if self.wait(guard, cancel) {
                return if condition(&mut **guard) {
                    Err(WaitError::Interrupted)
                } else {
                    Ok(())
                };
            }
        }
    }

    /// Wake one waiter if any is currently blocked
    ///
    /// Should be called while holding the lock. Signals are not queued: with
    /// no blocked waiter this does nothing.
    pub fn signal(&self) {
        let delivered = self.channel.load().try_signal();
        trace!(delivered, "signal");
    }

    /// Wake every waiter blocked right now, each observing `true`
    ///
    /// Acquires the lock itself, so it must not be called while the caller
    /// holds it.
    pub fn interrupt(&self) {
        let _guard = self.lock.lock();
        let closed = self.channel.swap(Arc::new(SignalChannel::new()));
        debug!(waiters = self.waiters.load(), "interrupting waiters");
        drop(closed);
    }

    /// Whether any task is blocked in `wait`
    ///
    /// Advisory only: the count may change as soon as it is read.
    #[inline]
    pub fn has_waiters(&self) -> bool {
        self.waiters.has_waiters()
    }

    /// Number of tasks blocked in `wait` (for diagnostics)
    #[inline]
    pub fn waiter_count(&self) -> u64 {
        self.waiters.load()
    }
}

impl<T> fmt::Debug for TimeoutCond<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutCond")
            .field("waiters", &self.waiters.load())
            .finish_non_exhaustive()
    }
}

/// Block on the captured signal receiver and the token's triggers
fn block(signal: &Receiver<()>, cancel: &CancellationToken) -> WakeReason {
    let mut selector = Selector::new().recv(signal, |msg| match msg {
        Ok(()) => WakeReason::Signaled,
        Err(_) => WakeReason::Interrupted,
    });
    for trigger in cancel.triggers() {
        selector = selector.recv(trigger, |_| WakeReason::Cancelled);
    }

    let reason = match cancel.deadline() {
        Some(deadline) => selector
            .wait_deadline(deadline)
            .unwrap_or(WakeReason::TimedOut),
        None => selector.wait(),
    };

    // A send that raced the cancellation was queued for this waiter's hook.
    // Take it here so it cannot wake a later waiter.
    match reason {
        WakeReason::Cancelled | WakeReason::TimedOut if signal.try_recv().is_ok() => {
            WakeReason::Signaled
        }
        reason => reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_signal_without_waiters() {
        let cond = TimeoutCond::with_value(());
        cond.signal();
        assert!(!cond.has_waiters());
    }

    #[test]
    fn test_interrupt_without_waiters() {
        let cond = TimeoutCond::with_value(0u32);
        cond.interrupt();
        cond.interrupt();

        let mut guard = cond.lock().lock();
        assert!(!cond.wait_timeout(&mut guard, Duration::from_millis(10)));
    }

    #[test]
    fn test_wait_timeout_reacquires_lock() {
        let cond = TimeoutCond::with_value(7u32);
        let mut guard = cond.lock().lock();

        let start = Instant::now();
        let interrupted = cond.wait_timeout(&mut guard, Duration::from_millis(50));

        assert!(!interrupted);
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(*guard, 7);
        assert!(cond.lock().try_lock().is_none());
        assert!(!cond.has_waiters());
    }

    #[test]
    fn test_already_cancelled_token_returns_immediately() {
        let cond = TimeoutCond::with_value(());
        let token = CancellationToken::new();
        token.cancel();

        let mut guard = cond.lock().lock();
        let start = Instant::now();
        assert!(!cond.wait(&mut guard, &token));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    #[should_panic(expected = "too many waiters")]
    fn test_too_many_waiters() {
        let mut cond = TimeoutCond::with_value(());
        cond.waiters = WaiterRegistry::with_count(u64::MAX);

        let mut guard = cond.lock().lock();
        cond.wait(&mut guard, &CancellationToken::never());
    }

    #[test]
    #[should_panic(expected = "guard of a different mutex")]
    fn test_foreign_guard_rejected() {
        let cond = TimeoutCond::with_value(());
        let other = Mutex::new(());

        let mut guard = other.lock();
        cond.wait(&mut guard, &CancellationToken::never());
    }

    #[test]
    fn test_wait_while_satisfied_immediately() {
        let cond = TimeoutCond::with_value(3u32);
        let mut guard = cond.lock().lock();

        let result = cond.wait_while(&mut guard, &CancellationToken::never(), |n| *n < 3);
        assert_eq!(result, Ok(()));
        assert!(!cond.has_waiters());
    }

    #[test]
    fn test_wait_while_times_out() {
        let cond = TimeoutCond::with_value(0u32);
        let token = CancellationToken::with_timeout(Duration::from_millis(30));
        let mut guard = cond.lock().lock();

        let result = cond.wait_while(&mut guard, &token, |n| *n == 0);
        assert_eq!(result, Err(WaitError::TimedOut));
    }

    #[test]
    fn test_wait_while_reports_interrupt() {
        let cond = Arc::new(TimeoutCond::with_value(false));
        let waiter = {
            let cond = cond.clone();
            thread::spawn(move || {
                let mut guard = cond.lock().lock();
                cond.wait_while(&mut guard, &CancellationToken::never(), |done| !*done)
            })
        };

        while cond.waiter_count() < 1 {
            thread::yield_now();
        }
        cond.interrupt();

        assert_eq!(waiter.join().unwrap(), Err(WaitError::Interrupted));
    }

    #[test]
    fn test_debug_shows_waiters() {
        let cond = TimeoutCond::with_value(());
        assert_eq!(format!("{:?}", cond), "TimeoutCond { waiters: 0, .. }");
    }
}
