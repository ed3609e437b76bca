/*!
 * Waiter Registry
 *
 * Atomic count of tasks blocked inside `TimeoutCond::wait`, with explicit
 * bounds checks on both edges.
 */

use super::errors::WaiterCountError;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::error;

pub(crate) struct WaiterRegistry {
    count: AtomicU64,
}

impl WaiterRegistry {
    pub(crate) const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    #[cfg(test)]
    pub(crate) const fn with_count(count: u64) -> Self {
        Self {
            count: AtomicU64::new(count),
        }
    }

    /// Add one waiter, returning the new count
    ///
    /// # Panics
    ///
    /// If the count is already `u64::MAX`.
    #[track_caller]
    pub(crate) fn register(&self) -> u64 {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_add(1))
        {
            Ok(prev) => prev + 1,
            Err(_) => fatal(WaiterCountError::Overflow { max: u64::MAX }),
        }
    }

    /// Remove one waiter, returning the new count
    ///
    /// # Panics
    ///
    /// If no waiter is registered.
    #[track_caller]
    pub(crate) fn unregister(&self) -> u64 {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => fatal(WaiterCountError::Underflow),
        }
    }

    /// Register and hand back a guard that unregisters on drop
    #[track_caller]
    pub(crate) fn enter(&self) -> Registration<'_> {
        self.register();
        Registration { registry: self }
    }

    #[inline]
    pub(crate) fn load(&self) -> u64 {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn has_waiters(&self) -> bool {
        self.load() > 0
    }
}

/// One registered waiter; releasing it is tied to drop so unwinding balances the count too
pub(crate) struct Registration<'a> {
    registry: &'a WaiterRegistry,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.unregister();
    }
}

#[cold]
#[track_caller]
fn fatal(err: WaiterCountError) -> ! {
    error!(error = %err, "waiter count invariant violated");
    panic!("{}", err)
}
