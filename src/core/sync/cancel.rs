/*!
 * Cancellation Tokens
 *
 * Per-call cancellation source for `TimeoutCond::wait`: an explicit cancel
 * trigger, a deadline, or both. Tokens form a tree; a child is done when
 * it or any ancestor is cancelled, and its deadline is never later than its
 * parent's.
 *
 * # Mechanism
 *
 * Every cancellable token owns the only sender of a zero-capacity channel.
 * `cancel` drops that sender, so waiters selecting on the receiver wake with
 * a disconnection. Nothing is ever sent on it.
 */

use super::errors::WaitError;
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::fmt;
use std::iter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

struct Trigger {
    tx: Mutex<Option<Sender<()>>>,
    rx: Receiver<()>,
}

impl Trigger {
    fn new() -> Self {
        let (tx, rx) = flume::bounded(0);
        Self {
            tx: Mutex::new(Some(tx)),
            rx,
        }
    }

    fn fire(&self) -> bool {
        self.tx.lock().take().is_some()
    }

    fn is_fired(&self) -> bool {
        self.rx.is_disconnected()
    }
}

struct TokenInner {
    trigger: Option<Trigger>,
    deadline: Option<Instant>,
    parent: Option<CancellationToken>,
}

/// Cancellation source for a wait
///
/// Cloning is cheap and clones share cancellation state.
///
/// # Example
///
/// ```
/// use timeout_cond::CancellationToken;
/// use std::time::Duration;
///
/// let root = CancellationToken::new();
/// let child = root.child_with_timeout(Duration::from_secs(5));
/// assert!(!child.is_done());
///
/// root.cancel();
/// assert!(child.is_cancelled());
/// ```
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl CancellationToken {
    /// Token that fires only when `cancel` is called
    pub fn new() -> Self {
        Self::build(Some(Trigger::new()), None, None)
    }

    /// Token that never fires; `cancel` on it is a no-op
    pub fn never() -> Self {
        Self::build(None, None, None)
    }

    /// Token that fires `timeout` from now, or earlier on `cancel`
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(deadline_after(timeout))
    }

    /// Token that fires at `deadline`, or earlier on `cancel`
    pub fn with_deadline(deadline: Instant) -> Self {
        Self::build(Some(Trigger::new()), Some(deadline), None)
    }

    /// Child token, cancelled along with this one or on its own
    pub fn child_token(&self) -> Self {
        Self::build(Some(Trigger::new()), self.inner.deadline, Some(self.clone()))
    }

    /// Child token whose deadline is the earlier of `timeout` from now and this token's deadline
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        self.child_with_deadline(deadline_after(timeout))
    }

    /// Child token whose deadline is the earlier of `deadline` and this token's deadline
    pub fn child_with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.inner.deadline {
            Some(parent) => parent.min(deadline),
            None => deadline,
        };
        Self::build(Some(Trigger::new()), Some(deadline), Some(self.clone()))
    }

    fn build(trigger: Option<Trigger>, deadline: Option<Instant>, parent: Option<Self>) -> Self {
        Self {
            inner: Arc::new(TokenInner {
                trigger,
                deadline,
                parent,
            }),
        }
    }

    /// Cancel this token and every token derived from it
    ///
    /// Idempotent. Ancestors are not affected.
    pub fn cancel(&self) {
        if let Some(trigger) = &self.inner.trigger {
            if trigger.fire() {
                trace!("cancellation token fired");
            }
        }
    }

    /// Whether this token or an ancestor was cancelled explicitly
    pub fn is_cancelled(&self) -> bool {
        self.lineage()
            .any(|token| token.inner.trigger.as_ref().is_some_and(Trigger::is_fired))
    }

    /// Effective deadline, already clamped to every ancestor's deadline
    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Whether the deadline has passed
    pub fn is_expired(&self) -> bool {
        self.inner
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Whether a wait on this token would return immediately
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.is_expired()
    }

    /// Time left before the deadline (`None` without one)
    pub fn remaining(&self) -> Option<Duration> {
        self.inner
            .deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Receivers that disconnect when this token or an ancestor is cancelled
    pub(crate) fn triggers(&self) -> impl Iterator<Item = &Receiver<()>> + '_ {
        self.lineage()
            .filter_map(|token| token.inner.trigger.as_ref().map(|trigger| &trigger.rx))
    }

    /// Error describing why this token is done, cancellation taking precedence
    pub(crate) fn error(&self) -> Option<WaitError> {
        if self.is_cancelled() {
            Some(WaitError::Cancelled)
        } else if self.is_expired() {
            Some(WaitError::TimedOut)
        } else {
            None
        }
    }

    fn lineage(&self) -> impl Iterator<Item = &CancellationToken> + '_ {
        iter::successors(Some(self), |token| token.inner.parent.as_ref())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.inner.deadline)
            .finish()
    }
}

// Far-future instants can overflow `Instant` arithmetic; treat them as "no sooner than ~100 years".
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(100 * 365 * 24 * 60 * 60))
}
