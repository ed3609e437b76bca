/*!
 * Signal Channel
 *
 * Zero-capacity rendezvous channel used as the unit of wakeup delivery.
 * Closing happens by dropping the channel: once the only sender is gone,
 * every receiver cloned from it observes disconnection.
 */

use flume::{Receiver, Sender};

pub(crate) struct SignalChannel {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl SignalChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = flume::bounded(0);
        Self { tx, rx }
    }

    /// Receiver for one waiter
    ///
    /// Only receivers leave the channel; holding one never keeps it open.
    #[inline]
    pub(crate) fn subscribe(&self) -> Receiver<()> {
        self.rx.clone()
    }

    /// Hand off one wakeup if a receiver is ready, otherwise drop it
    #[inline]
    pub(crate) fn try_signal(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}
