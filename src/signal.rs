//! One-shot completion signals between receiver workers and the sender.
//!
//! Each receiver owns the write end of one signal and sets it when it has
//! observed enough traffic; the sender polls every read end between sends,
//! without ever blocking. There is exactly one writer and one reader per
//! signal and at most one write, so no locking is involved: the signal is a
//! crossbeam channel of capacity one used purely as a flag.

use crossbeam::channel::{bounded, Receiver, Sender};

/// Creates a fresh, unset completion signal.
pub fn completion_signal() -> (CompletionSetter, CompletionWatcher) {
    let (tx, rx) = bounded(1);
    (
        CompletionSetter { tx },
        CompletionWatcher {
            rx,
            observed: false,
        },
    )
}

/// The write end of a completion signal.
///
/// Setting consumes the setter, so the signal can transition unset to set
/// at most once.
pub struct CompletionSetter {
    tx: Sender<()>,
}

impl CompletionSetter {
    /// Marks the signal as set.
    ///
    /// A watcher that is already gone is fine; the notification is simply
    /// discarded along with the rest of the run.
    pub fn set(self) {
        let _ = self.tx.try_send(());
    }
}

/// The read end of a completion signal.
pub struct CompletionWatcher {
    rx: Receiver<()>,
    observed: bool,
}

impl CompletionWatcher {
    /// Polls the signal without blocking.
    ///
    /// Returns false until the setter fires, then true forever.
    pub fn poll(&mut self) -> bool {
        if !self.observed {
            self.observed = self.rx.try_recv().is_ok();
        }
        self.observed
    }
}
