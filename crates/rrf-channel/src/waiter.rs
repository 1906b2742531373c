//! Single-completion-cell waiters.
//!
//! A [`Waiter<T>`] is handed to a producer (an IPC handler, an HTTP request)
//! and suspends *that caller*, never the Processor task. The matching
//! [`Completer<T>`] is held internally by a [`crate::Channel`] and is only
//! ever invoked by the Processor, once, when the corresponding firmware
//! event arrives. This makes the "who resolves whom" discipline explicit
//! instead of implicit in a shared event loop.

use tokio::sync::oneshot;

/// The producer side of a single-completion cell.
#[derive(Debug)]
pub struct Waiter<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Waiter<T> {
    /// Suspend until the matching [`Completer`] resolves, or return `None`
    /// if it was dropped without completing (e.g. the channel shut down).
    pub async fn wait(self) -> Option<T> {
        self.rx.await.ok()
    }
}

/// The Processor-side handle used to resolve a [`Waiter`] exactly once.
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Completer<T> {
    /// Resolve the waiter with `value`. Silently does nothing if the waiter
    /// was already dropped (the caller gave up).
    pub fn complete(self, value: T) {
        let _ = self.tx.send(value);
    }
}

/// Construct a linked completer/waiter pair.
pub fn waiter_pair<T>() -> (Completer<T>, Waiter<T>) {
    let (tx, rx) = oneshot::channel();
    (Completer { tx }, Waiter { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_resolves_wait() {
        let (completer, waiter) = waiter_pair::<u32>();
        completer.complete(42);
        assert_eq!(waiter.wait().await, Some(42));
    }

    #[tokio::test]
    async fn dropped_completer_resolves_none() {
        let (completer, waiter) = waiter_pair::<u32>();
        drop(completer);
        assert_eq!(waiter.wait().await, None);
    }
}
