//! Observable value backed by a `tokio::sync::watch` channel.

use tokio::sync::watch;

/// A value that notifies subscribers on every change.
///
/// Writes succeed whether or not anyone is subscribed. Readers get clones;
/// the lock inside the channel is never held across an `.await`.
#[derive(Debug)]
pub struct Observable<S> {
    tx: watch::Sender<S>,
}

impl<S: Default> Default for Observable<S> {
    fn default() -> Self {
        Self::new(S::default())
    }
}

impl<S> Observable<S> {
    /// Create an observable holding `initial`.
    #[must_use]
    pub fn new(initial: S) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    /// Read the current value through `f`.
    pub fn with<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the value, returning the previous one.
    pub fn replace(&self, value: S) -> S {
        self.tx.send_replace(value)
    }

    /// Modify the value in place.
    pub fn modify(&self, f: impl FnOnce(&mut S)) {
        self.tx.send_modify(f);
    }

    /// Subscribe to changes. The receiver starts at the current value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

impl<S: Clone> Observable<S> {
    /// Clone the current value.
    #[must_use]
    pub fn get(&self) -> S {
        self.tx.borrow().clone()
    }
}
