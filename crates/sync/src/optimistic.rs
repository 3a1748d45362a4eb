//! Optimistic update with refetch-based reconciliation.
//!
//! Every mutation against a backend follows the same three steps:
//!
//! 1. apply a patch to displayed state (possibly a no-op)
//! 2. await the backend call
//! 3. reconcile according to a [`Reconcile`] policy
//!
//! Rollback is done by refetching authoritative state, never by computing an
//! inverse patch. If that refetch also fails, the pre-patch snapshot is put
//! back so displayed state never keeps an unconfirmed change.
//!
//! A [`LiveGuard`] lets the consumer detach (e.g. the view unmounts) while a
//! call is in flight: the call still completes, but its result no longer
//! touches displayed state.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, warn};

use crate::error::Result;
use crate::state::Observable;

/// What to do with displayed state once the backend call has settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Replace state with a refetch on success; restore the snapshot on
    /// failure. Cart mutations.
    RefetchOnSuccess,
    /// Refetch whatever the outcome. Cart clear, where partial failure is
    /// expected.
    RefetchAlways,
    /// Keep the patch on success; refetch to roll back on failure.
    /// Favorites.
    RefetchOnFailure,
}

/// Shared flag telling in-flight operations whether anyone still cares.
#[derive(Debug, Clone)]
pub struct LiveGuard(Arc<AtomicBool>);

impl Default for LiveGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveGuard {
    /// A live guard.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Stop applying results. Irreversible.
    pub fn detach(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether results should still be applied.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One optimistic mutation over an [`Observable`].
#[derive(Debug)]
pub struct OptimisticUpdate<'a, S> {
    state: &'a Observable<S>,
    guard: &'a LiveGuard,
    reconcile: Reconcile,
}

impl<'a, S: Clone> OptimisticUpdate<'a, S> {
    #[must_use]
    pub const fn new(state: &'a Observable<S>, guard: &'a LiveGuard, reconcile: Reconcile) -> Self {
        Self {
            state,
            guard,
            reconcile,
        }
    }

    /// Apply `patch`, await `call`, then reconcile.
    ///
    /// `refetch` is only invoked when the policy asks for it. Returns the
    /// outcome of `call`, unless a refetch required after a successful call
    /// fails, in which case that error is returned.
    ///
    /// # Errors
    ///
    /// Returns the error of `call`, or of a required post-success refetch.
    pub async fn run<T, P, C, R, RF>(self, patch: P, call: C, refetch: R) -> Result<T>
    where
        P: FnOnce(&mut S),
        C: Future<Output = Result<T>>,
        R: FnOnce() -> RF,
        RF: Future<Output = Result<S>>,
    {
        let snapshot = self.state.get();
        if self.guard.is_live() {
            self.state.modify(patch);
        }

        let outcome = call.await;

        if !self.guard.is_live() {
            debug!("Consumer detached, discarding result");
            return outcome;
        }

        match (&outcome, self.reconcile) {
            (Ok(_), Reconcile::RefetchOnFailure) => outcome,
            (Ok(_), Reconcile::RefetchOnSuccess | Reconcile::RefetchAlways) => {
                match refetch().await {
                    Ok(fresh) => {
                        self.apply(fresh);
                        outcome
                    }
                    Err(e) => {
                        warn!(error = %e, "Refetch after successful mutation failed");
                        self.restore(snapshot);
                        Err(e)
                    }
                }
            }
            (Err(_), Reconcile::RefetchOnSuccess) => {
                self.restore(snapshot);
                outcome
            }
            (Err(e), Reconcile::RefetchOnFailure | Reconcile::RefetchAlways) => {
                debug!(error = %e, "Mutation failed, refetching to reconcile");
                match refetch().await {
                    Ok(fresh) => self.apply(fresh),
                    Err(refetch_err) => {
                        warn!(error = %refetch_err, "Rollback refetch failed, restoring snapshot");
                        self.restore(snapshot);
                    }
                }
                outcome
            }
        }
    }

    fn apply(&self, fresh: S) {
        if self.guard.is_live() {
            self.state.replace(fresh);
        }
    }

    fn restore(&self, snapshot: S) {
        if self.guard.is_live() {
            self.state.replace(snapshot);
        }
    }
}
