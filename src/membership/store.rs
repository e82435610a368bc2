use super::view::View;
use crate::{
    common::ViewId,
    error::{Error, Result},
};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

/// Where the two-phase view change stands on this member.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Phase {
    Idle,
    /// A candidate has been proposed but not committed.
    Prepared(Arc<View>),
    /// The local coordinator is committing this candidate.
    Committing(Arc<View>),
}

impl Phase {
    fn pending(&self) -> Option<&Arc<View>> {
        match self {
            Phase::Idle => None,
            Phase::Prepared(view) | Phase::Committing(view) => Some(view),
        }
    }
}

/// Owner of the installed view and of the prepared candidate.
///
/// Installed views are published through a `watch` channel, so a reader always
/// gets a complete `Arc<View>` without taking the write lock. Every mutation
/// goes through `phase`, which serializes writers.
#[derive(Debug)]
pub(crate) struct ViewStore {
    current: watch::Sender<Option<Arc<View>>>,
    phase: Mutex<Phase>,
}

impl ViewStore {
    pub(crate) fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            phase: Mutex::new(Phase::Idle),
        }
    }

    pub(crate) fn current(&self) -> Option<Arc<View>> {
        self.current.borrow().clone()
    }

    pub(crate) fn current_id(&self) -> Option<ViewId> {
        self.current.borrow().as_ref().map(|v| v.view_id())
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Arc<View>>> {
        self.current.subscribe()
    }

    pub(crate) fn prepared(&self) -> Option<Arc<View>> {
        self.phase.lock().pending().cloned()
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> Phase {
        self.phase.lock().clone()
    }

    /// Whether a view with `view_id` would be newer than the installed one.
    pub(crate) fn accepts(&self, view_id: ViewId) -> bool {
        self.current_id().map_or(true, |current| view_id > current)
    }

    /// Install `candidate` if its id is higher than the installed one.
    ///
    /// Returns the view that was replaced. Any prepared view is released.
    pub(crate) fn try_install(&self, candidate: Arc<View>) -> Result<Option<Arc<View>>> {
        let mut phase = self.phase.lock();

        if !self.accepts(candidate.view_id()) {
            return Err(Error::new_stale_view());
        }

        *phase = Phase::Idle;
        Ok(self.current.send_replace(Some(candidate)))
    }

    /// Offer a prepared candidate.
    ///
    /// The higher view id wins a conflict, an equal id replaces what was held.
    /// Losing candidates come back as `ConflictingPrepare`.
    pub(crate) fn propose_prepared(&self, candidate: Arc<View>) -> Result<()> {
        let mut phase = self.phase.lock();

        if !self.accepts(candidate.view_id()) {
            return Err(Error::new_stale_view());
        }

        if let Some(held) = phase.pending() {
            if held.view_id() > candidate.view_id() {
                return Err(Error::new_conflicting_prepare());
            }
        }

        *phase = Phase::Prepared(candidate);
        Ok(())
    }

    /// Move our own prepared candidate to committing.
    ///
    /// Fails if something else has been prepared in the meantime.
    pub(crate) fn begin_commit(&self, candidate: &Arc<View>) -> Result<()> {
        let mut phase = self.phase.lock();

        match &*phase {
            Phase::Prepared(held) if Arc::ptr_eq(held, candidate) => {
                *phase = Phase::Committing(held.clone());
                Ok(())
            }
            _ => Err(Error::new_conflicting_prepare()),
        }
    }

    /// Drop the prepared candidate if it is still `candidate`.
    pub(crate) fn abandon(&self, candidate: &Arc<View>) {
        let mut phase = self.phase.lock();

        if phase.pending().map_or(false, |held| Arc::ptr_eq(held, candidate)) {
            *phase = Phase::Idle;
        }
    }

    pub(crate) fn clear_prepared(&self) {
        *self.phase.lock() = Phase::Idle;
    }
}
