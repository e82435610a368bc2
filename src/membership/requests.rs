use super::view::View;
use crate::{common::MemberId, transport::proto::Credentials};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::Notify;

/// A membership change waiting for the next view.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewRequest {
    Join {
        sender: MemberId,
        member: MemberId,
        credentials: Option<Credentials>,
    },
    Leave {
        sender: MemberId,
        member: MemberId,
        reason: String,
    },
    Remove {
        sender: MemberId,
        member: MemberId,
        reason: String,
    },
}

impl ViewRequest {
    pub fn member(&self) -> &MemberId {
        match self {
            ViewRequest::Join { member, .. }
            | ViewRequest::Leave { member, .. }
            | ViewRequest::Remove { member, .. } => member,
        }
    }

    pub fn sender(&self) -> &MemberId {
        match self {
            ViewRequest::Join { sender, .. }
            | ViewRequest::Leave { sender, .. }
            | ViewRequest::Remove { sender, .. } => sender,
        }
    }

    fn is_departure(&self) -> bool {
        !matches!(self, ViewRequest::Join { .. })
    }
}

/// Everything queued about a single member.
///
/// A member may have both a join and a departure pending; which one takes
/// effect depends on whether it is in the view when the next view is built.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct PendingChange {
    pub(crate) join: Option<ViewRequest>,
    pub(crate) departure: Option<ViewRequest>,
    /// Times this change was part of a candidate that could not be delivered.
    pub(crate) attempts: usize,
}

impl PendingChange {
    fn record(&mut self, request: ViewRequest) -> bool {
        if request.is_departure() {
            match (&self.departure, &request) {
                (None, _) => {}
                // A removal is stronger than a leave and replaces it.
                (Some(ViewRequest::Leave { .. }), ViewRequest::Remove { .. }) => {}
                _ => return false,
            }
            self.departure = Some(request);
        } else {
            if self.join.is_some() {
                return false;
            }
            self.join = Some(request);
        }

        true
    }

    fn merge(&mut self, other: PendingChange) {
        if let Some(join) = other.join {
            self.record(join);
        }
        if let Some(departure) = other.departure {
            self.record(departure);
        }
        self.attempts = self.attempts.max(other.attempts);
    }

    pub(crate) fn requests(&self) -> impl Iterator<Item = &ViewRequest> {
        self.join.iter().chain(self.departure.iter())
    }
}

/// Pending view requests keyed by the member they are about.
///
/// Producers are the message handlers, the only consumer is the view creator,
/// which is woken through `notify`.
#[derive(Debug, Default)]
pub(crate) struct ViewRequests {
    pending: Mutex<IndexMap<MemberId, PendingChange>>,
    notify: Notify,
}

impl ViewRequests {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue a request. Returns `false` if an equivalent one was already queued.
    pub(crate) fn push(&self, request: ViewRequest) -> bool {
        let added = self
            .pending
            .lock()
            .entry(request.member().clone())
            .or_default()
            .record(request);

        if added {
            self.notify.notify_one();
        }
        added
    }

    /// Put back changes taken by [`ViewRequests::drain`] that did not make it
    /// into a view. Changes queued in the meantime are kept.
    pub(crate) fn requeue(&self, changes: Vec<(MemberId, PendingChange)>) {
        if changes.is_empty() {
            return;
        }

        let mut pending = self.pending.lock();
        for (member, change) in changes {
            pending.entry(member).or_default().merge(change);
        }
        drop(pending);

        self.notify.notify_one();
    }

    /// Take everything queued, in arrival order.
    pub(crate) fn drain(&self) -> Vec<(MemberId, PendingChange)> {
        self.pending.lock().drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.pending
            .lock()
            .values()
            .map(|change| change.requests().count())
            .sum()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub(crate) fn snapshot(&self) -> Vec<ViewRequest> {
        self.pending
            .lock()
            .values()
            .flat_map(|change| change.requests().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Drop the requests `view` has already applied and return how many went.
    ///
    /// A join is settled once its member is in the view or listed as departed,
    /// a departure once its member is no longer in the view.
    pub(crate) fn prune(&self, view: &View) -> usize {
        let mut pending = self.pending.lock();
        let before = pending.values().map(|c| c.requests().count()).sum::<usize>();

        pending.retain(|member, change| {
            let present = view.contains(member);
            let departed =
                view.shutdown_members().contains(member) || view.crashed_members().contains(member);

            if present || departed {
                change.join = None;
            }
            if !present {
                change.departure = None;
            }
            change.join.is_some() || change.departure.is_some()
        });

        before - pending.values().map(|c| c.requests().count()).sum::<usize>()
    }

    /// Resolves once something has been queued since the last wake up.
    pub(crate) async fn notified(&self) {
        self.notify.notified().await
    }

    /// Wake the consumer without queueing anything, used to deliver stop signals.
    pub(crate) fn wake(&self) {
        self.notify.notify_one();
    }
}
