use crate::common::{MemberId, ViewId};
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::Notify;

#[derive(Debug)]
struct Outstanding {
    view_id: ViewId,
    waiting: HashSet<MemberId>,
}

/// Collects `ViewAck`s for the prepare the local coordinator sent last.
#[derive(Debug, Default)]
pub(crate) struct ViewAcks {
    outstanding: Mutex<Option<Outstanding>>,
    notify: Notify,
}

impl ViewAcks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start waiting for `recipients` to acknowledge `view_id`.
    pub(crate) fn expect(&self, view_id: ViewId, recipients: impl IntoIterator<Item = MemberId>) {
        *self.outstanding.lock() = Some(Outstanding {
            view_id,
            waiting: recipients.into_iter().collect(),
        });
    }

    /// Returns `false` when the ack does not match the outstanding prepare.
    pub(crate) fn record(&self, view_id: ViewId, sender: &MemberId) -> bool {
        let mut outstanding = self.outstanding.lock();

        let matched = match outstanding.as_mut() {
            Some(o) if o.view_id == view_id => o.waiting.remove(sender),
            _ => false,
        };

        if matched {
            self.notify.notify_one();
        }
        matched
    }

    /// A member left while we were waiting on it.
    pub(crate) fn forget(&self, member: &MemberId) {
        if let Some(o) = self.outstanding.lock().as_mut() {
            if o.waiting.remove(member) {
                self.notify.notify_one();
            }
        }
    }

    pub(crate) fn missing(&self) -> HashSet<MemberId> {
        self.outstanding
            .lock()
            .as_ref()
            .map(|o| o.waiting.clone())
            .unwrap_or_default()
    }

    fn is_complete(&self) -> bool {
        self.outstanding
            .lock()
            .as_ref()
            .map_or(true, |o| o.waiting.is_empty())
    }

    /// Resolves once every expected member has acknowledged.
    ///
    /// Callers bound this with a timeout.
    pub(crate) async fn wait_all(&self) {
        while !self.is_complete() {
            self.notify.notified().await;
        }
    }

    pub(crate) fn clear(&self) {
        *self.outstanding.lock() = None;
    }
}
