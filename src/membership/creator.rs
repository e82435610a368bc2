use super::{
    requests::{PendingChange, ViewRequest},
    view::View,
    Inner,
};
use crate::{
    common::MemberId,
    error::{Error, ErrorKind, Result},
    transport::proto::{InstallView, Message},
};
use futures::future::join_all;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering},
        Arc,
    },
};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// What the view creator of the local member is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatorState {
    /// Waiting for requests.
    Waiting,
    /// Building, preparing or committing a view.
    Building,
    Stopped,
}

impl CreatorState {
    fn from_u8(state: u8) -> Self {
        match state {
            0 => CreatorState::Waiting,
            1 => CreatorState::Building,
            _ => CreatorState::Stopped,
        }
    }
}

/// State shared between a running view creator and the engine.
#[derive(Debug)]
pub(crate) struct CreatorStatus {
    state: AtomicU8,
    cancelled: AtomicBool,
}

impl CreatorStatus {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(CreatorState::Waiting as u8),
            cancelled: AtomicBool::new(false),
        }
    }

    pub(crate) fn state(&self) -> CreatorState {
        CreatorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set(&self, state: CreatorState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Ask the creator to exit at its next check.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A candidate view together with the changes it was built from.
struct Candidate {
    view: Arc<View>,
    changes: Vec<(MemberId, PendingChange)>,
    joiners: HashSet<MemberId>,
    departing: Vec<MemberId>,
}

/// Turns queued requests into new views while the local member coordinates.
pub(crate) struct ViewCreator {
    inner: Arc<Inner>,
    status: Arc<CreatorStatus>,
    /// Highest view id another proposer held against us. Candidates are
    /// numbered above it so a prepare whose proposer died cannot block us.
    conflict_floor: AtomicU64,
}

impl ViewCreator {
    pub(crate) fn new(inner: Arc<Inner>, status: Arc<CreatorStatus>) -> Self {
        Self {
            inner,
            status,
            conflict_floor: AtomicU64::new(0),
        }
    }

    fn should_stop(&self) -> bool {
        self.status.is_cancelled() || self.inner.is_stopping()
    }

    pub(crate) async fn run(self) {
        debug!("view creator started");

        while !self.should_stop() {
            self.status.set(CreatorState::Waiting);

            if self.inner.requests.is_empty() {
                // Bounded so an external stop request is noticed while idle.
                let _ = timeout(
                    self.inner.config.idle_poll_interval,
                    self.inner.requests.notified(),
                )
                .await;
                continue;
            }

            sleep(self.inner.config.batching_window).await;
            if self.should_stop() {
                break;
            }

            self.status.set(CreatorState::Building);
            if let Err(error) = self.create_view().await {
                match error.kind() {
                    ErrorKind::MemberNotInView => {
                        info!("local member left the view, view creator stopping");
                        self.status.cancel();
                    }
                    _ => warn!(%error, "failed to create view"),
                }
            }
        }

        self.status.set(CreatorState::Stopped);
        debug!("view creator stopped");
    }

    async fn create_view(&self) -> Result<()> {
        let current = self.inner.store.current().ok_or_else(Error::new_stale_view)?;
        if !current.contains(&self.inner.local) {
            return Err(Error::new_member_not_in_view());
        }

        let changes = self.inner.requests.drain();
        let candidate = match self.build(&current, changes) {
            Some(candidate) => candidate,
            None => {
                debug!("queued requests changed nothing");
                return Ok(());
            }
        };

        let view_id = candidate.view.view_id();
        debug!(view = %candidate.view, "preparing view");

        if let Err(error) = self.inner.store.propose_prepared(candidate.view.clone()) {
            debug!(%error, view_id, "could not prepare view");
            return self.back_off(candidate).await;
        }

        let recipients = candidate
            .view
            .members()
            .iter()
            .filter(|m| **m != self.inner.local)
            .cloned()
            .collect::<Vec<_>>();
        self.inner.acks.expect(view_id, recipients.iter().cloned());

        let unreachable = self
            .broadcast(&recipients, InstallView::prepare((*candidate.view).clone()).into())
            .await;
        let unreachable_joiners = unreachable
            .into_iter()
            .filter(|m| candidate.joiners.contains(m))
            .collect::<HashSet<_>>();

        if !unreachable_joiners.is_empty() {
            warn!(joiners = ?unreachable_joiners, view_id, "joining members unreachable, abandoning view");
            self.abandon(&candidate);
            self.retry_later(candidate.changes, &unreachable_joiners);
            return Ok(());
        }

        if timeout(self.inner.config.view_ack_timeout, self.inner.acks.wait_all())
            .await
            .is_err()
        {
            let missing = self.inner.acks.missing();
            self.inner.degraded_commits.fetch_add(1, Ordering::SeqCst);
            warn!(?missing, view_id, "committing view without every acknowledgement");
        }
        self.inner.acks.clear();

        if self.should_stop() {
            debug!(view_id, "stopped before commit");
            self.inner.store.abandon(&candidate.view);
            return Ok(());
        }

        if let Err(error) = self.inner.store.begin_commit(&candidate.view) {
            debug!(%error, view_id, "another view was prepared meanwhile");
            return self.back_off(candidate).await;
        }

        if let Err(error) = self.inner.install(candidate.view.clone()) {
            self.inner.store.abandon(&candidate.view);
            return Err(error);
        }

        let mut targets = recipients;
        targets.extend(
            candidate
                .departing
                .iter()
                .filter(|m| **m != self.inner.local)
                .cloned(),
        );
        self.broadcast(&targets, InstallView::commit((*candidate.view).clone()).into())
            .await;

        Ok(())
    }

    /// Fold the drained requests into a successor of `current`.
    ///
    /// A member in the view is only affected by its departure, a member
    /// outside of it only by its join.
    fn build(&self, current: &View, changes: Vec<(MemberId, PendingChange)>) -> Option<Candidate> {
        let floor = self.conflict_floor.load(Ordering::SeqCst);
        let view_id = (current.view_id() + 1).max(floor + 1);
        let mut view = current.successor(self.inner.local.clone(), view_id);
        let mut joiners = HashSet::new();
        let mut departing = Vec::new();

        for (member, change) in &changes {
            if current.contains(member) {
                let removed = match &change.departure {
                    Some(ViewRequest::Leave { .. }) => view.add_shutdown(member),
                    Some(ViewRequest::Remove { .. }) => view.add_crashed(member),
                    _ => continue,
                };
                if let Ok(removed) = removed {
                    departing.push(removed);
                }
            } else if let Some(ViewRequest::Join { member: joiner, .. }) = &change.join {
                let mut joiner = joiner.clone();
                joiner.admit(view_id);
                if view.add(joiner).is_ok() {
                    joiners.insert(member.clone());
                }
            }
        }

        if joiners.is_empty() && departing.is_empty() {
            return None;
        }

        Some(Candidate {
            view: Arc::new(view),
            changes,
            joiners,
            departing,
        })
    }

    /// Send `message` to every target at once, returning those that failed.
    async fn broadcast(&self, targets: &[MemberId], message: Message) -> Vec<MemberId> {
        let sends = targets.iter().map(|target| {
            let message = message.clone();
            async move {
                let result = self.inner.send(target.clone(), message).await;
                (target, result)
            }
        });

        join_all(sends)
            .await
            .into_iter()
            .filter_map(|(target, result)| match result {
                Ok(()) => None,
                Err(error) => {
                    warn!(%target, %error, "failed to send view message");
                    Some(target.clone())
                }
            })
            .collect()
    }

    fn abandon(&self, candidate: &Candidate) {
        self.inner.store.abandon(&candidate.view);
        self.inner.acks.clear();
    }

    /// Give up on a candidate that lost against another prepared view.
    ///
    /// The batch is re-queued and the creator waits before trying again. The
    /// next candidate is numbered above the view that won, which takes over
    /// if that view is never committed.
    async fn back_off(&self, candidate: Candidate) -> Result<()> {
        self.abandon(&candidate);

        if let Some(held) = self.inner.store.prepared() {
            if held.view_id() >= candidate.view.view_id() {
                self.conflict_floor.fetch_max(held.view_id(), Ordering::SeqCst);
                debug!(conflicting = held.view_id(), "retrying above conflicting view");
            }
        }

        self.inner.requests.requeue(candidate.changes);
        sleep(self.inner.config.view_ack_timeout).await;
        Ok(())
    }

    /// Re-queue a batch whose candidate could not reach some joiners.
    ///
    /// Joins that have now failed `max_send_attempts` times are dropped.
    fn retry_later(&self, changes: Vec<(MemberId, PendingChange)>, unreachable: &HashSet<MemberId>) {
        let max_attempts = self.inner.config.max_send_attempts;

        let changes = changes
            .into_iter()
            .filter_map(|(member, mut change)| {
                if unreachable.contains(&member) {
                    change.attempts += 1;
                    if change.attempts >= max_attempts {
                        let error = Error::new_transport(Some(
                            format!("unreachable after {} attempts", change.attempts).into(),
                        ));
                        warn!(%member, %error, "dropping join request");
                        change.join = None;
                    }
                }

                if change.join.is_none() && change.departure.is_none() {
                    None
                } else {
                    Some((member, change))
                }
            })
            .collect();

        self.inner.requests.requeue(changes);
    }
}
