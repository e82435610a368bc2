//! The join/leave engine.
//!
//! Incoming messages are handled by [`Membership::process`]. Requests that
//! change the membership are queued, and whichever member coordinates the
//! group turns the queue into a new [`View`] with a prepare/install round.
//! Every member installs committed views through the same path, which is also
//! where quorum loss is detected and coordinator succession re-evaluated.

mod acks;
mod creator;
mod election;
mod processor;
mod quorum;
mod requests;
mod store;
mod view;

pub use creator::CreatorState;
pub use quorum::{QuorumLoss, QuorumPolicy};
pub use requests::ViewRequest;
pub use view::View;

use crate::{
    builder::Builder,
    common::MemberId,
    config::Config,
    error::{Error, Result},
    handle::Handle,
    transport::{
        proto::{LeaveRequest, Message, RemoveMemberRequest},
        Authenticator, CancelCriterion, Manager, Transport,
    },
};
use acks::ViewAcks;
use creator::{CreatorStatus, ViewCreator};
use parking_lot::Mutex;
use requests::ViewRequests;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};
use store::ViewStore;
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, error, info, warn};
use tracing_futures::Instrument;

/// Handle on the membership engine of the local member.
///
/// Cheap to clone, every clone drives the same engine.
#[derive(Clone)]
pub struct Membership {
    inner: Arc<Inner>,
}

/// The coordinator role: the running view creator and its status.
struct CoordinatorRole {
    status: Arc<CreatorStatus>,
    _task: JoinHandle<()>,
}

pub(crate) struct Inner {
    local: MemberId,
    config: Config,
    quorum: QuorumPolicy,
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn Authenticator>,
    manager: Arc<dyn Manager>,
    cancel: Arc<dyn CancelCriterion>,
    store: ViewStore,
    requests: ViewRequests,
    acks: ViewAcks,
    /// Members with a departure queued since the current view was installed.
    departed: Mutex<HashSet<MemberId>>,
    role: Mutex<Option<CoordinatorRole>>,
    stopping: AtomicBool,
    disconnected: AtomicBool,
    degraded_commits: AtomicU64,
}

impl Membership {
    pub fn builder(transport: Arc<dyn Transport>, manager: Arc<dyn Manager>) -> Builder {
        Builder::new(transport, manager)
    }

    pub(crate) fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        authenticator: Arc<dyn Authenticator>,
        manager: Arc<dyn Manager>,
        cancel: Arc<dyn CancelCriterion>,
    ) -> Self {
        let inner = Inner {
            local: transport.local_member(),
            quorum: QuorumPolicy::new(config.quorum_loss_threshold),
            config,
            transport,
            authenticator,
            manager,
            cancel,
            store: ViewStore::new(),
            requests: ViewRequests::new(),
            acks: ViewAcks::new(),
            departed: Mutex::new(HashSet::new()),
            role: Mutex::new(None),
            stopping: AtomicBool::new(false),
            disconnected: AtomicBool::new(false),
            degraded_commits: AtomicU64::new(0),
        };

        Self {
            inner: Arc::new(inner),
        }
    }

    /// Handle one incoming membership message.
    ///
    /// Rejections are answered or logged here, nothing is returned to the
    /// caller.
    pub async fn process(&self, message: Message) {
        if let Err(error) = self.inner.handle(message).await {
            self.inner.log_rejection(&error);
        }
    }

    pub fn local_member(&self) -> &MemberId {
        &self.inner.local
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The installed view, `None` until the first one arrives.
    pub fn view(&self) -> Option<Arc<View>> {
        self.inner.store.current()
    }

    pub fn prepared_view(&self) -> Option<Arc<View>> {
        self.inner.store.prepared()
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.inner.store.subscribe())
    }

    /// Requests waiting for the next view.
    pub fn pending_requests(&self) -> Vec<ViewRequest> {
        self.inner.requests.snapshot()
    }

    pub fn is_coordinator(&self) -> bool {
        self.inner.is_coordinator()
    }

    /// Take over the coordinator role.
    ///
    /// Without an installed view this founds the group with a view holding
    /// only the local member. Returns `false` if already coordinating or
    /// stopping.
    pub fn become_coordinator(&self) -> bool {
        self.inner.become_coordinator()
    }

    pub fn creator_state(&self) -> Option<CreatorState> {
        self.inner
            .role
            .lock()
            .as_ref()
            .map(|role| role.status.state())
    }

    /// Views committed without every acknowledgement.
    pub fn degraded_commits(&self) -> u64 {
        self.inner.degraded_commits.load(Ordering::SeqCst)
    }

    /// Ask the coordinator to let the local member leave, then stop.
    ///
    /// When the local member coordinates, the engine keeps running until the
    /// view listing it as shut down is installed.
    pub async fn leave(&self, reason: &str) -> Result<()> {
        let coordinator = self.inner.coordinator(None)?;
        let coordinating = coordinator == self.inner.local || self.inner.is_coordinator();
        let request = LeaveRequest {
            coordinator_target: coordinator.clone(),
            subject: self.inner.local.clone(),
            reason: reason.to_string(),
            sender: self.inner.local.clone(),
        };

        self.inner.submit(coordinator, request.into()).await?;

        if !coordinating {
            self.inner.stop();
        }
        Ok(())
    }

    /// Ask the coordinator to remove `member` from the group as crashed.
    ///
    /// The request never goes to `member` itself, so removing a crashed
    /// coordinator reaches its successor, which may be the local member.
    pub async fn remove(&self, member: MemberId, reason: &str) -> Result<()> {
        let coordinator = self.inner.coordinator(Some(&member))?;
        let request = RemoveMemberRequest {
            coordinator_target: coordinator.clone(),
            subject: member,
            reason: reason.to_string(),
            sender: self.inner.local.clone(),
        };

        self.inner.submit(coordinator, request.into()).await
    }

    /// Stop the engine. The view creator exits and joins are refused.
    pub fn stop(&self) {
        self.inner.stop();
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.is_stopping()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<Inner> {
        &self.inner
    }
}

impl Inner {
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst) || self.cancel.is_stop_requested()
    }

    fn stop(&self) {
        if !self.stopping.swap(true, Ordering::SeqCst) {
            info!(member = %self.local, "stopping membership");
        }
        self.stop_coordinator();
        self.store.clear_prepared();
    }

    /// Send with the configured timeout.
    pub(crate) async fn send(&self, target: MemberId, message: Message) -> Result<()> {
        timeout(
            self.config.send_timeout,
            self.transport.send_to(target, message),
        )
        .await?
        .map_err(|e| Error::new_transport(Some(e)))
    }

    /// The member requests should be sent to, never `excluding`.
    fn coordinator(&self, excluding: Option<&MemberId>) -> Result<MemberId> {
        let view = self.store.current().ok_or_else(Error::new_stale_view)?;
        let mut departed = self.departed.lock().clone();
        departed.extend(excluding.cloned());

        election::successor(&view, &departed)
            .cloned()
            .ok_or_else(Error::new_stale_view)
    }

    /// Route a locally originated request to the coordinator.
    async fn submit(self: &Arc<Self>, coordinator: MemberId, message: Message) -> Result<()> {
        if coordinator == self.local || self.is_coordinator() {
            self.handle(message).await
        } else {
            self.send(coordinator, message).await
        }
    }

    /// Instruct the host to leave the group. Only the first call goes through.
    pub(crate) fn force_disconnect(&self, reason: &str) {
        if self.disconnected.swap(true, Ordering::SeqCst) {
            debug!(%reason, "already disconnected");
            return;
        }

        error!(member = %self.local, %reason, "forced disconnect");
        self.manager.force_disconnect(reason);
        self.stop();
    }

    /// Install a committed view.
    ///
    /// Shared by views committed elsewhere and by the local view creator.
    pub(crate) fn install(self: &Arc<Self>, view: Arc<View>) -> Result<()> {
        if !self.store.accepts(view.view_id()) {
            return Err(Error::new_stale_view());
        }

        let left_cleanly = view.shutdown_members().contains(&self.local);
        if !view.contains(&self.local) && !left_cleanly {
            self.force_disconnect("this member is no longer in the membership view");
            return Err(Error::new_member_not_in_view());
        }

        let prior = self.store.try_install(view.clone())?;
        info!(view = %view, "installed view");

        self.departed.lock().retain(|m| view.contains(m));
        let resolved = self.requests.prune(&view);
        if resolved > 0 {
            debug!(resolved, view_id = view.view_id(), "dropped requests the view already applied");
        }
        for member in view.shutdown_members().iter().chain(view.crashed_members()) {
            self.acks.forget(member);
        }
        self.manager.view_installed(&view);

        if let Some(prior) = prior {
            if let Some(loss) = self.quorum.check(&prior, &view) {
                self.quorum_lost(loss, &prior);
            }
        }

        if left_cleanly {
            self.stop();
        } else if !self.is_stopping() {
            self.check_succession(&view);
        }

        Ok(())
    }

    fn quorum_lost(&self, loss: QuorumLoss, prior: &View) {
        let error = Error::new_quorum_lost(Some(
            format!(
                "lost weight {} of {} in view {}",
                loss.lost_weight,
                loss.total_weight,
                prior.view_id()
            )
            .into(),
        ));
        warn!(crashed = ?loss.crashed, %error, "quorum lost");

        self.manager.quorum_lost(&loss.crashed, prior);

        if self.config.enable_network_partition_detection {
            let error = Error::new_partition_detected(Some(
                format!("members {:?} are unreachable", loss.crashed).into(),
            ));
            self.force_disconnect(&error.to_string());
        }
    }

    fn check_succession(self: &Arc<Self>, view: &View) {
        let next = {
            let departed = self.departed.lock();
            election::successor(view, &departed).cloned()
        };

        if next.as_ref() == Some(&self.local) {
            self.become_coordinator();
        } else if view.creator() != &self.local && self.is_coordinator() {
            info!(coordinator = ?next, "another member coordinates this view");
            self.stop_coordinator();
        }
    }

    pub(crate) fn is_coordinator(&self) -> bool {
        self.role
            .lock()
            .as_ref()
            .map_or(false, |role| role.status.state() != CreatorState::Stopped)
    }

    pub(crate) fn become_coordinator(self: &Arc<Self>) -> bool {
        if self.is_stopping() {
            return false;
        }

        let mut role = self.role.lock();
        if role
            .as_ref()
            .map_or(false, |r| r.status.state() != CreatorState::Stopped)
        {
            return false;
        }

        if self.store.current().is_none() {
            let view = Arc::new(View::initial(self.local.clone(), 1));
            if self.store.try_install(view.clone()).is_ok() {
                info!(view = %view, "founded group");
                self.manager.view_installed(&view);
            }
        }

        let status = Arc::new(CreatorStatus::new());
        let creator = ViewCreator::new(self.clone(), status.clone());
        let span = tracing::info_span!("view_creator", member = %self.local);
        let task = tokio::spawn(creator.run().instrument(span));

        *role = Some(CoordinatorRole {
            status,
            _task: task,
        });
        info!(member = %self.local, "this member is now the coordinator");

        true
    }

    fn stop_coordinator(&self) {
        if let Some(role) = self.role.lock().take() {
            role.status.cancel();
            self.requests.wake();
            info!(member = %self.local, "no longer the coordinator");
        }
    }

    fn log_rejection(&self, error: &Error) {
        use crate::error::ErrorKind::*;

        match error.kind() {
            VersionIncompatible | AuthenticationFailed | Stopped => {
                info!(%error, "join request rejected")
            }
            NotAMember | StaleView | ConflictingPrepare | MemberNotInView => {
                debug!(%error, "dropped membership message")
            }
            _ => warn!(%error, "failed to process membership message"),
        }
    }
}
