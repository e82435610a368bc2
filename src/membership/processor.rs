use super::{election, requests::ViewRequest, view::View, Inner};
use crate::{
    common::MemberId,
    error::{Error, ErrorKind, Result},
    transport::proto::{
        Credentials, InstallView, JoinRequest, JoinResponse, LeaveRequest, Message,
        RemoveMemberRequest, ViewAck,
    },
};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};
use tracing_attributes::instrument;

impl Inner {
    pub(crate) async fn handle(self: &Arc<Self>, message: Message) -> Result<()> {
        match message {
            Message::JoinRequest(req) => self.handle_join_request(req).await,
            Message::LeaveRequest(req) => self.handle_leave_request(req),
            Message::RemoveMember(req) => self.handle_remove_request(req),
            Message::InstallView(msg) => self.handle_install_view(msg).await,
            Message::ViewAck(ack) => {
                if !self.acks.record(ack.view_id, &ack.sender) {
                    debug!(view_id = ack.view_id, sender = %ack.sender, "ignoring unexpected view ack");
                }
                Ok(())
            }
            Message::JoinResponse(res) => {
                debug!(accepted = res.accepted, "ignoring join response, this member already joined");
                Ok(())
            }
        }
    }

    #[instrument(level = "debug", skip(self, req), fields(member = %req.joining_member))]
    async fn handle_join_request(self: &Arc<Self>, req: JoinRequest) -> Result<()> {
        let JoinRequest {
            sender,
            joining_member,
            credentials,
        } = req;

        if let Err(error) = self
            .validate_join(&joining_member, credentials.as_ref())
            .await
        {
            self.respond_to_join(sender, JoinResponse::rejected(error.to_string()))
                .await;
            return Err(error);
        }

        if let Some(view) = self.store.current() {
            if view.contains(&joining_member) {
                debug!("member is already in the view");
                self.respond_to_join(sender, JoinResponse::accepted((*view).clone()))
                    .await;
                return Ok(());
            }
        }

        let queued = self.requests.push(ViewRequest::Join {
            sender,
            member: joining_member,
            credentials,
        });
        debug!(queued, pending = self.requests.len(), "join request recorded");

        Ok(())
    }

    async fn validate_join(&self, member: &MemberId, credentials: Option<&Credentials>) -> Result<()> {
        if self.is_stopping() {
            return Err(Error::new_stopped());
        }

        if !member.version().is_supported() {
            let reason = format!(
                "{} uses protocol {:?}, the oldest supported is {:?}",
                member,
                member.version(),
                crate::common::ProtocolVersion::MIN_SUPPORTED
            );
            return Err(Error::new_version_incompatible(Some(reason.into())));
        }

        match timeout(
            self.config.auth_timeout,
            self.authenticator.authenticate(member, credentials),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::new_authentication_failed(Some(e))),
            Err(_) => Err(Error::new_authentication_failed(Some(
                "authentication timed out".into(),
            ))),
        }
    }

    async fn respond_to_join(&self, target: MemberId, response: JoinResponse) {
        if let Err(error) = self.send(target.clone(), response.into()).await {
            warn!(%target, %error, "failed to send join response");
        }
    }

    #[instrument(level = "debug", skip(self, req), fields(subject = %req.subject, sender = %req.sender))]
    fn handle_leave_request(self: &Arc<Self>, req: LeaveRequest) -> Result<()> {
        let view = self.store.current().ok_or_else(Error::new_stale_view)?;

        if !is_current_incarnation(&view, &req.subject) {
            return Err(Error::new_stale_view());
        }

        if req.subject == self.local && req.sender != self.local {
            self.force_disconnect(&req.reason);
            return Ok(());
        }

        self.record_departure(
            &view,
            ViewRequest::Leave {
                sender: req.sender,
                member: req.subject,
                reason: req.reason,
            },
        );

        Ok(())
    }

    #[instrument(level = "debug", skip(self, req), fields(subject = %req.subject, sender = %req.sender))]
    fn handle_remove_request(self: &Arc<Self>, req: RemoveMemberRequest) -> Result<()> {
        let view = self.store.current().ok_or_else(Error::new_stale_view)?;

        if !view.contains(&req.sender) {
            return Err(Error::new_not_a_member());
        }

        if req.subject == self.local {
            self.force_disconnect(&req.reason);
            return Ok(());
        }

        if !is_current_incarnation(&view, &req.subject) {
            return Err(Error::new_stale_view());
        }

        self.record_departure(
            &view,
            ViewRequest::Remove {
                sender: req.sender,
                member: req.subject,
                reason: req.reason,
            },
        );

        Ok(())
    }

    /// Queue a leave or removal and take over if the coordinator is the one going.
    fn record_departure(self: &Arc<Self>, view: &View, request: ViewRequest) {
        let member = request.member().clone();
        let sender = request.sender().clone();

        let takes_over = {
            let mut departed = self.departed.lock();
            let takes_over = election::takes_over(view, &departed, &member, &self.local);
            departed.insert(member.clone());
            takes_over
        };

        let queued = self.requests.push(request);
        debug!(%member, %sender, queued, pending = self.requests.len(), "departure recorded");

        if takes_over {
            self.become_coordinator();
        }
    }

    #[instrument(level = "debug", skip(self, msg), fields(view_id = msg.view.view_id(), prepare = msg.is_preparation))]
    async fn handle_install_view(self: &Arc<Self>, msg: InstallView) -> Result<()> {
        let view = Arc::new(msg.view);

        if !msg.is_preparation {
            return self.install(view);
        }

        let view_id = view.view_id();
        let proposer = view.creator().clone();

        match self.store.propose_prepared(view) {
            Ok(()) => debug!("prepared view"),
            Err(e) if e.kind() == ErrorKind::ConflictingPrepare => {
                debug!("keeping the higher prepared view")
            }
            Err(e) => return Err(e),
        }

        if proposer == self.local {
            self.acks.record(view_id, &self.local);
            return Ok(());
        }

        let ack = ViewAck {
            view_id,
            sender: self.local.clone(),
        };
        self.send(proposer, ack.into()).await
    }
}

/// Whether `subject` names the incarnation of the member the view holds.
///
/// A subject without a join sequence refers to whatever incarnation is current.
fn is_current_incarnation(view: &View, subject: &MemberId) -> bool {
    match (view.get(subject), subject.join_view_id()) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(known), Some(id)) => known.join_view_id().map_or(true, |known| known == id),
    }
}
