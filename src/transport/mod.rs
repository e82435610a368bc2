//! The collaborators the membership core talks to.
//!
//! None of these are implemented here: the hosting process plugs in its own
//! network stack, security layer and lifecycle manager.

pub mod proto;

use crate::{common::MemberId, error::Source, membership::View};
use async_trait::async_trait;
use std::collections::HashSet;

use proto::{Credentials, Message};

/// Sends membership messages to other members.
///
/// Delivery is best effort: messages may be dropped or delivered twice.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send_to(&self, target: MemberId, message: Message) -> Result<(), Source>;

    /// The identity this process joined the group with.
    fn local_member(&self) -> MemberId;
}

/// Validates the credentials of a joining member.
#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Fails when the credentials are invalid or missing while required.
    async fn authenticate(
        &self,
        member: &MemberId,
        credentials: Option<&Credentials>,
    ) -> Result<(), Source>;
}

/// The process hosting this member.
///
/// Notifications are fire-and-forget and must return promptly.
pub trait Manager: Send + Sync + 'static {
    /// This member must stop taking part in the group.
    fn force_disconnect(&self, reason: &str);

    /// Too much member weight was lost between `prior_view` and its successor.
    fn quorum_lost(&self, crashed: &HashSet<MemberId>, prior_view: &View);

    fn view_installed(&self, _view: &View) {}
}

/// External stop signal for the whole engine.
pub trait CancelCriterion: Send + Sync + 'static {
    fn is_stop_requested(&self) -> bool;
}

/// Accepts everyone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAuthentication;

#[async_trait]
impl Authenticator for NoAuthentication {
    async fn authenticate(&self, _: &MemberId, _: Option<&Credentials>) -> Result<(), Source> {
        Ok(())
    }
}

/// Never asks to stop, the engine is then stopped through `Membership::stop`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelCriterion for NeverCancel {
    fn is_stop_requested(&self) -> bool {
        false
    }
}
