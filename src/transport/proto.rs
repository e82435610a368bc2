use crate::{
    common::{MemberId, ViewId},
    membership::View,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    JoinRequest(JoinRequest),
    JoinResponse(JoinResponse),
    LeaveRequest(LeaveRequest),
    RemoveMember(RemoveMemberRequest),
    InstallView(InstallView),
    ViewAck(ViewAck),
}

/// Opaque security properties presented by a joining member.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub properties: HashMap<String, Bytes>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub sender: MemberId,
    pub joining_member: MemberId,
    pub credentials: Option<Credentials>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinResponse {
    pub accepted: bool,
    pub view: Option<View>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub coordinator_target: MemberId,
    pub subject: MemberId,
    pub reason: String,
    pub sender: MemberId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveMemberRequest {
    pub coordinator_target: MemberId,
    pub subject: MemberId,
    pub reason: String,
    pub sender: MemberId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallView {
    pub view: View,
    pub credentials: Option<Credentials>,
    /// `true` for the prepare phase, `false` for the commit.
    pub is_preparation: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewAck {
    pub view_id: ViewId,
    pub sender: MemberId,
}

impl JoinResponse {
    pub fn accepted(view: View) -> Self {
        Self {
            accepted: true,
            view: Some(view),
            failure_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            view: None,
            failure_reason: Some(reason.into()),
        }
    }
}

impl InstallView {
    pub fn prepare(view: View) -> Self {
        Self {
            view,
            credentials: None,
            is_preparation: true,
        }
    }

    pub fn commit(view: View) -> Self {
        Self {
            view,
            credentials: None,
            is_preparation: false,
        }
    }
}

impl From<JoinRequest> for Message {
    fn from(t: JoinRequest) -> Self {
        Message::JoinRequest(t)
    }
}

impl From<JoinResponse> for Message {
    fn from(t: JoinResponse) -> Self {
        Message::JoinResponse(t)
    }
}

impl From<LeaveRequest> for Message {
    fn from(t: LeaveRequest) -> Self {
        Message::LeaveRequest(t)
    }
}

impl From<RemoveMemberRequest> for Message {
    fn from(t: RemoveMemberRequest) -> Self {
        Message::RemoveMember(t)
    }
}

impl From<InstallView> for Message {
    fn from(t: InstallView) -> Self {
        Message::InstallView(t)
    }
}

impl From<ViewAck> for Message {
    fn from(t: ViewAck) -> Self {
        Message::ViewAck(t)
    }
}
