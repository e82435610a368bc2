use crate::{
    common::{MemberId, ViewId},
    config::Config,
    error::Source,
    membership::{Membership, View},
    transport::{
        proto::{Credentials, InstallView, Message, ViewAck},
        Authenticator, Manager, Transport,
    },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    net::SocketAddr,
    sync::Arc,
    time::Duration,
};

pub const LOCAL_PORT: u16 = 8000;

pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn member(port: u16) -> MemberId {
    MemberId::new(SocketAddr::from(([127, 0, 0, 1], port)))
}

/// A view created by the first member in `ports`.
pub fn view_of(view_id: ViewId, ports: &[u16]) -> View {
    let members = ports.iter().map(|p| member(*p)).collect::<Vec<_>>();
    let creator = members.first().cloned().unwrap_or_else(|| member(LOCAL_PORT));

    View::new(creator, view_id, members, HashSet::new(), HashSet::new())
}

/// Short timeouts for tests running on a paused clock.
pub fn test_config() -> Config {
    Config::default()
        .with_auth_timeout(Duration::from_millis(100))
        .with_idle_poll_interval(Duration::from_millis(50))
        .with_batching_window(Duration::from_millis(10))
        .with_view_ack_timeout(Duration::from_secs(1))
        .with_send_timeout(Duration::from_millis(100))
}

/// Deliver a committed view to `membership`.
pub async fn install(membership: &Membership, view: View) {
    membership.process(InstallView::commit(view).into()).await;
}

pub struct Harness {
    pub membership: Membership,
    pub transport: Arc<MockTransport>,
    pub manager: Arc<MockManager>,
}

/// A membership for the member on [`LOCAL_PORT`] wired to mocks.
pub fn harness(config: Config, authenticator: MockAuthenticator) -> Harness {
    trace_init();

    let transport = Arc::new(MockTransport::new(member(LOCAL_PORT)));
    let manager = Arc::new(MockManager::default());

    let membership = Membership::builder(transport.clone(), manager.clone())
        .authenticator(Arc::new(authenticator))
        .config(config)
        .finish();

    Harness {
        membership,
        transport,
        manager,
    }
}

/// Records everything sent instead of sending it.
pub struct MockTransport {
    local: MemberId,
    sent: Mutex<Vec<(MemberId, Message)>>,
    unreachable: Mutex<HashSet<MemberId>>,
    acker: Mutex<Option<Membership>>,
}

impl MockTransport {
    pub fn new(local: MemberId) -> Self {
        Self {
            local,
            sent: Mutex::new(Vec::new()),
            unreachable: Mutex::new(HashSet::new()),
            acker: Mutex::new(None),
        }
    }

    pub fn sent(&self) -> Vec<(MemberId, Message)> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, target: &MemberId) -> Vec<Message> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to == target)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Sends to `member` fail from now on.
    pub fn set_unreachable(&self, member: MemberId) {
        self.unreachable.lock().insert(member);
    }

    /// Answer every prepare sent from now on with an ack from its target.
    pub fn ack_prepares(&self, membership: &Membership) {
        *self.acker.lock() = Some(membership.clone());
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_to(&self, target: MemberId, message: Message) -> Result<(), Source> {
        if self.unreachable.lock().contains(&target) {
            return Err(format!("{} is unreachable", target).into());
        }

        let ack = match &message {
            Message::InstallView(InstallView {
                view,
                is_preparation: true,
                ..
            }) => Some(ViewAck {
                view_id: view.view_id(),
                sender: target.clone(),
            }),
            _ => None,
        };

        self.sent.lock().push((target, message));

        let acker = self.acker.lock().clone();
        if let (Some(acker), Some(ack)) = (acker, ack) {
            acker.process(ack.into()).await;
        }

        Ok(())
    }

    fn local_member(&self) -> MemberId {
        self.local.clone()
    }
}

/// Records the notifications of the engine.
#[derive(Default)]
pub struct MockManager {
    disconnects: Mutex<Vec<String>>,
    quorum_losses: Mutex<Vec<(HashSet<MemberId>, ViewId)>>,
    installed: Mutex<Vec<ViewId>>,
}

impl MockManager {
    pub fn disconnects(&self) -> Vec<String> {
        self.disconnects.lock().clone()
    }

    /// Crashed members and the prior view id of every quorum loss.
    pub fn quorum_losses(&self) -> Vec<(HashSet<MemberId>, ViewId)> {
        self.quorum_losses.lock().clone()
    }

    pub fn installed(&self) -> Vec<ViewId> {
        self.installed.lock().clone()
    }
}

impl Manager for MockManager {
    fn force_disconnect(&self, reason: &str) {
        self.disconnects.lock().push(reason.to_string());
    }

    fn quorum_lost(&self, crashed: &HashSet<MemberId>, prior_view: &View) {
        self.quorum_losses
            .lock()
            .push((crashed.clone(), prior_view.view_id()));
    }

    fn view_installed(&self, view: &View) {
        self.installed.lock().push(view.view_id());
    }
}

#[derive(Debug, Clone, Copy)]
pub enum MockAuthenticator {
    Accepting,
    Rejecting,
    RequiringCredentials,
}

impl MockAuthenticator {
    pub fn accepting() -> Self {
        MockAuthenticator::Accepting
    }

    pub fn rejecting() -> Self {
        MockAuthenticator::Rejecting
    }

    pub fn requiring_credentials() -> Self {
        MockAuthenticator::RequiringCredentials
    }
}

#[async_trait]
impl Authenticator for MockAuthenticator {
    async fn authenticate(
        &self,
        member: &MemberId,
        credentials: Option<&Credentials>,
    ) -> Result<(), Source> {
        match (self, credentials) {
            (MockAuthenticator::Accepting, _) => Ok(()),
            (MockAuthenticator::RequiringCredentials, Some(_)) => Ok(()),
            (MockAuthenticator::RequiringCredentials, None) => {
                Err(format!("{} presented no credentials", member).into())
            }
            (MockAuthenticator::Rejecting, _) => {
                Err(format!("{} presented invalid credentials", member).into())
            }
        }
    }
}
