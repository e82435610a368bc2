use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{Hash, Hasher},
    net::SocketAddr,
};

/// The identifier of an installed view.
pub type ViewId = u64;
/// Contribution of a single member to quorum calculations.
pub type Weight = u8;

/// Weight given to members that do not ask for anything else.
pub const DEFAULT_WEIGHT: Weight = 10;

/// Ordinal of the membership protocol spoken by a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion(pub u16);

impl ProtocolVersion {
    pub const CURRENT: ProtocolVersion = ProtocolVersion(3);
    /// Oldest version that can take part in the view protocol.
    pub const MIN_SUPPORTED: ProtocolVersion = ProtocolVersion(2);

    pub fn is_supported(self) -> bool {
        self >= Self::MIN_SUPPORTED
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

/// Identity of a group member.
///
/// Two ids are the same member when their address and port match, the
/// protocol version, weight and join sequence do not take part in equality.
#[derive(Clone, Serialize, Deserialize)]
pub struct MemberId {
    addr: SocketAddr,
    version: ProtocolVersion,
    weight: Weight,
    join_view_id: Option<ViewId>,
}

impl MemberId {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            version: ProtocolVersion::CURRENT,
            weight: DEFAULT_WEIGHT,
            join_view_id: None,
        }
    }

    pub fn with_version(mut self, version: ProtocolVersion) -> Self {
        self.version = version;
        self
    }

    /// A zero weight is bumped to one so every member counts towards quorum.
    pub fn with_weight(mut self, weight: Weight) -> Self {
        self.weight = weight.max(1);
        self
    }

    pub fn with_join_view_id(mut self, view_id: ViewId) -> Self {
        self.join_view_id = Some(view_id);
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn version(&self) -> ProtocolVersion {
        self.version
    }

    pub fn weight(&self) -> Weight {
        self.weight
    }

    /// The view in which this member was admitted, if it has been admitted.
    pub fn join_view_id(&self) -> Option<ViewId> {
        self.join_view_id
    }

    /// Records the view admitting this incarnation of the member.
    pub(crate) fn admit(&mut self, view_id: ViewId) {
        self.join_view_id = Some(view_id);
    }
}

impl PartialEq for MemberId {
    fn eq(&self, other: &MemberId) -> bool {
        self.addr == other.addr
    }
}

impl Eq for MemberId {}

impl Hash for MemberId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr.hash(state);
    }
}

impl From<SocketAddr> for MemberId {
    fn from(addr: SocketAddr) -> Self {
        MemberId::new(addr)
    }
}

impl fmt::Debug for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.join_view_id {
            Some(id) => write!(f, "{}<v{}>", self.addr, id),
            None => write!(f, "{}", self.addr),
        }
    }
}
