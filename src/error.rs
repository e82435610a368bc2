use std::{error, fmt};

pub type Result<T> = std::result::Result<T, Error>;

pub type Source = Box<dyn error::Error + Send + Sync + 'static>;

pub struct Error {
    kind: ErrorKind,
    source: Option<Source>,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
    /// A joining member speaks a protocol version older than we support.
    VersionIncompatible,
    AuthenticationFailed,
    /// The sender of a request is not part of the current view.
    NotAMember,
    /// A request or view refers to an older incarnation of the group.
    StaleView,
    ConflictingPrepare,
    QuorumLost,
    PartitionDetected,
    TransportFailure,
    Timeout,
    Stopped,

    MemberAlreadyInView,
    MemberNotInView,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub(crate) fn new(kind: ErrorKind, source: Option<Source>) -> Self {
        Self { kind, source }
    }

    pub(crate) fn new_version_incompatible(source: Option<Source>) -> Self {
        Self::new(ErrorKind::VersionIncompatible, source)
    }

    pub(crate) fn new_authentication_failed(source: Option<Source>) -> Self {
        Self::new(ErrorKind::AuthenticationFailed, source)
    }

    pub(crate) fn new_not_a_member() -> Self {
        Self::new(ErrorKind::NotAMember, None)
    }

    pub(crate) fn new_stale_view() -> Self {
        Self::new(ErrorKind::StaleView, None)
    }

    pub(crate) fn new_conflicting_prepare() -> Self {
        Self::new(ErrorKind::ConflictingPrepare, None)
    }

    pub(crate) fn new_quorum_lost(source: Option<Source>) -> Self {
        Self::new(ErrorKind::QuorumLost, source)
    }

    pub(crate) fn new_partition_detected(source: Option<Source>) -> Self {
        Self::new(ErrorKind::PartitionDetected, source)
    }

    pub(crate) fn new_transport(source: Option<Source>) -> Self {
        Self::new(ErrorKind::TransportFailure, source)
    }

    pub(crate) fn new_timeout() -> Self {
        Self::new(ErrorKind::Timeout, None)
    }

    pub(crate) fn new_stopped() -> Self {
        Self::new(ErrorKind::Stopped, None)
    }

    pub(crate) fn new_member_already_in_view() -> Self {
        Self::new(ErrorKind::MemberAlreadyInView, None)
    }

    pub(crate) fn new_member_not_in_view() -> Self {
        Self::new(ErrorKind::MemberNotInView, None)
    }
}

impl From<ErrorKind> for Error {
    fn from(t: ErrorKind) -> Self {
        Error::new(t, None)
    }
}

impl From<(ErrorKind, Source)> for Error {
    fn from(t: (ErrorKind, Source)) -> Self {
        Error::new(t.0, Some(t.1))
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::new_timeout()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut f = f.debug_tuple("Error");
        f.field(&self.kind);
        if let Some(source) = &self.source {
            f.field(source);
        }
        f.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if let Some(source) = &self.source {
            write!(f, "{}: {}", self.kind, source)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| &**e as &(dyn error::Error + 'static))
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}
