//! Group membership: joins, departures and view installation.
//!
//! A [`Membership`] is fed every membership message the host receives through
//! [`Membership::process`]. Views are agreed on by a prepare/install round run
//! by the coordinator, the oldest surviving member. Networking, security and
//! the host's lifecycle are plugged in through the traits in [`transport`].

#[cfg(test)]
#[macro_use]
extern crate tokio_test;

mod builder;
mod common;
mod config;
mod error;
mod handle;
pub mod membership;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use self::builder::Builder;
pub use self::common::{MemberId, ProtocolVersion, ViewId, Weight, DEFAULT_WEIGHT};
pub use self::config::Config;
pub use self::error::{Error, ErrorKind, Result, Source};
pub use self::handle::Handle;
pub use self::membership::{
    CreatorState, Membership, QuorumLoss, QuorumPolicy, View, ViewRequest,
};
