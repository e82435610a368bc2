use crate::{
    config::Config,
    membership::Membership,
    transport::{Authenticator, CancelCriterion, Manager, NeverCancel, NoAuthentication, Transport},
};
use std::sync::Arc;

/// Assembles a [`Membership`] from its collaborators.
pub struct Builder {
    transport: Arc<dyn Transport>,
    manager: Arc<dyn Manager>,
    authenticator: Arc<dyn Authenticator>,
    cancel: Arc<dyn CancelCriterion>,
    config: Config,
}

impl Builder {
    pub fn new(transport: Arc<dyn Transport>, manager: Arc<dyn Manager>) -> Self {
        Self {
            transport,
            manager,
            authenticator: Arc::new(NoAuthentication),
            cancel: Arc::new(NeverCancel),
            config: Config::default(),
        }
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    pub fn cancel_criterion(mut self, cancel: Arc<dyn CancelCriterion>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn finish(self) -> Membership {
        Membership::new(
            self.config,
            self.transport,
            self.authenticator,
            self.manager,
            self.cancel,
        )
    }
}
