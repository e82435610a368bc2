use serde::Deserialize;
use std::time::Duration;

/// Settings of the membership engine.
///
/// Loading these from a file is up to the host, the struct only knows how to
/// be deserialized. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Force this member out when a view loses quorum.
    pub enable_network_partition_detection: bool,
    /// Bootstrap addresses, only used by the hosting process.
    pub locators: Vec<String>,
    /// `0` disables multicast.
    pub mcast_port: u16,
    /// Percentage of the prior view's weight that, once crashed, counts as quorum loss.
    pub quorum_loss_threshold: u8,
    /// How long the view creator waits after the first request so bursts end up in one view.
    pub batching_window: Duration,
    pub view_ack_timeout: Duration,
    pub send_timeout: Duration,
    pub auth_timeout: Duration,
    /// Candidates a joiner may miss before its request is dropped.
    pub max_send_attempts: usize,
    /// How often an idle view creator checks for an external stop.
    pub idle_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_network_partition_detection: false,
            locators: Vec::new(),
            mcast_port: 0,
            quorum_loss_threshold: 50,
            batching_window: Duration::from_millis(300),
            view_ack_timeout: Duration::from_secs(2),
            send_timeout: Duration::from_secs(1),
            auth_timeout: Duration::from_secs(5),
            max_send_attempts: 3,
            idle_poll_interval: Duration::from_millis(500),
        }
    }
}

impl Config {
    pub fn with_network_partition_detection(mut self, enabled: bool) -> Self {
        self.enable_network_partition_detection = enabled;
        self
    }

    pub fn with_quorum_loss_threshold(mut self, percent: u8) -> Self {
        self.quorum_loss_threshold = percent.min(100);
        self
    }

    pub fn with_batching_window(mut self, window: Duration) -> Self {
        self.batching_window = window;
        self
    }

    pub fn with_view_ack_timeout(mut self, timeout: Duration) -> Self {
        self.view_ack_timeout = timeout;
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout = timeout;
        self
    }

    pub fn with_idle_poll_interval(mut self, interval: Duration) -> Self {
        self.idle_poll_interval = interval;
        self
    }

    pub fn with_max_send_attempts(mut self, attempts: usize) -> Self {
        self.max_send_attempts = attempts.max(1);
        self
    }

    pub fn is_multicast_enabled(&self) -> bool {
        self.mcast_port != 0
    }
}
