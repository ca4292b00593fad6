//! Cluster configuration.

use std::time::Duration;

/// Configuration for one node's coordinator.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Network addresses this process is reachable on.
    ///
    /// Also used on join to purge a previous registration of the same
    /// process that died without deregistering.
    pub addresses: String,

    /// Command port peers connect to.
    pub command_port: u16,

    /// Interval between heartbeat ticks.
    pub heartbeat_interval: Duration,

    /// Age after which a node row counts as dead.
    pub stale_after: Duration,

    /// Whether to run the heartbeat on a background thread.
    ///
    /// Tests drive [`crate::NodeCoordinator::tick`] explicitly instead.
    pub auto_heartbeat: bool,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            addresses: "127.0.0.1".to_string(),
            command_port: 0,
            heartbeat_interval: Duration::from_secs(2),
            stale_after: Duration::from_secs(10),
            auto_heartbeat: false,
        }
    }
}

impl ClusterConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the reachable addresses.
    #[must_use]
    pub fn addresses(mut self, addresses: impl Into<String>) -> Self {
        self.addresses = addresses.into();
        self
    }

    /// Sets the command port.
    #[must_use]
    pub const fn command_port(mut self, port: u16) -> Self {
        self.command_port = port;
        self
    }

    /// Sets the heartbeat interval.
    #[must_use]
    pub const fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the staleness threshold.
    #[must_use]
    pub const fn stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    /// Enables the background heartbeat thread.
    #[must_use]
    pub const fn auto_heartbeat(mut self, enabled: bool) -> Self {
        self.auto_heartbeat = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ClusterConfig::default();
        assert!(!config.auto_heartbeat);
        assert!(config.stale_after > config.heartbeat_interval);
    }

    #[test]
    fn builder_pattern() {
        let config = ClusterConfig::new()
            .addresses("10.0.0.5")
            .command_port(9901)
            .stale_after(Duration::from_millis(100));
        assert_eq!(config.addresses, "10.0.0.5");
        assert_eq!(config.command_port, 9901);
        assert_eq!(config.stale_after, Duration::from_millis(100));
    }
}
