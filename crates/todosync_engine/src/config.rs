//! Configuration for the sync engine.

use std::net::SocketAddr;
use std::time::Duration;
use todosync_protocol::DEFAULT_PORT;

/// Configuration for sync runs.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server endpoint.
    pub server_addr: SocketAddr,
    /// Numeric client identifier sent on registration.
    pub client_id: i32,
    /// Transport timeouts and retries.
    pub transport: TransportConfig,
    /// Interval between progress heartbeats.
    pub progress_interval: Duration,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_addr: SocketAddr, client_id: i32) -> Self {
        Self {
            server_addr,
            client_id,
            transport: TransportConfig::default(),
            progress_interval: Duration::from_millis(100),
        }
    }

    /// Sets the transport configuration.
    pub fn with_transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Sets the progress heartbeat interval.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)), 0)
    }
}

/// Timeouts and retry counts of the transport session.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Wait per registration attempt.
    pub register_timeout: Duration,
    /// Number of registration attempts before giving up.
    pub register_attempts: u32,
    /// Wait for the reply to a sync request.
    pub request_timeout: Duration,
    /// Wait for a data frame or its acknowledgement.
    pub data_timeout: Duration,
    /// Wait for RESET_ACK.
    pub reset_timeout: Duration,
    /// Number of RESET frames sent when releasing an aborted session.
    pub release_attempts: u32,
}

impl TransportConfig {
    /// Creates the default protocol timings.
    pub fn new() -> Self {
        Self {
            register_timeout: Duration::from_millis(1000),
            register_attempts: 5,
            request_timeout: Duration::from_millis(1000),
            data_timeout: Duration::from_millis(10_000),
            reset_timeout: Duration::from_millis(1000),
            release_attempts: 3,
        }
    }

    /// Uses the same short timeout everywhere. Intended for tests.
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            register_timeout: timeout,
            request_timeout: timeout,
            data_timeout: timeout,
            reset_timeout: timeout,
            ..Self::new()
        }
    }

    /// Sets the registration timeout and attempt count.
    pub fn with_register(mut self, timeout: Duration, attempts: u32) -> Self {
        self.register_timeout = timeout;
        self.register_attempts = attempts;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the data timeout.
    pub fn with_data_timeout(mut self, timeout: Duration) -> Self {
        self.data_timeout = timeout;
        self
    }

    /// Sets the reset timeout.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Sets the number of RESET frames sent on release.
    pub fn with_release_attempts(mut self, attempts: u32) -> Self {
        self.release_attempts = attempts;
        self
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_timings() {
        let config = TransportConfig::default();
        assert_eq!(config.register_timeout, Duration::from_secs(1));
        assert_eq!(config.register_attempts, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(1));
        assert_eq!(config.data_timeout, Duration::from_secs(10));
        assert_eq!(config.reset_timeout, Duration::from_secs(1));
        assert_eq!(config.release_attempts, 3);
    }

    #[test]
    fn sync_config_builder() {
        let addr: SocketAddr = "10.0.2.2:50001".parse().unwrap();
        let config = SyncConfig::new(addr, 42)
            .with_transport(TransportConfig::uniform(Duration::from_millis(20)))
            .with_progress_interval(Duration::from_millis(10));

        assert_eq!(config.server_addr, addr);
        assert_eq!(config.client_id, 42);
        assert_eq!(config.transport.data_timeout, Duration::from_millis(20));
        assert_eq!(config.transport.register_attempts, 5);
        assert_eq!(config.progress_interval, Duration::from_millis(10));
    }

    #[test]
    fn default_server_is_local() {
        let config = SyncConfig::default();
        assert_eq!(config.server_addr.port(), 50001);
        assert!(config.server_addr.ip().is_loopback());
    }
}
