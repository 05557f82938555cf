//! Server configuration.

use std::net::SocketAddr;
use todosync_protocol::DEFAULT_PORT;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Whether REGISTER frames are acknowledged.
    pub accept_registrations: bool,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            accept_registrations: true,
        }
    }

    /// Binds to an ephemeral loopback port.
    pub fn loopback() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 0)))
    }

    /// Stops acknowledging registrations, so every client is declined.
    pub fn declining(mut self) -> Self {
        self.accept_registrations = false;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))
    }
}
