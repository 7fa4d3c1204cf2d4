//! API server configuration

use std::net::SocketAddr;
use std::time::Duration;

/// HTTP API server options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// How long to wait for relays to exit after the server stops
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the shutdown drain timeout
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 3000);
        assert!(config.bind_addr.ip().is_unspecified());
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:3001".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 3001);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .shutdown_timeout(Duration::from_secs(3));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(3));
    }
}
