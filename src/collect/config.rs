//! Collector configuration

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::broker::BrokerConfig;

/// Collector configuration options
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Address to listen on for capture agents and feed consumers
    pub bind_addr: SocketAddr,

    /// Directory in which to store images
    pub image_dir: PathBuf,

    /// Public base URL under which stored images are reachable
    pub public_base: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY on accepted sockets
    pub tcp_nodelay: bool,

    /// Configuration for the live-feed broker
    pub broker: BrokerConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_addr(),
            image_dir: PathBuf::from("/tmp"),
            public_base: "http://localhost:8000/image".to_string(),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            broker: BrokerConfig::default(),
        }
    }
}

fn default_addr() -> SocketAddr {
    // Loopback collector port; always parseable.
    SocketAddr::from(([127, 0, 0, 1], 4650))
}

impl CollectorConfig {
    /// Create a new config with a custom bind address
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

    /// Set the image directory
    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = dir.into();
        self
    }

    /// Set the public image base URL
    pub fn public_base(mut self, base: impl Into<String>) -> Self {
        self.public_base = base.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the broker configuration
    pub fn broker(mut self, broker: BrokerConfig) -> Self {
        self.broker = broker;
        self
    }
}
