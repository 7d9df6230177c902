//! Web server configuration

use std::net::SocketAddr;
use std::path::PathBuf;

/// Web server configuration options
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Address to serve the browser UI on
    pub bind_addr: SocketAddr,

    /// Collector address the feed relay connects to
    pub collector_addr: String,

    /// Directory the `/image` route serves files from
    pub image_dir: PathBuf,

    /// Image URL prefix used in collector announcements; the relay
    /// rewrites it to this server's `/image` route
    pub upstream_image_base: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            collector_addr: "127.0.0.1:4650".to_string(),
            image_dir: PathBuf::from("/tmp"),
            upstream_image_base: "http://localhost:8000/image".to_string(),
        }
    }
}

impl WebConfig {
    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the collector address
    pub fn collector_addr(mut self, addr: impl Into<String>) -> Self {
        self.collector_addr = addr.into();
        self
    }

    /// Set the image directory
    pub fn image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = dir.into();
        self
    }

    /// Set the upstream image base URL
    pub fn upstream_image_base(mut self, base: impl Into<String>) -> Self {
        self.upstream_image_base = base.into();
        self
    }
}
