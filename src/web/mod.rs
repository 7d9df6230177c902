//! Browser feed
//!
//! Turns the collector's live stream into something a browser can
//! watch: an index page, an SSE relay per viewer, and the image files
//! themselves.
//!
//! ```text
//!  browser ──GET /feed/{id}──► WebServer ──LiveStream──► Collector
//!     ▲                            │
//!     └──── SSE: feed / problem ◄──┘
//! ```

pub mod config;
pub mod relay;
pub mod server;

pub use config::WebConfig;
pub use relay::{FeedView, UrlRewriter};
pub use server::WebServer;
