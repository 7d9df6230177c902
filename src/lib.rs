//! Lookout: remote image capture, collection, and live-feed relay
//!
//! Capture agents push raw frames to a collector over a framed TCP
//! protocol. The collector persists each image and broadcasts an
//! announcement through an in-process publish/subscribe broker to every
//! live feed connection. A web server relays the feed to browsers as
//! server-sent events and serves the stored images.
//!
//! ```text
//! capture agent ──► collector ──► storage
//!                       │
//!                  Broker<StoredImage>
//!                       │ fan-out
//!              live stream connections
//!                       │
//!                  web relay (SSE)
//!                       │
//!                    browsers
//! ```
//!
//! The broker is the concurrency core: a single control-loop task owns
//! the subscriber set, publishes never block on slow consumers, and
//! delivery is best-effort with per-subscriber drop-on-full.

pub mod broker;
pub mod capture;
pub mod cleanup;
pub mod client;
pub mod collect;
pub mod error;
pub mod protocol;
pub mod web;

pub use broker::{Broker, BrokerConfig, BrokerStats, Subscription};
pub use client::{CollectorClient, FeedStream};
pub use collect::{CollectorConfig, CollectorServer, StoredImage};
pub use error::{Error, Result};
pub use web::{WebConfig, WebServer};
