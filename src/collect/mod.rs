//! Image collection service
//!
//! The collector is the ingestion point of the system: capture agents
//! push raw frames at it, it persists each one, and every live feed
//! consumer hears about the new image through the broker.
//!
//! ```text
//!  capture agent ──StoreImage──► CollectorServer
//!                                  │ codec.decode
//!                                  │ store.persist
//!                                  ▼
//!                          Broker<StoredImage>
//!                                  │ fan-out
//!                  ┌───────────────┼───────────────┐
//!                  ▼               ▼               ▼
//!             live stream     live stream     live stream
//!             connection      connection      connection
//! ```

pub mod codec;
pub mod config;
pub mod proxy;
pub mod server;
pub mod storage;

pub use codec::{DecodedImage, ImageCodec, StdImageCodec};
pub use config::CollectorConfig;
pub use proxy::ImageProxy;
pub use server::{CollectorServer, CollectorStats};
pub use storage::{FsImageStore, ImageStore, StoredImage, TIME_FORMAT};
