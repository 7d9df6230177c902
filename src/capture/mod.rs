//! Capture agent
//!
//! A scheduled producer: grab a frame from a [`FrameSource`] on a fixed
//! interval and hand it to a [`FrameSink`], either a local directory or
//! a remote collector. A failed grab or save is logged and the loop
//! keeps going; the agent never aborts over a single bad frame.
//!
//! The actual capture device is external; it attaches through the
//! `FrameSource` trait. [`TestPatternSource`] is a synthetic source for
//! demos and tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::client::CollectorClient;
use crate::collect::codec::{ImageCodec, StdImageCodec, ENCODING_GRAY8};
use crate::collect::storage::{FsImageStore, ImageStore};
use crate::error::Result;
use crate::protocol::{RawImage, StoreImageRequest};

/// Produces raw frames on demand
pub trait FrameSource: Send {
    fn grab(&mut self) -> Result<RawImage>;
}

/// Synthetic frame source: a moving grayscale gradient
pub struct TestPatternSource {
    rows: u32,
    cols: u32,
    frame: u64,
}

impl TestPatternSource {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self {
            rows,
            cols,
            frame: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn grab(&mut self) -> Result<RawImage> {
        let rows = self.rows as usize;
        let cols = self.cols as usize;
        let shift = self.frame as usize;
        self.frame += 1;

        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(((r + c + shift) % 256) as u8);
            }
        }

        Ok(RawImage {
            rows: self.rows,
            cols: self.cols,
            encoding: ENCODING_GRAY8,
            data: Bytes::from(data),
        })
    }
}

/// Receives captured frames
#[async_trait]
pub trait FrameSink: Send {
    async fn save(&mut self, image: RawImage, timestamp: DateTime<Utc>, id: String) -> Result<()>;
}

/// Saves frames into a local directory
pub struct FileSink {
    codec: StdImageCodec,
    store: FsImageStore,
}

impl FileSink {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        let dir = dir.into();
        let base = format!("file://{}", dir.display());
        Self {
            codec: StdImageCodec::new(),
            store: FsImageStore::new(dir, base),
        }
    }
}

#[async_trait]
impl FrameSink for FileSink {
    async fn save(&mut self, image: RawImage, timestamp: DateTime<Utc>, _id: String) -> Result<()> {
        let decoded = self.codec.decode(&image)?;
        self.store.persist(&decoded, timestamp).await?;
        Ok(())
    }
}

/// Pushes frames to a remote collector
pub struct RemoteSink {
    client: CollectorClient,
}

impl RemoteSink {
    pub fn new(client: CollectorClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl FrameSink for RemoteSink {
    async fn save(&mut self, image: RawImage, timestamp: DateTime<Utc>, id: String) -> Result<()> {
        self.client
            .store_image(StoreImageRequest {
                image,
                timestamp,
                id,
            })
            .await
    }
}

/// Capture loop configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Time between captures
    pub interval: Duration,
    /// Device identifier embedded in frame IDs
    pub device_id: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            device_id: "0".to_string(),
        }
    }
}

impl CaptureConfig {
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }
}

/// Run the capture loop until the shutdown future resolves
pub async fn run<S, K, F>(
    mut source: S,
    mut sink: K,
    config: CaptureConfig,
    shutdown: F,
) -> Result<()>
where
    S: FrameSource,
    K: FrameSink,
    F: std::future::Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(config.interval);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = ticker.tick() => {
                let frame = match source.grab() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(device = %config.device_id, error = %e, "failed to grab frame");
                        continue;
                    }
                };

                let now = Utc::now();
                let id = format!("device{}.{}", config.device_id, now.timestamp());
                match sink.save(frame, now, id).await {
                    Ok(()) => tracing::debug!(device = %config.device_id, "frame captured"),
                    Err(e) => {
                        tracing::warn!(device = %config.device_id, error = %e, "failed to save frame")
                    }
                }
            }
        }
    }
}
