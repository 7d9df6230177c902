//! Collector server
//!
//! Accepts connections from capture agents and feed consumers. A store
//! connection decodes, persists, and broadcasts each image; a live
//! stream connection subscribes to the broker and forwards every
//! announcement until either side goes away.
//!
//! Malformed or unpersistable images are logged and swallowed: the
//! agent still gets its ack, so one bad frame never looks like a
//! connection-level failure to the producer.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::codec::Framed;

use crate::broker::Broker;
use crate::error::{ProtocolError, Result};
use crate::protocol::{Frame, StoreImageRequest, WireCodec};

use super::codec::{ImageCodec, StdImageCodec};
use super::config::CollectorConfig;
use super::storage::{FsImageStore, ImageStore, StoredImage};

/// Snapshot of collector counters
///
/// Decode and storage failures are tracked separately: both stay
/// non-fatal to the agent, but a storage outage is operationally
/// actionable in a way a single malformed frame is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectorStats {
    /// Images decoded, persisted, and broadcast
    pub stored: u64,
    /// Store requests rejected by the codec
    pub decode_failures: u64,
    /// Store requests that decoded but could not be persisted
    pub storage_failures: u64,
}

#[derive(Default)]
struct Counters {
    stored: AtomicU64,
    decode_failures: AtomicU64,
    storage_failures: AtomicU64,
}

/// Collector server
pub struct CollectorServer {
    config: CollectorConfig,
    codec: Arc<dyn ImageCodec>,
    store: Arc<dyn ImageStore>,
    broker: Arc<Broker<StoredImage>>,
    counters: Arc<Counters>,
    next_session_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl CollectorServer {
    /// Create a server with the standard codec and filesystem store
    pub fn new(config: CollectorConfig) -> Self {
        let codec = Arc::new(StdImageCodec::new());
        let store = Arc::new(FsImageStore::new(
            config.image_dir.clone(),
            config.public_base.clone(),
        ));
        Self::with_collaborators(config, codec, store)
    }

    /// Create a server with custom codec and storage collaborators
    pub fn with_collaborators(
        config: CollectorConfig,
        codec: Arc<dyn ImageCodec>,
        store: Arc<dyn ImageStore>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };
        let broker = Arc::new(Broker::with_config(config.broker.clone()));

        Self {
            config,
            codec,
            store,
            broker,
            counters: Arc::new(Counters::default()),
            next_session_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Get a reference to the live-feed broker
    pub fn broker(&self) -> &Arc<Broker<StoredImage>> {
        &self.broker
    }

    /// Snapshot of the collector counters
    pub fn stats(&self) -> CollectorStats {
        CollectorStats {
            stored: self.counters.stored.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            storage_failures: self.counters.storage_failures.load(Ordering::Relaxed),
        }
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the accept loop fails.
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Run the server on an already-bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        self.serve_until(listener, std::future::pending()).await
    }

    /// Run the server on an already-bound listener, stopping when the
    /// shutdown future resolves
    ///
    /// Shutdown stops the broker, which closes every open feed
    /// subscription at once.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "collector listening");
        }
        let broker_task = self.broker.start();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        self.broker.stop().await;
        let _ = broker_task.await;
        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        let _permit = if let Some(ref sem) = self.connection_semaphore {
            match Arc::clone(sem).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(session_id, peer = %peer_addr, "new connection");

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::debug!(session_id, error = %e, "failed to set TCP_NODELAY");
            }
        }

        let codec = Arc::clone(&self.codec);
        let store = Arc::clone(&self.store);
        let broker = Arc::clone(&self.broker);
        let counters = Arc::clone(&self.counters);

        tokio::spawn(async move {
            let result = connection(session_id, socket, codec, store, broker, counters).await;
            match result {
                Ok(()) => tracing::debug!(session_id, "connection closed"),
                Err(e) => tracing::debug!(session_id, error = %e, "connection error"),
            }
            drop(_permit);
        });
    }
}

async fn connection(
    session_id: u64,
    socket: TcpStream,
    codec: Arc<dyn ImageCodec>,
    store: Arc<dyn ImageStore>,
    broker: Arc<Broker<StoredImage>>,
    counters: Arc<Counters>,
) -> Result<()> {
    let framed = Framed::new(socket, WireCodec::new());
    let (mut sink, mut stream) = framed.split();

    while let Some(frame) = stream.next().await {
        match frame? {
            Frame::StoreImage(request) => {
                tracing::info!(session_id, id = %request.id, timestamp = %request.timestamp, "store image request");
                store_image(&*codec, &*store, &broker, &counters, request).await;
                // Processing failures were logged above; the agent
                // still gets its ack.
                sink.send(Frame::StoreAck).await?;
            }
            Frame::LiveStream => return stream_feed(session_id, sink, stream, &broker).await,
            other => {
                return Err(ProtocolError::UnexpectedFrame(format!(
                    "kind 0x{:02x} from client",
                    other.kind()
                ))
                .into())
            }
        }
    }
    Ok(())
}

/// Decode, persist, and broadcast one image
///
/// Exactly one file write and one broadcast per successful call; zero
/// of both on any failure.
async fn store_image(
    codec: &dyn ImageCodec,
    store: &dyn ImageStore,
    broker: &Broker<StoredImage>,
    counters: &Counters,
    request: StoreImageRequest,
) {
    let decoded = match codec.decode(&request.image) {
        Ok(decoded) => decoded,
        Err(e) => {
            counters.decode_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(id = %request.id, error = %e, "raw image could not be decoded");
            return;
        }
    };

    let url = match store.persist(&decoded, request.timestamp).await {
        Ok(url) => url,
        Err(e) => {
            counters.storage_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(id = %request.id, error = %e, "could not persist image");
            return;
        }
    };
    counters.stored.fetch_add(1, Ordering::Relaxed);

    let image = StoredImage {
        url,
        timestamp: request.timestamp,
        id: request.id,
    };
    broker.publish(image.clone()).await;
    tracing::info!(id = %image.id, url = %image.url, "image broadcast");
}

/// Forward broker announcements to one feed consumer
///
/// Ends when the broker shuts down (inbox closed), the consumer
/// disconnects (read half returns EOF, observed promptly rather than on
/// the next failed send), or a send fails. The subscription drops on
/// every exit path, which unregisters it.
async fn stream_feed(
    session_id: u64,
    mut sink: SplitSink<Framed<TcpStream, WireCodec>, Frame>,
    mut stream: SplitStream<Framed<TcpStream, WireCodec>>,
    broker: &Broker<StoredImage>,
) -> Result<()> {
    let mut subscription = match broker.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            sink.send(Frame::Problem("subscription unavailable".into()))
                .await?;
            return Err(e);
        }
    };
    tracing::info!(session_id, subscriber = subscription.id(), "live stream attached");

    loop {
        tokio::select! {
            item = subscription.recv() => match item {
                Some(image) => sink.send(Frame::Feed(image.into())).await?,
                None => {
                    tracing::debug!(session_id, "broker closed the subscription");
                    break;
                }
            },
            frame = stream.next() => match frame {
                None => {
                    tracing::debug!(session_id, "live stream caller disconnected");
                    break;
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(other)) => {
                    return Err(ProtocolError::UnexpectedFrame(format!(
                        "kind 0x{:02x} during live stream",
                        other.kind()
                    ))
                    .into())
                }
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use chrono::{DateTime, Utc};

    use crate::client::CollectorClient;
    use crate::protocol::RawImage;

    use super::*;

    fn ts() -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
    }

    fn jpeg_request(id: &str) -> StoreImageRequest {
        StoreImageRequest {
            image: RawImage {
                rows: 0,
                cols: 0,
                encoding: super::super::codec::ENCODING_JPEG,
                data: Bytes::from_static(&[0xff, 0xd8, 0xff, 0xe0, 0, 1, 2, 3]),
            },
            timestamp: ts(),
            id: id.to_string(),
        }
    }

    fn undecodable_request(id: &str) -> StoreImageRequest {
        StoreImageRequest {
            image: RawImage {
                rows: 1,
                cols: 1,
                encoding: 99, // no codec understands this tag
                data: Bytes::from_static(&[0]),
            },
            timestamp: ts(),
            id: id.to_string(),
        }
    }

    async fn spawn_server() -> (Arc<CollectorServer>, SocketAddr, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let config = CollectorConfig::default()
            .image_dir(dir.path())
            .public_base("http://localhost:8000/image");
        let server = Arc::new(CollectorServer::new(config));

        let task_server = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = task_server.serve(listener).await;
        });

        (server, addr, dir)
    }

    #[tokio::test]
    async fn test_store_and_live_stream_end_to_end() {
        let (_server, addr, dir) = spawn_server().await;

        let consumer = CollectorClient::connect(addr).await.unwrap();
        let mut feed = consumer.live_stream().await.unwrap();

        let mut agent = CollectorClient::connect(addr).await.unwrap();
        agent.store_image(jpeg_request("cam0.1")).await.unwrap();

        let event = feed.next_event().await.unwrap().unwrap();
        assert_eq!(event.id, "cam0.1");
        assert!(event.image_url.starts_with("http://localhost:8000/image/"));
        assert!(event.image_url.ends_with(".jpg"));

        // Exactly one file was written.
        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_image_is_acked_but_not_broadcast() {
        let (server, addr, _dir) = spawn_server().await;

        let consumer = CollectorClient::connect(addr).await.unwrap();
        let mut feed = consumer.live_stream().await.unwrap();

        // Silent degradation: an undecodable buffer still gets a
        // normal ack (store_image returning Ok proves the ack arrived)
        // and produces no broadcast and no file.
        let mut agent = CollectorClient::connect(addr).await.unwrap();
        agent.store_image(undecodable_request("bad.1")).await.unwrap();

        // A following valid ingest still works: the failure corrupted
        // nothing.
        agent.store_image(jpeg_request("good.1")).await.unwrap();

        let event = feed.next_event().await.unwrap().unwrap();
        assert_eq!(event.id, "good.1");

        let stats = server.stats();
        assert_eq!(stats.decode_failures, 1);
        assert_eq!(stats.stored, 1);
        assert_eq!(server.broker().stats().published, 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_acked_and_counted_separately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Point the store at a directory that does not exist.
        let config = CollectorConfig::default()
            .image_dir("/nonexistent/lookout-test")
            .public_base("http://localhost:8000/image");
        let server = Arc::new(CollectorServer::new(config));
        let task_server = Arc::clone(&server);
        tokio::spawn(async move {
            let _ = task_server.serve(listener).await;
        });

        let mut agent = CollectorClient::connect(addr).await.unwrap();
        agent.store_image(jpeg_request("cam0.1")).await.unwrap();

        let stats = server.stats();
        assert_eq!(stats.storage_failures, 1);
        assert_eq!(stats.decode_failures, 0);
        assert_eq!(stats.stored, 0);
        assert_eq!(server.broker().stats().published, 0);
    }

    #[tokio::test]
    async fn test_disconnected_consumer_is_unsubscribed() {
        let (server, addr, _dir) = spawn_server().await;

        let consumer = CollectorClient::connect(addr).await.unwrap();
        let feed = consumer.live_stream().await.unwrap();

        // Wait for the subscription to register.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while server.broker().stats().subscribers == 0 {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // Consumer goes away mid-feed.
        drop(feed);

        // Within a bounded time the handler observes the disconnect and
        // the subscription leaves the active set.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
        while server.broker().stats().subscribers != 0 {
            assert!(tokio::time::Instant::now() < deadline);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
