//! Collector client
//!
//! Client-side access to a collector:
//! - Pushing captured images (`store_image`)
//! - Consuming the live feed (`live_stream`)

use std::io;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::{FeedEvent, Frame, StoreImageRequest, WireCodec};

/// Connection to a collector
pub struct CollectorClient {
    framed: Framed<TcpStream, WireCodec>,
}

impl CollectorClient {
    /// Connect to a collector
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let socket = TcpStream::connect(addr).await?;
        if let Err(e) = socket.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to set TCP_NODELAY");
        }
        Ok(Self {
            framed: Framed::new(socket, WireCodec::new()),
        })
    }

    /// Store one captured image and wait for the ack
    pub async fn store_image(&mut self, request: StoreImageRequest) -> Result<()> {
        self.framed.send(Frame::StoreImage(request)).await?;

        match self.framed.next().await {
            Some(Ok(Frame::StoreAck)) => Ok(()),
            Some(Ok(Frame::Problem(message))) => Err(Error::Feed(message)),
            Some(Ok(other)) => Err(ProtocolError::UnexpectedFrame(format!(
                "kind 0x{:02x} instead of ack",
                other.kind()
            ))
            .into()),
            Some(Err(e)) => Err(e),
            None => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed").into()),
        }
    }

    /// Subscribe to the live feed
    ///
    /// Consumes the client: the connection belongs to the feed until it
    /// ends. A new subscription sees only future announcements.
    pub async fn live_stream(mut self) -> Result<FeedStream> {
        self.framed.send(Frame::LiveStream).await?;
        Ok(FeedStream {
            framed: self.framed,
        })
    }
}

/// A live feed in progress
pub struct FeedStream {
    framed: Framed<TcpStream, WireCodec>,
}

impl FeedStream {
    /// Receive the next feed event
    ///
    /// `Ok(None)` means the feed ended cleanly (collector shutdown). A
    /// `Problem` frame from the collector surfaces as `Error::Feed`.
    pub async fn next_event(&mut self) -> Result<Option<FeedEvent>> {
        match self.framed.next().await {
            None => Ok(None),
            Some(Ok(Frame::Feed(event))) => Ok(Some(event)),
            Some(Ok(Frame::Problem(message))) => Err(Error::Feed(message)),
            Some(Ok(other)) => Err(ProtocolError::UnexpectedFrame(format!(
                "kind 0x{:02x} in live stream",
                other.kind()
            ))
            .into()),
            Some(Err(e)) => Err(e),
        }
    }
}
