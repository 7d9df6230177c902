//! Wire frame types and their binary encoding
//!
//! Every message on a collector connection is one frame:
//!
//! ```text
//! +------+-------------+- - - - - - - -+
//! | kind | length (BE) |    payload    |
//! | u8   | u32         | length bytes  |
//! +------+-------------+- - - - - - - -+
//! ```
//!
//! Integers are big-endian. Strings are length-prefixed UTF-8 (`u16`
//! length); image data is length-prefixed raw bytes (`u32` length).
//! Timestamps travel as `i64` milliseconds since the Unix epoch.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::error::ProtocolError;

/// Frame header size: kind byte plus payload length
pub const HEADER_SIZE: usize = 5;

/// Maximum accepted payload size
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Frame kind bytes
pub const KIND_STORE_IMAGE: u8 = 0x01;
pub const KIND_STORE_ACK: u8 = 0x02;
pub const KIND_LIVE_STREAM: u8 = 0x03;
pub const KIND_FEED: u8 = 0x04;
pub const KIND_PROBLEM: u8 = 0x05;

/// A raw image buffer as captured by a device
///
/// The encoding tag is opaque to the protocol; only the image codec
/// collaborator interprets it, so an unknown tag is never a wire error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// Pixel rows
    pub rows: u32,
    /// Pixel columns
    pub cols: u32,
    /// Encoding tag (see `collect::codec`)
    pub encoding: u32,
    /// Image bytes (reference-counted, cheap to clone)
    pub data: Bytes,
}

/// Request to store one captured image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreImageRequest {
    pub image: RawImage,
    /// Capture time
    pub timestamp: DateTime<Utc>,
    /// Caller-supplied identifier, expected but not guaranteed unique
    pub id: String,
}

/// One live-feed item announcing a newly stored image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEvent {
    pub image_url: String,
    pub timestamp: DateTime<Utc>,
    pub id: String,
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Client → server: store a captured image
    StoreImage(StoreImageRequest),
    /// Server → client: store request processed
    StoreAck,
    /// Client → server: subscribe to the live feed
    LiveStream,
    /// Server → client: one live-feed item
    Feed(FeedEvent),
    /// Server → client: request-level failure description
    Problem(String),
}

impl Frame {
    /// Kind byte for this frame
    pub fn kind(&self) -> u8 {
        match self {
            Frame::StoreImage(_) => KIND_STORE_IMAGE,
            Frame::StoreAck => KIND_STORE_ACK,
            Frame::LiveStream => KIND_LIVE_STREAM,
            Frame::Feed(_) => KIND_FEED,
            Frame::Problem(_) => KIND_PROBLEM,
        }
    }

    /// Encode this frame, header included, into `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        let mut payload = BytesMut::new();
        match self {
            Frame::StoreImage(req) => {
                payload.put_u32(req.image.rows);
                payload.put_u32(req.image.cols);
                payload.put_u32(req.image.encoding);
                payload.put_i64(req.timestamp.timestamp_millis());
                put_string(&mut payload, &req.id);
                payload.put_u32(req.image.data.len() as u32);
                payload.put_slice(&req.image.data);
            }
            Frame::StoreAck | Frame::LiveStream => {}
            Frame::Feed(event) => {
                put_string(&mut payload, &event.image_url);
                payload.put_i64(event.timestamp.timestamp_millis());
                put_string(&mut payload, &event.id);
            }
            Frame::Problem(message) => {
                put_string(&mut payload, message);
            }
        }

        dst.reserve(HEADER_SIZE + payload.len());
        dst.put_u8(self.kind());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
    }

    /// Decode a frame from its kind byte and complete payload
    pub fn decode(kind: u8, mut payload: Bytes) -> Result<Frame, ProtocolError> {
        match kind {
            KIND_STORE_IMAGE => {
                let rows = take_u32(&mut payload)?;
                let cols = take_u32(&mut payload)?;
                let encoding = take_u32(&mut payload)?;
                let timestamp = take_timestamp(&mut payload)?;
                let id = take_string(&mut payload)?;
                let data = take_bytes(&mut payload)?;
                Ok(Frame::StoreImage(StoreImageRequest {
                    image: RawImage {
                        rows,
                        cols,
                        encoding,
                        data,
                    },
                    timestamp,
                    id,
                }))
            }
            KIND_STORE_ACK => Ok(Frame::StoreAck),
            KIND_LIVE_STREAM => Ok(Frame::LiveStream),
            KIND_FEED => {
                let image_url = take_string(&mut payload)?;
                let timestamp = take_timestamp(&mut payload)?;
                let id = take_string(&mut payload)?;
                Ok(Frame::Feed(FeedEvent {
                    image_url,
                    timestamp,
                    id,
                }))
            }
            KIND_PROBLEM => Ok(Frame::Problem(take_string(&mut payload)?)),
            other => Err(ProtocolError::UnknownFrameKind(other)),
        }
    }
}

fn put_string(dst: &mut BytesMut, s: &str) {
    dst.put_u16(s.len() as u16);
    dst.put_slice(s.as_bytes());
}

fn take_u32(src: &mut Bytes) -> Result<u32, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::Truncated);
    }
    Ok(src.get_u32())
}

fn take_timestamp(src: &mut Bytes) -> Result<DateTime<Utc>, ProtocolError> {
    if src.remaining() < 8 {
        return Err(ProtocolError::Truncated);
    }
    let millis = src.get_i64();
    DateTime::from_timestamp_millis(millis).ok_or(ProtocolError::InvalidTimestamp(millis))
}

fn take_string(src: &mut Bytes) -> Result<String, ProtocolError> {
    if src.remaining() < 2 {
        return Err(ProtocolError::Truncated);
    }
    let len = src.get_u16() as usize;
    if src.remaining() < len {
        return Err(ProtocolError::Truncated);
    }
    let raw = src.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidString)
}

fn take_bytes(src: &mut Bytes) -> Result<Bytes, ProtocolError> {
    if src.remaining() < 4 {
        return Err(ProtocolError::Truncated);
    }
    let len = src.get_u32() as usize;
    if src.remaining() < len {
        return Err(ProtocolError::Truncated);
    }
    Ok(src.split_to(len))
}
