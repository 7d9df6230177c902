//! Framed codec for collector connections
//!
//! Adapts the frame encoding to `tokio_util::codec` so connections can
//! be driven as a `Framed` sink/stream pair.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, ProtocolError, Result};

use super::frame::{Frame, HEADER_SIZE, MAX_FRAME_SIZE};

/// Length-prefixed frame codec
#[derive(Debug, Clone)]
pub struct WireCodec {
    max_frame_size: usize,
}

impl WireCodec {
    /// Create a codec with the default frame size limit
    pub fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom frame size limit
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for WireCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for WireCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let kind = src[0];
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            }
            .into());
        }

        if src.len() < HEADER_SIZE + len {
            // Wait for the rest of the payload.
            src.reserve(HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame::decode(kind, payload)?))
    }
}

impl Encoder<Frame> for WireCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        frame.encode(dst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use crate::protocol::frame::FeedEvent;

    use super::*;

    fn feed_frame() -> Frame {
        Frame::Feed(FeedEvent {
            image_url: "/image/a.jpg".into(),
            timestamp: DateTime::from_timestamp_millis(5).unwrap(),
            id: "cam".into(),
        })
    }

    #[test]
    fn test_incremental_decode() {
        let mut codec = WireCodec::new();
        let mut wire = BytesMut::new();
        feed_frame().encode(&mut wire);

        // Feed the bytes one at a time; the codec must keep returning
        // None until the full frame has arrived.
        let mut buf = BytesMut::new();
        for (i, byte) in wire.iter().enumerate() {
            buf.extend_from_slice(&[*byte]);
            let decoded = codec.decode(&mut buf).unwrap();
            if i + 1 < wire.len() {
                assert!(decoded.is_none());
            } else {
                assert_eq!(decoded, Some(feed_frame()));
            }
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_buffer() {
        let mut codec = WireCodec::new();
        let mut buf = BytesMut::new();
        feed_frame().encode(&mut buf);
        Frame::StoreAck.encode(&mut buf);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(feed_frame()));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::StoreAck));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_frame_is_rejected() {
        let mut codec = WireCodec::with_max_frame_size(8);
        let mut buf = BytesMut::new();
        Frame::Problem("this message is longer than eight bytes".into()).encode(&mut buf);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::FrameTooLarge { .. })
        ));
    }
}
