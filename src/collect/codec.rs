//! Image codec collaborator
//!
//! The collector treats image decoding as an opaque step behind the
//! [`ImageCodec`] trait: bytes and metadata in, a store-ready payload
//! out. The standard implementation validates compressed payloads by
//! signature and wraps raw pixel buffers into netpbm containers; it
//! never interprets pixel contents beyond that.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::RawImage;

/// Encoding tags understood by [`StdImageCodec`]
///
/// The tag is opaque at the wire level; an unknown value is a codec
/// error, never a protocol error.
pub const ENCODING_JPEG: u32 = 1;
pub const ENCODING_PNG: u32 = 2;
pub const ENCODING_GRAY8: u32 = 3;
pub const ENCODING_BGR8: u32 = 4;

const JPEG_MAGIC: [u8; 3] = [0xff, 0xd8, 0xff];
const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// A decoded image ready for persistence
#[derive(Debug, Clone)]
pub struct DecodedImage {
    /// File contents
    pub data: Bytes,
    /// File extension for the stored object
    pub extension: &'static str,
}

/// Decodes a raw capture buffer into a storable image file
pub trait ImageCodec: Send + Sync {
    fn decode(&self, raw: &RawImage) -> Result<DecodedImage>;
}

/// Standard codec
///
/// Compressed formats (JPEG, PNG) are signature-checked and passed
/// through unchanged. Raw pixel buffers are dimension-checked and
/// wrapped into PGM (grayscale) or PPM (BGR, swapped to RGB).
#[derive(Debug, Default)]
pub struct StdImageCodec;

impl StdImageCodec {
    pub fn new() -> Self {
        Self
    }

    fn expected_len(raw: &RawImage, bytes_per_pixel: usize) -> Result<usize> {
        (raw.rows as usize)
            .checked_mul(raw.cols as usize)
            .and_then(|px| px.checked_mul(bytes_per_pixel))
            .filter(|len| *len > 0)
            .ok_or_else(|| {
                Error::Codec(format!("invalid dimensions {}x{}", raw.rows, raw.cols))
            })
    }

    fn check_raw_len(raw: &RawImage, bytes_per_pixel: usize) -> Result<()> {
        let expected = Self::expected_len(raw, bytes_per_pixel)?;
        if raw.data.len() != expected {
            return Err(Error::Codec(format!(
                "buffer is {} bytes, {}x{} frame needs {}",
                raw.data.len(),
                raw.rows,
                raw.cols,
                expected
            )));
        }
        Ok(())
    }
}

impl ImageCodec for StdImageCodec {
    fn decode(&self, raw: &RawImage) -> Result<DecodedImage> {
        match raw.encoding {
            ENCODING_JPEG => {
                if !raw.data.starts_with(&JPEG_MAGIC) {
                    return Err(Error::Codec("missing JPEG signature".into()));
                }
                Ok(DecodedImage {
                    data: raw.data.clone(),
                    extension: "jpg",
                })
            }
            ENCODING_PNG => {
                if !raw.data.starts_with(&PNG_MAGIC) {
                    return Err(Error::Codec("missing PNG signature".into()));
                }
                Ok(DecodedImage {
                    data: raw.data.clone(),
                    extension: "png",
                })
            }
            ENCODING_GRAY8 => {
                Self::check_raw_len(raw, 1)?;
                let mut out = BytesMut::new();
                out.put_slice(format!("P5\n{} {}\n255\n", raw.cols, raw.rows).as_bytes());
                out.put_slice(&raw.data);
                Ok(DecodedImage {
                    data: out.freeze(),
                    extension: "pgm",
                })
            }
            ENCODING_BGR8 => {
                Self::check_raw_len(raw, 3)?;
                let mut out = BytesMut::new();
                out.put_slice(format!("P6\n{} {}\n255\n", raw.cols, raw.rows).as_bytes());
                for px in raw.data.chunks_exact(3) {
                    // BGR on the wire, RGB in the container
                    out.put_slice(&[px[2], px[1], px[0]]);
                }
                Ok(DecodedImage {
                    data: out.freeze(),
                    extension: "ppm",
                })
            }
            other => Err(Error::Codec(format!("unknown encoding tag {}", other))),
        }
    }
}
