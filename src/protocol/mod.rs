//! Collector wire protocol
//!
//! A collector connection carries length-prefixed binary frames in both
//! directions. A connection is used in one of two modes:
//!
//! ```text
//! Capture agent                            Collector
//!   |-------- StoreImage ------------------->|
//!   |<------- StoreAck ----------------------|   (repeat)
//!
//! Feed consumer                            Collector
//!   |-------- LiveStream ------------------->|
//!   |<------- Feed --------------------------|
//!   |<------- Feed --------------------------|   (until either side closes)
//!   |<------- Problem -----------------------|   (request-level failure)
//! ```

pub mod codec;
pub mod frame;

pub use codec::WireCodec;
pub use frame::{FeedEvent, Frame, RawImage, StoreImageRequest, MAX_FRAME_SIZE};
