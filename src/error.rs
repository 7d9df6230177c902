//! Error types for the lookout crate

use std::io;

/// Convenience result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error from a socket or the filesystem
    Io(io::Error),
    /// Wire protocol violation
    Protocol(ProtocolError),
    /// Image payload could not be decoded
    Codec(String),
    /// Decoded image could not be persisted
    Storage(String),
    /// The broker is stopped and not accepting operations
    Unavailable,
    /// The upstream feed reported a problem
    Feed(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Codec(msg) => write!(f, "Codec error: {}", msg),
            Error::Storage(msg) => write!(f, "Storage error: {}", msg),
            Error::Unavailable => write!(f, "Subscription unavailable"),
            Error::Feed(msg) => write!(f, "Feed problem: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

/// Error type for wire protocol violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Unrecognized frame kind byte
    UnknownFrameKind(u8),
    /// Frame payload exceeds the maximum allowed size
    FrameTooLarge { size: usize, max: usize },
    /// Frame payload ended before all declared fields were read
    Truncated,
    /// A string field was not valid UTF-8
    InvalidString,
    /// A timestamp field was outside the representable range
    InvalidTimestamp(i64),
    /// A frame arrived that is not valid in the current connection state
    UnexpectedFrame(String),
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::UnknownFrameKind(kind) => {
                write!(f, "Unknown frame kind: 0x{:02x}", kind)
            }
            ProtocolError::FrameTooLarge { size, max } => {
                write!(f, "Frame too large: {} bytes (max {})", size, max)
            }
            ProtocolError::Truncated => write!(f, "Frame payload truncated"),
            ProtocolError::InvalidString => write!(f, "String field is not valid UTF-8"),
            ProtocolError::InvalidTimestamp(ms) => {
                write!(f, "Timestamp out of range: {}ms", ms)
            }
            ProtocolError::UnexpectedFrame(what) => write!(f, "Unexpected frame: {}", what),
        }
    }
}

impl std::error::Error for ProtocolError {}
