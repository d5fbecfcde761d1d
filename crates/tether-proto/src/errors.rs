//! Error types for frame encoding and decoding.

use thiserror::Error;

/// Convenience alias for protocol-level results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while encoding or decoding frames.
///
/// Every malformed input maps to a structured error; decoding never
/// panics, regardless of input bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short to contain a header
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum number of bytes required
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Magic number mismatch
    #[error("invalid magic number")]
    InvalidMagic,

    /// Unknown protocol version
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Unknown frame kind byte
    #[error("invalid frame kind: {0:#04x}")]
    InvalidKind(u8),

    /// Payload exceeds the protocol limit
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Maximum allowed payload size
        max: usize,
    },

    /// Route exceeds the protocol limit
    #[error("route too long: {len} bytes exceeds maximum of {max}")]
    RouteTooLong {
        /// Claimed or actual route length
        len: usize,
        /// Maximum allowed route length
        max: usize,
    },

    /// Route bytes are not valid UTF-8
    #[error("route is not valid UTF-8")]
    InvalidRoute,

    /// Buffer ends before the header-claimed route/payload bytes
    #[error("frame truncated: header claims {expected} body bytes, got {actual}")]
    FrameTruncated {
        /// Route + payload bytes the header claims
        expected: usize,
        /// Body bytes actually available
        actual: usize,
    },
}
