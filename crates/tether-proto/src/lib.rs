//! Wire frame format for the Tether client protocol.
//!
//! A frame is the unit of exchange between a client and its server:
//! a fixed 24-byte binary header (Big Endian), an optional UTF-8 route,
//! and an opaque payload. The header carries everything the correlation
//! layer needs to match a response or acknowledgment back to the call
//! that produced it; payload bytes are never interpreted here.
//!
//! # Components
//!
//! - [`FrameHeader`]: fixed-size header with zero-copy parsing
//! - [`FrameKind`]: request / notify / response / ack discriminant
//! - [`Frame`]: header + route + payload with encode/decode
//! - [`ProtocolError`]: structured decode/encode failures

mod errors;
mod frame;
mod header;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{FrameHeader, FrameKind};
