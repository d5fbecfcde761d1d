//! Frame header implementation with zero-copy parsing.
//!
//! The `FrameHeader` is a fixed 24-byte structure serialized as raw
//! binary (Big Endian). The correlation layer routes responses and
//! acknowledgments on header fields alone, without touching the payload.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Frame kind discriminant.
///
/// Client-originated kinds (`Request`, `Notify`) carry a route and an
/// echoed timeout. Server-originated kinds (`Response`, `Ack`) carry a
/// status code and, for responses, a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameKind {
    /// Client call expecting a correlated [`FrameKind::Response`]
    Request = 0x01,
    /// Fire-and-forget client call, acknowledged with [`FrameKind::Ack`]
    Notify = 0x02,
    /// Server reply to a request, matched by correlation id
    Response = 0x81,
    /// Server acknowledgment of a notify, matched by correlation id
    Ack = 0x82,
}

impl FrameKind {
    /// Convert to the wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from the wire byte. `None` for unknown values.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Request),
            0x02 => Some(Self::Notify),
            0x81 => Some(Self::Response),
            0x82 => Some(Self::Ack),
            _ => None,
        }
    }

    /// Whether this kind originates on the client side.
    #[must_use]
    pub fn is_client_origin(self) -> bool {
        matches!(self, Self::Request | Self::Notify)
    }
}

/// Fixed 24-byte frame header (Big Endian network byte order).
///
/// All multi-byte integers are stored in Big Endian format. Fields are
/// raw byte arrays to avoid alignment issues; accessors convert.
///
/// The `#[repr(C, packed)]` layout with zerocopy traits ensures this
/// struct can be cast from untrusted network bytes without undefined
/// behavior: every 24-byte pattern is a structurally valid header, and
/// semantic validation happens in [`FrameHeader::from_bytes`].
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, PartialEq, Eq)]
pub struct FrameHeader {
    // Protocol identification (6 bytes: 0-5)
    magic: [u8; 4], // 0x54455448 ("TETH" in ASCII)
    version: u8,    // 0x01
    kind: u8,       // FrameKind discriminant

    // Result metadata (2 bytes: 6-7)
    status: [u8; 2], // u16; 0 = OK, non-zero = application failure code

    // Correlation (8 bytes: 8-15)
    correlation_id: [u8; 4], // u32 client-assigned call id
    timeout_ms: [u8; 4],     // u32 echoed call timeout in milliseconds

    // Body sizes (8 bytes: 16-23)
    pub(crate) route_len: [u8; 2], // u16 UTF-8 route length
    reserved: [u8; 2],             // zero on the wire
    pub(crate) payload_size: [u8; 4], // u32 payload length
}

impl FrameHeader {
    /// Size of the serialized header (24 bytes)
    pub const SIZE: usize = 24;

    /// Magic number: "TETH" in ASCII (0x54455448)
    pub const MAGIC: u32 = 0x5445_5448;

    /// Current protocol version
    pub const VERSION: u8 = 0x01;

    /// Maximum payload size (1 MiB)
    pub const MAX_PAYLOAD_SIZE: u32 = 1024 * 1024;

    /// Maximum route length in bytes
    pub const MAX_ROUTE_LEN: u16 = 1024;

    /// Create a new header for the given kind, all other fields zero.
    #[must_use]
    pub fn new(kind: FrameKind) -> Self {
        Self {
            magic: Self::MAGIC.to_be_bytes(),
            version: Self::VERSION,
            kind: kind.to_u8(),
            status: [0; 2],
            correlation_id: [0; 4],
            timeout_ms: [0; 4],
            route_len: [0; 2],
            reserved: [0; 2],
            payload_size: [0; 4],
        }
    }

    /// Parse a header from network bytes (zero-copy).
    ///
    /// Casts the buffer prefix directly to a `FrameHeader` reference and
    /// then validates magic, version, and size limits. Cheapest checks
    /// run first so garbage input fails fast.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if fewer than 24 bytes
    /// - [`ProtocolError::InvalidMagic`] on magic mismatch
    /// - [`ProtocolError::UnsupportedVersion`] on version mismatch
    /// - [`ProtocolError::RouteTooLong`] if the claimed route exceeds the limit
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload exceeds the limit
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u32::from_be_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let route_len = u16::from_be_bytes(header.route_len);
        if route_len > Self::MAX_ROUTE_LEN {
            return Err(ProtocolError::RouteTooLong {
                len: route_len as usize,
                max: Self::MAX_ROUTE_LEN as usize,
            });
        }

        let payload_size = u32::from_be_bytes(header.payload_size);
        if payload_size > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: payload_size as usize,
                max: Self::MAX_PAYLOAD_SIZE as usize,
            });
        }

        Ok(header)
    }

    /// Serialize the header to bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Raw frame kind byte.
    #[must_use]
    pub fn kind(&self) -> u8 {
        self.kind
    }

    /// Frame kind as an enum. `None` for unknown wire values.
    #[must_use]
    pub fn kind_enum(&self) -> Option<FrameKind> {
        FrameKind::from_u8(self.kind)
    }

    /// Status code. Zero means success; non-zero values are
    /// application-defined failure codes.
    #[must_use]
    pub fn status(&self) -> u16 {
        u16::from_be_bytes(self.status)
    }

    /// Set the status code.
    pub fn set_status(&mut self, status: u16) {
        self.status = status.to_be_bytes();
    }

    /// Client-assigned correlation id for this call.
    #[must_use]
    pub fn correlation_id(&self) -> u32 {
        u32::from_be_bytes(self.correlation_id)
    }

    /// Set the correlation id.
    pub fn set_correlation_id(&mut self, id: u32) {
        self.correlation_id = id.to_be_bytes();
    }

    /// Echoed call timeout in milliseconds (request/notify only).
    #[must_use]
    pub fn timeout_ms(&self) -> u32 {
        u32::from_be_bytes(self.timeout_ms)
    }

    /// Set the echoed call timeout.
    pub fn set_timeout_ms(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms.to_be_bytes();
    }

    /// Route length in bytes.
    #[must_use]
    pub fn route_len(&self) -> u16 {
        u16::from_be_bytes(self.route_len)
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn payload_size(&self) -> u32 {
        u32::from_be_bytes(self.payload_size)
    }
}

impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("kind", &self.kind_enum())
            .field("status", &self.status())
            .field("correlation_id", &self.correlation_id())
            .field("timeout_ms", &self.timeout_ms())
            .field("route_len", &self.route_len())
            .field("payload_size", &self.payload_size())
            .finish()
    }
}
