//! Frame type combining header, route, and payload.
//!
//! A `Frame` is the transport-layer packet consisting of:
//! - 24-byte raw binary header (Big Endian)
//! - UTF-8 route string (client-originated frames only)
//! - Variable-length opaque payload bytes
//!
//! Payload bytes are never interpreted; serialization of application
//! data is the caller's concern.

use bytes::{BufMut, Bytes};

use crate::{
    errors::{ProtocolError, Result},
    header::{FrameHeader, FrameKind},
};

/// Complete protocol frame.
///
/// Layout on the wire:
/// `[FrameHeader: 24 bytes] + [route: route_len bytes] + [payload: variable]`
///
/// # Invariants
///
/// - Size consistency: `route.len()` matches `header.route_len()` and
///   `payload.len()` matches `header.payload_size()`. Enforced by
///   [`Frame::new`] and verified by [`Frame::decode`].
/// - Size limits: route ≤ [`FrameHeader::MAX_ROUTE_LEN`], payload ≤
///   [`FrameHeader::MAX_PAYLOAD_SIZE`]. Violations are rejected during
///   encoding and decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame header (24 bytes)
    pub header: FrameHeader,

    /// Route naming the destination handler on the server. Empty for
    /// server-originated frames.
    pub route: String,

    /// Raw payload bytes (opaque to this layer)
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with automatic size bookkeeping.
    ///
    /// The header's `route_len` and `payload_size` fields are set to
    /// match the carried data, so a constructed frame cannot claim sizes
    /// it does not have. Over-limit routes and payloads are still
    /// rejected later by [`Frame::encode`].
    #[must_use]
    pub fn new(mut header: FrameHeader, route: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        let route = route.into();
        let payload = payload.into();

        // Saturating conversions keep construction infallible; encode
        // rejects anything over the (far smaller) protocol limits.
        let route_len = u16::try_from(route.len()).unwrap_or(u16::MAX);
        let payload_len = u32::try_from(payload.len()).unwrap_or(u32::MAX);

        header.route_len = route_len.to_be_bytes();
        header.payload_size = payload_len.to_be_bytes();

        Self { header, route, payload }
    }

    /// Build a request frame carrying a correlation id, route, payload,
    /// and the echoed timeout.
    #[must_use]
    pub fn request(
        correlation_id: u32,
        route: impl Into<String>,
        payload: impl Into<Bytes>,
        timeout_ms: u32,
    ) -> Self {
        let mut header = FrameHeader::new(FrameKind::Request);
        header.set_correlation_id(correlation_id);
        header.set_timeout_ms(timeout_ms);
        Self::new(header, route, payload)
    }

    /// Build a notify frame. Same shape as a request; the kind encodes
    /// the fire-and-forget intent.
    #[must_use]
    pub fn notify(
        correlation_id: u32,
        route: impl Into<String>,
        payload: impl Into<Bytes>,
        timeout_ms: u32,
    ) -> Self {
        let mut header = FrameHeader::new(FrameKind::Notify);
        header.set_correlation_id(correlation_id);
        header.set_timeout_ms(timeout_ms);
        Self::new(header, route, payload)
    }

    /// Build a response frame for a request.
    #[must_use]
    pub fn response(correlation_id: u32, status: u16, payload: impl Into<Bytes>) -> Self {
        let mut header = FrameHeader::new(FrameKind::Response);
        header.set_correlation_id(correlation_id);
        header.set_status(status);
        Self::new(header, String::new(), payload)
    }

    /// Build an acknowledgment frame for a notify.
    #[must_use]
    pub fn ack(correlation_id: u32, status: u16) -> Self {
        let mut header = FrameHeader::new(FrameKind::Ack);
        header.set_correlation_id(correlation_id);
        header.set_status(status);
        Self::new(header, String::new(), Bytes::new())
    }

    /// Frame kind. `None` if the header carries an unknown kind byte.
    #[must_use]
    pub fn kind(&self) -> Option<FrameKind> {
        self.header.kind_enum()
    }

    /// Total encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE
            .saturating_add(self.route.len())
            .saturating_add(self.payload.len())
    }

    /// Encode the frame into a buffer.
    ///
    /// Writes `[header] + [route] + [payload]`. This is the enforcement
    /// point for the route and payload size limits.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::RouteTooLong`] if the route exceeds the limit
    /// - [`ProtocolError::PayloadTooLarge`] if the payload exceeds the limit
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        debug_assert_eq!(self.route.len(), self.header.route_len() as usize);
        debug_assert_eq!(self.payload.len(), self.header.payload_size() as usize);

        if self.route.len() > FrameHeader::MAX_ROUTE_LEN as usize {
            return Err(ProtocolError::RouteTooLong {
                len: self.route.len(),
                max: FrameHeader::MAX_ROUTE_LEN as usize,
            });
        }

        if self.payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(self.route.as_bytes());
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a frame from wire format.
    ///
    /// All header validation happens before any body bytes are copied;
    /// malformed input is rejected without allocation. Trailing bytes
    /// beyond the header-claimed sizes are ignored.
    ///
    /// # Errors
    ///
    /// - Any header error from [`FrameHeader::from_bytes`]
    /// - [`ProtocolError::InvalidKind`] for an unknown kind byte
    /// - [`ProtocolError::FrameTruncated`] if the body is shorter than claimed
    /// - [`ProtocolError::InvalidRoute`] if route bytes are not UTF-8
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = FrameHeader::from_bytes(bytes)?;

        if header.kind_enum().is_none() {
            return Err(ProtocolError::InvalidKind(header.kind()));
        }

        let route_len = header.route_len() as usize;
        let payload_size = header.payload_size() as usize;
        let body_len = route_len.saturating_add(payload_size);
        let total = FrameHeader::SIZE.saturating_add(body_len);

        if bytes.len() < total {
            return Err(ProtocolError::FrameTruncated {
                expected: body_len,
                actual: bytes.len().saturating_sub(FrameHeader::SIZE),
            });
        }

        let route_end = FrameHeader::SIZE.saturating_add(route_len);
        let route_bytes = bytes
            .get(FrameHeader::SIZE..route_end)
            .ok_or(ProtocolError::FrameTruncated { expected: body_len, actual: 0 })?;
        let route =
            std::str::from_utf8(route_bytes).map_err(|_| ProtocolError::InvalidRoute)?.to_owned();

        let payload_bytes = bytes
            .get(route_end..total)
            .ok_or(ProtocolError::FrameTruncated { expected: body_len, actual: 0 })?;
        let payload = Bytes::copy_from_slice(payload_bytes);

        debug_assert_eq!(payload.len(), payload_size);

        Ok(Self { header: *header, route, payload })
    }
}
