//! Error types for the client session core.
//!
//! Usage errors are reported synchronously and never change state;
//! network failures never surface here — they arrive through lifecycle
//! events or per-call outcomes instead.

use thiserror::Error;

use crate::{connection::ConnectionState, events::HandlerId};

/// Errors surfaced synchronously to API callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation is illegal in the current connection state
    #[error("invalid state: cannot {operation} while {state:?}")]
    InvalidState {
        /// State at the time of the call
        state: ConnectionState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Configuration rejected (bad value, unreadable trust anchors, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Frame encoding failed before anything was sent
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Transport-level failure reported at a synchronous boundary
    #[error("transport error: {0}")]
    Transport(String),

    /// Event handler id not found
    #[error("no event handler with id {0}")]
    HandlerNotFound(HandlerId),

    /// The client runtime has been shut down
    #[error("client has been shut down")]
    Terminated,
}

impl From<tether_proto::ProtocolError> for ClientError {
    fn from(err: tether_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
