//! Connection lifecycle state machine.
//!
//! Owns one connection's lifecycle atop a transport and is the sole
//! authority for whether sends are currently legal. Pure state: the
//! driver feeds transport outcomes in and publishes the returned
//! lifecycle events after each transition commits.
//!
//! # State Machine
//!
//! ```text
//!                   connect()             stream ready (plain)
//! ┌──────────────┐ ──────────> ┌────────────┐ ─────────────────┐
//! │ Disconnected │             │ Connecting │                  │
//! └──────────────┘ <────────── └────────────┘                  │
//!        ^          error /          │ stream ready (tls)      │
//!        │          handshake fail   v                         v
//!        │                    ┌─────────────┐  pass    ┌───────────┐
//!        │                    │ Handshaking │ ───────> │ Connected │
//!        │                    └─────────────┘          └───────────┘
//!        │                                                     │
//!        │          ┌───────────────┐      disconnect() /      │
//!        └────────< │ Disconnecting │ <─── peer close / error ─┘
//!                   └───────────────┘
//! ```
//!
//! Every transition into `Disconnected` resets the connection so a new
//! `connect()` is accepted afterwards.

use crate::{config::TransportKind, error::ClientError, events::SessionEvent};

/// Lifecycle reason used when the stream closes during an attempt.
const CLOSED_WHILE_CONNECTING: &str = "connection closed";

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; initial and terminal state
    Disconnected,
    /// TCP dial in progress
    Connecting,
    /// Stream up, TLS handshake in progress (TLS transport only)
    Handshaking,
    /// Session established; calls may be issued
    Connected,
    /// Local disconnect in progress, waiting for the stream to close
    Disconnecting,
}

/// Remote endpoint of a connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddr {
    /// Host name or address as given to `connect()`
    pub host: String,
    /// TCP port
    pub port: u16,
}

/// Single-connection lifecycle state machine.
///
/// No I/O and no timers; the driver passes transport outcomes in and
/// the runtime executes whatever events fall out. Methods that react to
/// transport notifications are infallible: a notification that does not
/// apply to the current state (stale, duplicate) is ignored rather than
/// treated as an error.
#[derive(Debug, Clone)]
pub struct Connection {
    state: ConnectionState,
    transport: TransportKind,
    remote: Option<RemoteAddr>,
}

impl Connection {
    /// Create a new connection in [`ConnectionState::Disconnected`].
    #[must_use]
    pub fn new(transport: TransportKind) -> Self {
        Self { state: ConnectionState::Disconnected, transport, remote: None }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transport kind this connection uses.
    #[must_use]
    pub fn transport_kind(&self) -> TransportKind {
        self.transport
    }

    /// Remote endpoint of the current attempt/session, if any.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteAddr> {
        self.remote.as_ref()
    }

    /// Whether calls may currently be issued.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Begin a connection attempt.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidState` unless currently `Disconnected`.
    pub fn begin_connect(&mut self, host: &str, port: u16) -> Result<(), ClientError> {
        if self.state != ConnectionState::Disconnected {
            return Err(ClientError::InvalidState { state: self.state, operation: "connect" });
        }

        self.state = ConnectionState::Connecting;
        self.remote = Some(RemoteAddr { host: host.to_owned(), port });
        Ok(())
    }

    /// Begin a local disconnect.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidState` unless currently `Connected`.
    pub fn begin_disconnect(&mut self) -> Result<(), ClientError> {
        if self.state != ConnectionState::Connected {
            return Err(ClientError::InvalidState { state: self.state, operation: "disconnect" });
        }

        self.state = ConnectionState::Disconnecting;
        Ok(())
    }

    /// The underlying byte stream is ready.
    ///
    /// Plain transport: the connection is up. TLS transport: the
    /// handshake begins; readiness is reported separately.
    pub fn stream_ready(&mut self) -> Option<SessionEvent> {
        if self.state != ConnectionState::Connecting {
            tracing::trace!(state = ?self.state, "ignoring stale stream-ready");
            return None;
        }

        match self.transport {
            TransportKind::Plain => {
                self.state = ConnectionState::Connected;
                Some(SessionEvent::Connected)
            },
            TransportKind::Tls => {
                self.state = ConnectionState::Handshaking;
                None
            },
        }
    }

    /// The TLS handshake completed against the configured trust anchors.
    pub fn handshake_passed(&mut self) -> Option<SessionEvent> {
        if self.state != ConnectionState::Handshaking {
            tracing::trace!(state = ?self.state, "ignoring stale handshake-passed");
            return None;
        }

        self.state = ConnectionState::Connected;
        Some(SessionEvent::Connected)
    }

    /// The TLS handshake was rejected.
    pub fn handshake_failed(&mut self, reason: &str) -> Option<SessionEvent> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Handshaking => {
                self.reset();
                Some(SessionEvent::ConnectFailed { reason: reason.to_owned() })
            },
            _ => {
                tracing::trace!(state = ?self.state, "ignoring stale handshake failure");
                None
            },
        }
    }

    /// The transport reported an error.
    ///
    /// During an attempt this is a connect failure; mid-session it is a
    /// peer-initiated disconnect carrying the error reason.
    pub fn transport_error(&mut self, reason: &str) -> Option<SessionEvent> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Handshaking => {
                self.reset();
                Some(SessionEvent::ConnectFailed { reason: reason.to_owned() })
            },
            ConnectionState::Connected => {
                self.reset();
                Some(SessionEvent::Disconnect { reason: Some(reason.to_owned()) })
            },
            ConnectionState::Disconnecting => {
                // Error while tearing down is still a clean local disconnect.
                self.reset();
                Some(SessionEvent::Disconnect { reason: None })
            },
            ConnectionState::Disconnected => None,
        }
    }

    /// The transport closed (clean EOF or local teardown finished).
    pub fn transport_closed(&mut self) -> Option<SessionEvent> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Handshaking => {
                self.reset();
                Some(SessionEvent::ConnectFailed { reason: CLOSED_WHILE_CONNECTING.to_owned() })
            },
            ConnectionState::Connected | ConnectionState::Disconnecting => {
                self.reset();
                Some(SessionEvent::Disconnect { reason: None })
            },
            ConnectionState::Disconnected => None,
        }
    }

    fn reset(&mut self) {
        self.state = ConnectionState::Disconnected;
        self.remote = None;
    }
}
