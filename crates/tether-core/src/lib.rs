//! Client session core for the Tether protocol.
//!
//! Pure, I/O-free logic behind a connected client: the connection
//! lifecycle state machine, the lifecycle event dispatch table, and the
//! request/notify correlation layer, composed by [`ClientDriver`].
//!
//! # Architecture
//!
//! The driver follows the action pattern: callers feed it API calls and
//! transport events, it commits state transitions and returns
//! [`Effects`] — transport actions plus an ordered list of callback
//! dispatches — for the runtime to execute. This keeps the core free of
//! I/O and makes every ordering and failure-composition property
//! directly testable.
//!
//! # Components
//!
//! - [`Connection`]: single-connection lifecycle state machine
//! - [`EventHandlers`]: registry of lifecycle observers
//! - [`CallTable`]: pending request/notify bookkeeping with deadlines
//! - [`ClientDriver`]: composition of the three, plus configuration

#![forbid(unsafe_code)]

mod config;
mod connection;
mod correlation;
mod driver;
mod error;
mod events;

pub use config::{ClientConfig, TransportKind};
pub use connection::{Connection, ConnectionState, RemoteAddr};
pub use correlation::{CallInfo, CallKind, CallOutcome, CallResolution, CallTable};
pub use driver::{ClientDriver, Dispatch, Effects, TransportAction, TransportEvent};
pub use error::ClientError;
pub use events::{EventDispatch, EventHandlers, HandlerId, SessionEvent};
