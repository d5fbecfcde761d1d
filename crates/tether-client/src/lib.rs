//! Tokio runtime client for the Tether protocol.
//!
//! Pairs the pure session core from `tether-core` with real I/O: a
//! TCP/TLS transport task per connection attempt, an executor task
//! feeding transport events into the driver, and a ticker driving call
//! timeouts. TLS connections are gated by a [`TrustStore`] loaded from
//! PEM certificate-authority files.
//!
//! # Example
//!
//! ```no_run
//! use tether_client::{Client, ClientConfig, SessionEvent, TransportKind};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), tether_client::ClientError> {
//! let client = Client::init(ClientConfig {
//!     transport: TransportKind::Tls,
//!     ..ClientConfig::default()
//! })?;
//!
//! client.set_ca_file("ca.pem")?;
//! client.add_event_handler(|event| {
//!     if let SessionEvent::Connected = event {
//!         println!("up");
//!     }
//! })?;
//! client.connect("game.example.com", 3251)?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod client;
mod transport;
mod trust;

pub use client::Client;
pub use tether_core::{
    CallInfo, CallKind, CallOutcome, ClientConfig, ClientError, ConnectionState, HandlerId,
    SessionEvent, TransportKind,
};
pub use trust::TrustStore;
