//! Client configuration.

use std::time::Duration;

use crate::error::ClientError;

/// Default per-call timeout when the caller passes none.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Default limit on how long a dial (TCP connect + TLS handshake) may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between timeout-processing ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Transport selection for the single physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Plain TCP stream
    Plain,
    /// TLS over TCP, handshake gated by the trust store
    Tls,
}

/// Client configuration, validated at init time.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Which transport to use for connections
    pub transport: TransportKind,
    /// TLS server name (SNI). Defaults to the dialed host when `None`.
    pub server_name: Option<String>,
    /// Per-call timeout applied when a call does not specify one
    pub default_call_timeout: Duration,
    /// Limit on dial duration before the attempt fails
    pub connect_timeout: Duration,
    /// Interval between deadline-processing ticks
    pub tick_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Plain,
            server_name: None,
            default_call_timeout: DEFAULT_CALL_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` for zero durations, which would disable
    /// timeout processing entirely.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.default_call_timeout.is_zero() {
            return Err(ClientError::Config("default_call_timeout must be non-zero".to_string()));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::Config("connect_timeout must be non-zero".to_string()));
        }
        if self.tick_interval.is_zero() {
            return Err(ClientError::Config("tick_interval must be non-zero".to_string()));
        }
        Ok(())
    }
}
