//! Client driver composing connection, events, and correlation.
//!
//! The driver is the pure decision core behind the runtime client. API
//! calls and transport events go in, state transitions commit, and
//! [`Effects`] come out: transport actions for the I/O layer plus an
//! ordered list of callback dispatches. The runtime holds the driver
//! behind a lock, applies the actions, releases the lock, and only then
//! runs the dispatches, so callbacks are free to call back in.

use std::time::Instant;

use bytes::Bytes;
use tether_proto::{Frame, FrameHeader, FrameKind};

use crate::{
    config::ClientConfig,
    connection::{Connection, ConnectionState, RemoteAddr},
    correlation::{CallInfo, CallKind, CallOutcome, CallResolution, CallTable},
    error::ClientError,
    events::{EventDispatch, EventHandlers, HandlerId, SessionEvent},
};

/// Notification from the transport layer, tagged with the generation of
/// the connection attempt it belongs to.
#[derive(Debug)]
pub enum TransportEvent {
    /// The byte stream is connected (TCP established)
    StreamReady,
    /// The TLS handshake completed successfully
    HandshakePassed,
    /// The TLS handshake was rejected
    HandshakeFailed {
        /// Failure reason as published to lifecycle handlers
        reason: String,
    },
    /// The transport failed with an I/O error
    Error {
        /// Error description
        reason: String,
    },
    /// The transport closed (EOF or teardown finished)
    Closed,
    /// A complete inbound frame
    Frame(Frame),
}

/// Instruction for the I/O layer.
#[derive(Debug, PartialEq, Eq)]
pub enum TransportAction {
    /// Dial the remote and run the transport for this generation
    Open {
        /// Host to dial
        host: String,
        /// TCP port
        port: u16,
        /// Generation tag future transport events must carry
        generation: u64,
    },
    /// Write a frame to the stream
    Send(Frame),
    /// Tear down the transport serving this generation. A handle
    /// already replaced by a newer attempt must be left alone.
    Close {
        /// Generation whose transport should be dropped
        generation: u64,
    },
}

/// One callback invocation owed to the application.
#[derive(Debug)]
pub enum Dispatch {
    /// A lifecycle event with its handler snapshot
    Event(EventDispatch),
    /// A resolved call
    Call(CallResolution),
}

impl Dispatch {
    /// Run the underlying callback(s).
    pub fn run(self) {
        match self {
            Self::Event(dispatch) => dispatch.run(),
            Self::Call(resolution) => resolution.run(),
        }
    }
}

/// Output of a driver method: I/O to perform and callbacks to run.
///
/// Dispatch order is part of the contract: within one transition the
/// lifecycle event precedes the call resolutions it caused, so a
/// disconnect handler always runs before the failed-call callbacks.
#[derive(Debug, Default)]
pub struct Effects {
    /// Transport actions, in order
    pub actions: Vec<TransportAction>,
    /// Callback dispatches, in order; run after releasing the driver lock
    pub dispatches: Vec<Dispatch>,
}

impl Effects {
    /// Whether there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty() && self.dispatches.is_empty()
    }

    fn event(&mut self, dispatch: EventDispatch) {
        self.dispatches.push(Dispatch::Event(dispatch));
    }

    fn calls(&mut self, resolutions: Vec<CallResolution>) {
        self.dispatches.extend(resolutions.into_iter().map(Dispatch::Call));
    }
}

/// Pure client core: lifecycle, observers, and pending calls.
pub struct ClientDriver {
    config: ClientConfig,
    connection: Connection,
    handlers: EventHandlers,
    calls: CallTable,
    generation: u64,
}

impl ClientDriver {
    /// Create a driver from a validated configuration.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` if the configuration fails validation.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let connection = Connection::new(config.transport);
        Ok(Self {
            config,
            connection,
            handlers: EventHandlers::new(),
            calls: CallTable::new(),
            generation: 0,
        })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Remote endpoint of the current attempt/session, if any.
    #[must_use]
    pub fn remote(&self) -> Option<&RemoteAddr> {
        self.connection.remote()
    }

    /// The configuration this driver was created with.
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Number of calls awaiting resolution.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.calls.len()
    }

    /// Register a lifecycle event handler.
    pub fn add_handler(
        &mut self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> HandlerId {
        self.handlers.add(callback)
    }

    /// Remove a lifecycle event handler.
    ///
    /// # Errors
    ///
    /// `ClientError::HandlerNotFound` if the id is unknown.
    pub fn remove_handler(&mut self, id: HandlerId) -> Result<(), ClientError> {
        if self.handlers.remove(id) { Ok(()) } else { Err(ClientError::HandlerNotFound(id)) }
    }

    /// Start a connection attempt.
    ///
    /// Bumps the generation so events from any previous transport task
    /// are discarded, and instructs the runtime to dial.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidState` unless currently disconnected.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<Effects, ClientError> {
        self.connection.begin_connect(host, port)?;
        self.generation += 1;

        tracing::info!(host, port, generation = self.generation, "connecting");

        let mut effects = Effects::default();
        effects.actions.push(TransportAction::Open {
            host: host.to_owned(),
            port,
            generation: self.generation,
        });
        Ok(effects)
    }

    /// Start a local disconnect.
    ///
    /// The lifecycle event and pending-call failures are produced when
    /// the transport confirms the close, not here.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidState` unless currently connected.
    pub fn disconnect(&mut self) -> Result<Effects, ClientError> {
        self.connection.begin_disconnect()?;

        tracing::info!("disconnecting");

        let mut effects = Effects::default();
        effects.actions.push(TransportAction::Close { generation: self.generation });
        Ok(effects)
    }

    /// Tear the client down unconditionally.
    ///
    /// Whatever state the connection is in, the final lifecycle event
    /// is dispatched and every pending call fails, so no callback is
    /// left unresolved. The generation is bumped so in-flight transport
    /// events from the severed attempt are discarded.
    pub fn shutdown(&mut self) -> Effects {
        let mut effects = Effects::default();

        if let Some(event) = self.connection.transport_closed() {
            effects.event(self.handlers.dispatch(event));
        }
        effects.calls(self.calls.fail_all("client shut down"));
        effects.actions.push(TransportAction::Close { generation: self.generation });

        self.generation += 1;
        effects
    }

    /// Issue a request expecting a correlated response.
    ///
    /// `timeout` of `None` uses the configured default. The callback
    /// fires exactly once with the response, a timeout, or a failure.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` unless currently connected
    /// - `ClientError::Protocol` if route or payload exceed frame limits
    pub fn request(
        &mut self,
        route: &str,
        payload: Bytes,
        timeout: Option<std::time::Duration>,
        now: Instant,
        callback: impl FnOnce(&CallInfo, CallOutcome) + Send + 'static,
    ) -> Result<Effects, ClientError> {
        self.issue_call(CallKind::Request, route, payload, timeout, now, callback)
    }

    /// Issue a fire-and-forget notify.
    ///
    /// The callback reports local delivery: an acknowledgment from the
    /// peer's framing layer, a timeout, or a connection failure.
    ///
    /// # Errors
    ///
    /// Same as [`ClientDriver::request`].
    pub fn notify(
        &mut self,
        route: &str,
        payload: Bytes,
        timeout: Option<std::time::Duration>,
        now: Instant,
        callback: impl FnOnce(&CallInfo, CallOutcome) + Send + 'static,
    ) -> Result<Effects, ClientError> {
        self.issue_call(CallKind::Notify, route, payload, timeout, now, callback)
    }

    fn issue_call(
        &mut self,
        kind: CallKind,
        route: &str,
        payload: Bytes,
        timeout: Option<std::time::Duration>,
        now: Instant,
        callback: impl FnOnce(&CallInfo, CallOutcome) + Send + 'static,
    ) -> Result<Effects, ClientError> {
        let operation = match kind {
            CallKind::Request => "request",
            CallKind::Notify => "notify",
        };

        if !self.connection.is_connected() {
            return Err(ClientError::InvalidState { state: self.connection.state(), operation });
        }

        if route.len() > FrameHeader::MAX_ROUTE_LEN as usize {
            return Err(ClientError::Protocol(format!(
                "route length {} exceeds limit {}",
                route.len(),
                FrameHeader::MAX_ROUTE_LEN
            )));
        }
        if payload.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ClientError::Protocol(format!(
                "payload size {} exceeds limit {}",
                payload.len(),
                FrameHeader::MAX_PAYLOAD_SIZE
            )));
        }

        let timeout = timeout.unwrap_or(self.config.default_call_timeout);
        let timeout_ms = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX);

        let id = self.calls.issue(kind, route, payload.clone(), timeout, now, callback);
        let frame = match kind {
            CallKind::Request => Frame::request(id, route, payload, timeout_ms),
            CallKind::Notify => Frame::notify(id, route, payload, timeout_ms),
        };

        let mut effects = Effects::default();
        effects.actions.push(TransportAction::Send(frame));
        Ok(effects)
    }

    /// Process a transport event from the I/O layer.
    ///
    /// Events tagged with a generation other than the current one come
    /// from a superseded transport task and are dropped.
    pub fn handle_transport_event(&mut self, generation: u64, event: TransportEvent) -> Effects {
        if generation != self.generation {
            tracing::trace!(
                generation,
                current = self.generation,
                "dropping event from superseded transport"
            );
            return Effects::default();
        }

        let mut effects = Effects::default();

        match event {
            TransportEvent::StreamReady => {
                if let Some(event) = self.connection.stream_ready() {
                    effects.event(self.handlers.dispatch(event));
                }
            },
            TransportEvent::HandshakePassed => {
                if let Some(event) = self.connection.handshake_passed() {
                    effects.event(self.handlers.dispatch(event));
                }
            },
            TransportEvent::HandshakeFailed { reason } => {
                if let Some(event) = self.connection.handshake_failed(&reason) {
                    effects.event(self.handlers.dispatch(event));
                    effects.calls(self.calls.fail_all(&reason));
                    effects.actions.push(TransportAction::Close { generation });
                }
            },
            TransportEvent::Error { reason } => {
                if let Some(event) = self.connection.transport_error(&reason) {
                    effects.event(self.handlers.dispatch(event));
                    effects.calls(self.calls.fail_all(&reason));
                    effects.actions.push(TransportAction::Close { generation });
                }
            },
            TransportEvent::Closed => {
                if let Some(event) = self.connection.transport_closed() {
                    effects.event(self.handlers.dispatch(event));
                    effects.calls(self.calls.fail_all("connection closed"));
                    effects.actions.push(TransportAction::Close { generation });
                }
            },
            TransportEvent::Frame(frame) => {
                self.handle_frame(frame, &mut effects);
            },
        }

        effects
    }

    /// Process deadline expiry. Called periodically by the runtime.
    pub fn tick(&mut self, now: Instant) -> Effects {
        let mut effects = Effects::default();
        effects.calls(self.calls.expire(now));
        effects
    }

    fn handle_frame(&mut self, frame: Frame, effects: &mut Effects) {
        if !self.connection.is_connected() {
            tracing::debug!(state = ?self.connection.state(), "dropping frame outside session");
            return;
        }

        let id = frame.header.correlation_id();
        let status = frame.header.status();

        match frame.kind() {
            Some(FrameKind::Response) => {
                if let Some(resolution) = self.calls.resolve(id, CallKind::Request, status, frame.payload)
                {
                    effects.calls(vec![resolution]);
                }
            },
            Some(FrameKind::Ack) => {
                if let Some(resolution) = self.calls.resolve(id, CallKind::Notify, status, frame.payload)
                {
                    effects.calls(vec![resolution]);
                }
            },
            Some(kind @ (FrameKind::Request | FrameKind::Notify)) => {
                // Client-origin kinds arriving inbound are a peer bug.
                tracing::warn!(?kind, id, "dropping client-origin frame from peer");
            },
            None => {
                tracing::warn!(kind = frame.header.kind(), "dropping frame with unknown kind");
            },
        }
    }
}

impl std::fmt::Debug for ClientDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientDriver")
            .field("state", &self.connection.state())
            .field("generation", &self.generation)
            .field("handlers", &self.handlers.len())
            .field("pending_calls", &self.calls.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use crate::config::TransportKind;

    use super::*;

    fn driver(transport: TransportKind) -> ClientDriver {
        let config = ClientConfig { transport, ..ClientConfig::default() };
        ClientDriver::new(config).unwrap()
    }

    /// Drive a plain-transport driver to the connected state.
    fn connected_driver() -> (ClientDriver, u64) {
        let mut driver = driver(TransportKind::Plain);
        let effects = driver.connect("localhost", 3250).unwrap();
        let generation = match &effects.actions[0] {
            TransportAction::Open { generation, .. } => *generation,
            other => panic!("expected Open, got {other:?}"),
        };
        let effects = driver.handle_transport_event(generation, TransportEvent::StreamReady);
        run_dispatches(effects);
        (driver, generation)
    }

    fn run_dispatches(effects: Effects) {
        for dispatch in effects.dispatches {
            dispatch.run();
        }
    }

    #[test]
    fn connect_opens_transport_with_fresh_generation() {
        let mut driver = driver(TransportKind::Plain);
        let effects = driver.connect("example.com", 4000).unwrap();

        assert_eq!(driver.state(), ConnectionState::Connecting);
        assert_eq!(effects.actions.len(), 1);
        assert_eq!(
            effects.actions[0],
            TransportAction::Open { host: "example.com".to_string(), port: 4000, generation: 1 }
        );
        assert!(effects.dispatches.is_empty());
    }

    #[test]
    fn stream_ready_dispatches_connected_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut driver = driver(TransportKind::Plain);

        let log = Arc::clone(&seen);
        driver.add_handler(move |event| log.lock().unwrap().push(event.clone()));

        driver.connect("localhost", 3250).unwrap();
        let effects = driver.handle_transport_event(1, TransportEvent::StreamReady);

        assert_eq!(driver.state(), ConnectionState::Connected);
        run_dispatches(effects);
        assert_eq!(*seen.lock().unwrap(), vec![SessionEvent::Connected]);
    }

    #[test]
    fn request_while_disconnected_is_invalid_state() {
        let mut driver = driver(TransportKind::Plain);
        let result = driver.request("r", Bytes::new(), None, Instant::now(), |_, _| {});
        assert!(matches!(
            result,
            Err(ClientError::InvalidState { state: ConnectionState::Disconnected, .. })
        ));
        assert_eq!(driver.pending_calls(), 0);
    }

    #[test]
    fn request_sends_frame_and_response_resolves_it() {
        let (mut driver, generation) = connected_driver();
        let outcome = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&outcome);
        let effects = driver
            .request(
                "connector.get",
                Bytes::from_static(b"args"),
                Some(Duration::from_secs(5)),
                Instant::now(),
                move |info, result| {
                    assert_eq!(info.route, "connector.get");
                    assert_eq!(info.timeout, Duration::from_secs(5));
                    *slot.lock().unwrap() = Some(result);
                },
            )
            .unwrap();

        let frame = match &effects.actions[0] {
            TransportAction::Send(frame) => frame.clone(),
            other => panic!("expected Send, got {other:?}"),
        };
        assert_eq!(frame.kind(), Some(FrameKind::Request));
        assert_eq!(frame.route, "connector.get");
        assert_eq!(frame.header.timeout_ms(), 5000);
        let id = frame.header.correlation_id();
        assert_ne!(id, 0);

        let response = Frame::response(id, 0, Bytes::from_static(b"result"));
        let effects = driver.handle_transport_event(generation, TransportEvent::Frame(response));
        run_dispatches(effects);

        assert_eq!(*outcome.lock().unwrap(), Some(CallOutcome::Ok(Bytes::from_static(b"result"))));
        assert_eq!(driver.pending_calls(), 0);
    }

    #[test]
    fn notify_resolved_by_ack() {
        let (mut driver, generation) = connected_driver();
        let outcome = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&outcome);
        let effects = driver
            .notify("chat.send", Bytes::from_static(b"hi"), None, Instant::now(), move |info, result| {
                assert_eq!(info.kind, CallKind::Notify);
                assert_eq!(info.route, "chat.send");
                assert_eq!(info.payload, Bytes::from_static(b"hi"));
                assert_eq!(info.timeout, Duration::from_secs(10));
                *slot.lock().unwrap() = Some(result);
            })
            .unwrap();

        let id = match &effects.actions[0] {
            TransportAction::Send(frame) => {
                assert_eq!(frame.kind(), Some(FrameKind::Notify));
                frame.header.correlation_id()
            },
            other => panic!("expected Send, got {other:?}"),
        };

        let effects =
            driver.handle_transport_event(generation, TransportEvent::Frame(Frame::ack(id, 0)));
        run_dispatches(effects);
        assert_eq!(*outcome.lock().unwrap(), Some(CallOutcome::Ok(Bytes::new())));
    }

    #[test]
    fn default_timeout_applies_when_unspecified() {
        let (mut driver, _) = connected_driver();

        let effects = driver
            .request("r", Bytes::new(), None, Instant::now(), |info, _| {
                assert_eq!(info.timeout, Duration::from_secs(10));
            })
            .unwrap();

        match &effects.actions[0] {
            TransportAction::Send(frame) => assert_eq!(frame.header.timeout_ms(), 10_000),
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn disconnect_event_precedes_failed_call_callbacks() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (mut driver, generation) = connected_driver();

        let log = Arc::clone(&order);
        driver.add_handler(move |event| {
            if matches!(event, SessionEvent::Disconnect { .. }) {
                log.lock().unwrap().push("event");
            }
        });

        let log = Arc::clone(&order);
        driver
            .request("r", Bytes::new(), None, Instant::now(), move |_, outcome| {
                assert!(matches!(outcome, CallOutcome::Failed(_)));
                log.lock().unwrap().push("call");
            })
            .unwrap();

        let effects =
            driver.handle_transport_event(generation, TransportEvent::Closed);
        run_dispatches(effects);

        assert_eq!(*order.lock().unwrap(), vec!["event", "call"]);
        assert_eq!(driver.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn handshake_failure_reports_fixed_reason_then_rejects_disconnect() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut driver = driver(TransportKind::Tls);

        let log = Arc::clone(&seen);
        driver.add_handler(move |event| log.lock().unwrap().push(event.clone()));

        driver.connect("localhost", 3251).unwrap();
        driver.handle_transport_event(1, TransportEvent::StreamReady);
        assert_eq!(driver.state(), ConnectionState::Handshaking);

        let effects = driver.handle_transport_event(
            1,
            TransportEvent::HandshakeFailed { reason: "TLS Handshake Error".to_string() },
        );
        assert!(effects.actions.contains(&TransportAction::Close { generation: 1 }));
        run_dispatches(effects);

        assert_eq!(
            *seen.lock().unwrap(),
            vec![SessionEvent::ConnectFailed { reason: "TLS Handshake Error".to_string() }]
        );

        // The failure already tore the session down.
        assert!(matches!(
            driver.disconnect(),
            Err(ClientError::InvalidState { state: ConnectionState::Disconnected, .. })
        ));
    }

    #[test]
    fn tick_expires_overdue_calls() {
        let (mut driver, _) = connected_driver();
        let outcome = Arc::new(Mutex::new(None));
        let now = Instant::now();

        let slot = Arc::clone(&outcome);
        driver
            .request("slow", Bytes::new(), Some(Duration::from_millis(20)), now, move |_, result| {
                *slot.lock().unwrap() = Some(result);
            })
            .unwrap();

        assert!(driver.tick(now + Duration::from_millis(19)).dispatches.is_empty());

        let effects = driver.tick(now + Duration::from_millis(20));
        assert_eq!(effects.dispatches.len(), 1);
        run_dispatches(effects);

        assert_eq!(*outcome.lock().unwrap(), Some(CallOutcome::Timeout));
        assert_eq!(driver.pending_calls(), 0);
    }

    #[test]
    fn stale_generation_events_are_dropped() {
        let (mut driver, generation) = connected_driver();

        // A task from a previous attempt reports an error after the
        // driver has already moved on.
        let effects = driver
            .handle_transport_event(generation - 1, TransportEvent::Error { reason: "stale".to_string() });

        assert!(effects.is_empty());
        assert_eq!(driver.state(), ConnectionState::Connected);
    }

    #[test]
    fn reconnect_after_failure_uses_new_generation() {
        let mut driver = driver(TransportKind::Plain);

        driver.connect("localhost", 1).unwrap();
        let effects = driver
            .handle_transport_event(1, TransportEvent::Error { reason: "connection refused".to_string() });
        run_dispatches(effects);
        assert_eq!(driver.state(), ConnectionState::Disconnected);

        let effects = driver.connect("localhost", 2).unwrap();
        assert!(matches!(effects.actions[0], TransportAction::Open { generation: 2, .. }));
    }

    #[test]
    fn inbound_client_origin_frames_are_dropped() {
        let (mut driver, generation) = connected_driver();

        let rogue = Frame::request(99, "srv.push", Bytes::new(), 0);
        let effects = driver.handle_transport_event(generation, TransportEvent::Frame(rogue));
        assert!(effects.is_empty());
    }

    #[test]
    fn oversized_route_rejected_before_issuing() {
        let (mut driver, _) = connected_driver();
        let route = "r".repeat(FrameHeader::MAX_ROUTE_LEN as usize + 1);

        let result = driver.request(&route, Bytes::new(), None, Instant::now(), |_, _| {});
        assert!(matches!(result, Err(ClientError::Protocol(_))));
        assert_eq!(driver.pending_calls(), 0);
    }

    #[test]
    fn shutdown_fails_pending_calls_after_final_event() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let (mut driver, _) = connected_driver();

        let log = Arc::clone(&order);
        driver.add_handler(move |event| {
            if matches!(event, SessionEvent::Disconnect { .. }) {
                log.lock().unwrap().push("event");
            }
        });

        let log = Arc::clone(&order);
        driver
            .request("r", Bytes::new(), None, Instant::now(), move |_, outcome| {
                assert_eq!(outcome, CallOutcome::Failed("client shut down".to_string()));
                log.lock().unwrap().push("call");
            })
            .unwrap();

        let effects = driver.shutdown();
        run_dispatches(effects);

        // Same contract as any other teardown: the lifecycle event
        // first, then the owed call resolutions, none abandoned.
        assert_eq!(*order.lock().unwrap(), vec!["event", "call"]);
        assert_eq!(driver.state(), ConnectionState::Disconnected);
        assert_eq!(driver.pending_calls(), 0);
    }

    #[test]
    fn shutdown_while_disconnected_is_a_noop_for_callbacks() {
        let mut driver = driver(TransportKind::Plain);
        let seen = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&seen);
        driver.add_handler(move |event| log.lock().unwrap().push(event.clone()));

        let effects = driver.shutdown();
        run_dispatches(effects);

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(driver.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn close_action_carries_attempt_generation() {
        let (mut driver, generation) = connected_driver();

        let effects = driver.disconnect().unwrap();
        assert_eq!(effects.actions[0], TransportAction::Close { generation });

        let effects = driver.handle_transport_event(generation, TransportEvent::Closed);
        assert!(effects.actions.contains(&TransportAction::Close { generation }));
        run_dispatches(effects);

        // The next attempt's transport is tagged differently, so the
        // runtime can tell a stale close from one aimed at it.
        let effects = driver.connect("localhost", 2).unwrap();
        assert!(matches!(
            effects.actions[0],
            TransportAction::Open { generation: next, .. } if next != generation
        ));
    }

    #[test]
    fn rejected_response_status_maps_to_rejected_outcome() {
        let (mut driver, generation) = connected_driver();
        let outcome = Arc::new(Mutex::new(None));

        let slot = Arc::clone(&outcome);
        let effects = driver
            .request("r", Bytes::new(), None, Instant::now(), move |_, result| {
                *slot.lock().unwrap() = Some(result);
            })
            .unwrap();
        let id = match &effects.actions[0] {
            TransportAction::Send(frame) => frame.header.correlation_id(),
            other => panic!("expected Send, got {other:?}"),
        };

        let response = Frame::response(id, 404, Bytes::from_static(b"no such route"));
        let effects = driver.handle_transport_event(generation, TransportEvent::Frame(response));
        run_dispatches(effects);

        assert_eq!(
            *outcome.lock().unwrap(),
            Some(CallOutcome::Rejected { code: 404, payload: Bytes::from_static(b"no such route") })
        );
    }
}
