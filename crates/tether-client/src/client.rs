//! Runtime client handle.
//!
//! [`Client`] wraps the pure [`ClientDriver`] in a Tokio runtime: a
//! mutex guards the driver, an executor task feeds it transport events,
//! and a ticker task drives call timeouts. Every driver interaction
//! follows the same shape: lock, commit the transition, unlock, then
//! apply the returned [`Effects`]. Callbacks therefore always run
//! without the driver lock held and may call back into the client.

use std::{
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use bytes::Bytes;
use tether_core::{
    CallInfo, CallOutcome, ClientConfig, ClientDriver, ClientError, ConnectionState, Effects,
    HandlerId, SessionEvent, TransportAction,
};
use tokio::sync::mpsc;

use crate::{
    transport::{self, DialPlan, TaggedEvent, TransportHandle},
    trust::TrustStore,
};

struct Shared {
    driver: Mutex<ClientDriver>,
    trust: TrustStore,
    config: ClientConfig,
    io: Mutex<Option<TransportHandle>>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    terminated: AtomicBool,
}

impl Shared {
    fn driver(&self) -> MutexGuard<'_, ClientDriver> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn io(&self) -> MutexGuard<'_, Option<TransportHandle>> {
        self.io.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Connected-client handle.
///
/// Created with [`Client::init`] inside a Tokio runtime; all methods
/// must be called from runtime context. The handle owns two background
/// tasks (event executor and timeout ticker) which are stopped by
/// [`Client::shutdown`] or by dropping the handle.
pub struct Client {
    shared: Arc<Shared>,
    executor: tokio::task::JoinHandle<()>,
    ticker: tokio::task::JoinHandle<()>,
}

impl Client {
    /// Create a client and start its background tasks.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` if the configuration is invalid.
    pub fn init(config: ClientConfig) -> Result<Self, ClientError> {
        let driver = ClientDriver::new(config.clone())?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            driver: Mutex::new(driver),
            trust: TrustStore::new(),
            config,
            io: Mutex::new(None),
            events_tx,
            terminated: AtomicBool::new(false),
        });

        let executor = tokio::spawn(run_executor(Arc::clone(&shared), events_rx));
        let ticker = tokio::spawn(run_ticker(Arc::clone(&shared)));

        Ok(Self { shared, executor, ticker })
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.driver().state()
    }

    /// Load TLS trust anchors from a PEM file, replacing any previous
    /// set. Only affects connection attempts started afterwards.
    ///
    /// # Errors
    ///
    /// `ClientError::Config` if the file cannot be read or contains no
    /// usable certificates; the previous anchors stay in effect.
    pub fn set_ca_file(&self, path: impl AsRef<Path>) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.shared.trust.set_ca_file(path)
    }

    /// Register a lifecycle event handler. Handlers run in registration
    /// order, outside the client's internal locks.
    ///
    /// # Errors
    ///
    /// `ClientError::Terminated` after shutdown.
    pub fn add_event_handler(
        &self,
        callback: impl Fn(&SessionEvent) + Send + Sync + 'static,
    ) -> Result<HandlerId, ClientError> {
        self.ensure_live()?;
        Ok(self.shared.driver().add_handler(callback))
    }

    /// Remove a lifecycle event handler. A handler removed while a
    /// dispatch is in flight is guaranteed not to run.
    ///
    /// # Errors
    ///
    /// `ClientError::HandlerNotFound` if the id is unknown.
    pub fn remove_event_handler(&self, id: HandlerId) -> Result<(), ClientError> {
        self.ensure_live()?;
        self.shared.driver().remove_handler(id)
    }

    /// Start a connection attempt to `host:port`.
    ///
    /// Returns once the attempt is underway; the outcome arrives as a
    /// `Connected` or `ConnectFailed` lifecycle event.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidState` unless currently disconnected.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), ClientError> {
        self.ensure_live()?;
        let effects = self.shared.driver().connect(host, port)?;
        apply_effects(&self.shared, effects);
        Ok(())
    }

    /// Start a graceful disconnect. Completion arrives as a
    /// `Disconnect` lifecycle event.
    ///
    /// # Errors
    ///
    /// `ClientError::InvalidState` unless currently connected.
    pub fn disconnect(&self) -> Result<(), ClientError> {
        self.ensure_live()?;
        let effects = self.shared.driver().disconnect()?;
        apply_effects(&self.shared, effects);
        Ok(())
    }

    /// Send a request. The callback fires exactly once with the
    /// response, a timeout, or a failure; `timeout` of `None` uses the
    /// configured default.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` unless currently connected
    /// - `ClientError::Protocol` if route or payload exceed frame limits
    pub fn request(
        &self,
        route: &str,
        payload: impl Into<Bytes>,
        timeout: Option<Duration>,
        callback: impl FnOnce(&CallInfo, CallOutcome) + Send + 'static,
    ) -> Result<(), ClientError> {
        self.ensure_live()?;
        let effects =
            self.shared.driver().request(route, payload.into(), timeout, Instant::now(), callback)?;
        apply_effects(&self.shared, effects);
        Ok(())
    }

    /// Send a fire-and-forget notify. The callback reports delivery:
    /// the peer's acknowledgment, a timeout, or a failure.
    ///
    /// # Errors
    ///
    /// Same as [`Client::request`].
    pub fn notify(
        &self,
        route: &str,
        payload: impl Into<Bytes>,
        timeout: Option<Duration>,
        callback: impl FnOnce(&CallInfo, CallOutcome) + Send + 'static,
    ) -> Result<(), ClientError> {
        self.ensure_live()?;
        let effects =
            self.shared.driver().notify(route, payload.into(), timeout, Instant::now(), callback)?;
        apply_effects(&self.shared, effects);
        Ok(())
    }

    /// Stop the background tasks and sever any live connection.
    ///
    /// The final lifecycle event is dispatched and every outstanding
    /// call fails with [`CallOutcome::Failed`], so no callback is left
    /// unresolved. Afterwards the API rejects calls with `Terminated`.
    /// Idempotent; also runs on drop.
    pub fn shutdown(&self) {
        if self.shared.terminated.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::info!("client shutting down");
        self.executor.abort();
        self.ticker.abort();
        if let Some(handle) = self.shared.io().take() {
            handle.abort();
        }
        let effects = self.shared.driver().shutdown();
        apply_effects(&self.shared, effects);
    }

    fn ensure_live(&self) -> Result<(), ClientError> {
        if self.shared.terminated.load(Ordering::Acquire) {
            return Err(ClientError::Terminated);
        }
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").field("state", &self.state()).finish()
    }
}

/// Apply driver output: transport actions first, then callbacks.
///
/// Must be called with no internal locks held.
fn apply_effects(shared: &Arc<Shared>, effects: Effects) {
    let Effects { actions, dispatches } = effects;

    for action in actions {
        match action {
            TransportAction::Open { host, port, generation } => {
                let plan = DialPlan {
                    host,
                    port,
                    generation,
                    kind: shared.config.transport,
                    server_name: shared.config.server_name.clone(),
                    connect_timeout: shared.config.connect_timeout,
                    anchors: shared.trust.snapshot(),
                };
                let handle = transport::spawn(plan, shared.events_tx.clone());
                *shared.io() = Some(handle);
            },
            TransportAction::Send(frame) => {
                if let Some(handle) = shared.io().as_ref() {
                    handle.send(frame);
                } else {
                    tracing::warn!("send action with no live transport");
                }
            },
            TransportAction::Close { generation } => {
                // A newer attempt may already occupy the slot; only the
                // matching handle is dropped (starting its graceful close).
                let mut io = shared.io();
                if io.as_ref().is_some_and(|handle| handle.generation() == generation) {
                    drop(io.take());
                }
            },
        }
    }

    for dispatch in dispatches {
        dispatch.run();
    }
}

async fn run_executor(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<TaggedEvent>) {
    while let Some(tagged) = events.recv().await {
        let effects = shared.driver().handle_transport_event(tagged.generation, tagged.event);
        apply_effects(&shared, effects);
    }
}

async fn run_ticker(shared: Arc<Shared>) {
    let mut interval = tokio::time::interval(shared.config.tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        let effects = shared.driver().tick(Instant::now());
        if !effects.is_empty() {
            apply_effects(&shared, effects);
        }
    }
}
