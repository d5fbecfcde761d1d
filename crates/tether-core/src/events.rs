//! Lifecycle events and the observer dispatch table.
//!
//! Handlers are registered with a monotonically increasing id and
//! invoked in registration order. Dispatch operates on a snapshot taken
//! when the causing transition commits: a handler added during an
//! in-progress dispatch is not visited, and one removed mid-dispatch is
//! skipped via a per-entry liveness flag.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

/// Connection lifecycle event delivered to registered handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection is established (handshake included, for TLS)
    Connected,
    /// The connection ended. `reason` is present for abnormal ends and
    /// absent for a clean close; local disconnects and peer-initiated
    /// closes deliver the same event kind.
    Disconnect {
        /// Error reason, absent for a clean close
        reason: Option<String>,
    },
    /// A connection attempt failed before becoming established
    ConnectFailed {
        /// Human-readable failure reason, e.g. "TLS Handshake Error"
        reason: String,
    },
}

/// Opaque handle identifying a registered event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

type EventCallback = Box<dyn Fn(&SessionEvent) + Send + Sync>;

struct HandlerEntry {
    id: HandlerId,
    alive: AtomicBool,
    callback: EventCallback,
}

/// Registry of lifecycle observers.
///
/// Entries keep registration order. Removal is a non-fatal lookup:
/// removing an unknown id returns `false`.
pub struct EventHandlers {
    entries: Vec<Arc<HandlerEntry>>,
    next_id: u64,
}

impl Default for EventHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandlers {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new(), next_id: 1 }
    }

    /// Register a handler. Ids are unique for the registry's lifetime.
    pub fn add(&mut self, callback: impl Fn(&SessionEvent) + Send + Sync + 'static) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        self.entries.push(Arc::new(HandlerEntry {
            id,
            alive: AtomicBool::new(true),
            callback: Box::new(callback),
        }));

        id
    }

    /// Remove a handler by id. Returns `false` if no such handler.
    pub fn remove(&mut self, id: HandlerId) -> bool {
        let Some(index) = self.entries.iter().position(|e| e.id == id) else {
            return false;
        };

        // Mark dead first so an in-flight dispatch snapshot skips it.
        let entry = self.entries.remove(index);
        entry.alive.store(false, Ordering::Release);
        true
    }

    /// Number of live handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Capture the live set for delivering `event`.
    ///
    /// The transition that caused the event must already be committed;
    /// handlers observing client state see the post-transition state.
    #[must_use]
    pub fn dispatch(&self, event: SessionEvent) -> EventDispatch {
        EventDispatch { event, handlers: self.entries.clone() }
    }
}

/// One event paired with the handler snapshot taken at dispatch start.
///
/// Running the dispatch happens outside the core's locks, so handlers
/// are free to call back into the client.
pub struct EventDispatch {
    /// The event being delivered
    pub event: SessionEvent,
    handlers: Vec<Arc<HandlerEntry>>,
}

impl EventDispatch {
    /// Invoke every snapshot handler that is still live, in
    /// registration order.
    pub fn run(self) {
        for entry in &self.handlers {
            if entry.alive.load(Ordering::Acquire) {
                (entry.callback)(&self.event);
            }
        }
    }

    /// Number of handlers in the snapshot (live or not).
    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl std::fmt::Debug for EventDispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatch")
            .field("event", &self.event)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
