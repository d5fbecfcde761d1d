//! Request/notify correlation layer.
//!
//! Every outstanding call owns a correlation id, a deadline, and a
//! callback. Resolution is first-wins and exactly-once: a matched
//! response, an expired deadline, or a connection drop removes the
//! entry, and later sources for the same id find nothing to resolve.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use bytes::Bytes;

/// Kind of an issued call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Expects a correlated response payload
    Request,
    /// Fire-and-forget; still locally acknowledged
    Notify,
}

/// Echo of a call as issued, handed to its callback on resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    /// Request or notify
    pub kind: CallKind,
    /// Destination route as issued
    pub route: String,
    /// Payload as issued
    pub payload: Bytes,
    /// Timeout as issued
    pub timeout: Duration,
}

/// Outcome of a call, delivered to its callback exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallOutcome {
    /// Server answered with success status. Response payload for
    /// requests; empty for notify acknowledgments.
    Ok(Bytes),
    /// Server answered with an application-defined failure code
    Rejected {
        /// Non-zero status code from the response/ack frame
        code: u16,
        /// Payload accompanying the rejection, possibly empty
        payload: Bytes,
    },
    /// Deadline passed before any response arrived
    Timeout,
    /// Connection dropped (or was locally closed) while pending
    Failed(String),
}

impl CallOutcome {
    /// Whether this outcome is the success variant.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

type CallCallback = Box<dyn FnOnce(&CallInfo, CallOutcome) + Send>;

struct PendingCall {
    info: CallInfo,
    deadline: Instant,
    callback: CallCallback,
}

/// A resolved call ready to have its callback run.
///
/// Produced under the core's lock; run outside it. Dropping a
/// resolution without running it would violate the exactly-once
/// contract, so the driver never constructs one it does not return.
pub struct CallResolution {
    info: CallInfo,
    outcome: CallOutcome,
    callback: CallCallback,
}

impl CallResolution {
    /// The outcome this resolution will deliver.
    #[must_use]
    pub fn outcome(&self) -> &CallOutcome {
        &self.outcome
    }

    /// Echo of the call as issued.
    #[must_use]
    pub fn info(&self) -> &CallInfo {
        &self.info
    }

    /// Invoke the callback with the echoed call info and the outcome.
    pub fn run(self) {
        (self.callback)(&self.info, self.outcome);
    }
}

impl std::fmt::Debug for CallResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallResolution")
            .field("info", &self.info)
            .field("outcome", &self.outcome)
            .finish()
    }
}

/// Table of pending calls keyed by correlation id.
pub struct CallTable {
    pending: HashMap<u32, PendingCall>,
    next_id: u32,
}

impl Default for CallTable {
    fn default() -> Self {
        Self::new()
    }
}

impl CallTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self { pending: HashMap::new(), next_id: 1 }
    }

    /// Number of pending calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Whether a correlation id is currently pending.
    #[must_use]
    pub fn contains(&self, id: u32) -> bool {
        self.pending.contains_key(&id)
    }

    /// Issue a call: assign a fresh id, arm the deadline, store the entry.
    ///
    /// Ids increase monotonically and wrap, skipping zero and any id
    /// still pending, so an id is never reused while outstanding.
    pub fn issue(
        &mut self,
        kind: CallKind,
        route: impl Into<String>,
        payload: Bytes,
        timeout: Duration,
        now: Instant,
        callback: impl FnOnce(&CallInfo, CallOutcome) + Send + 'static,
    ) -> u32 {
        let id = self.fresh_id();
        let info = CallInfo { kind, route: route.into(), payload, timeout };

        tracing::debug!(id, kind = ?kind, route = %info.route, ?timeout, "call issued");

        self.pending.insert(
            id,
            PendingCall { info, deadline: now + timeout, callback: Box::new(callback) },
        );
        id
    }

    /// Resolve a pending call from an inbound response/ack frame.
    ///
    /// `None` if the id is unknown (already resolved — late responses
    /// are ignored) or if the frame kind does not match the pending
    /// call's kind. Status zero maps to [`CallOutcome::Ok`]; non-zero
    /// to [`CallOutcome::Rejected`].
    pub fn resolve(
        &mut self,
        id: u32,
        kind: CallKind,
        status: u16,
        payload: Bytes,
    ) -> Option<CallResolution> {
        match self.pending.get(&id) {
            None => {
                tracing::debug!(id, "response for unknown call id, ignoring");
                return None;
            },
            Some(entry) if entry.info.kind != kind => {
                tracing::warn!(
                    id,
                    pending = ?entry.info.kind,
                    inbound = ?kind,
                    "frame kind does not match pending call, ignoring"
                );
                return None;
            },
            Some(_) => {},
        }

        // Removal is the commit point: the deadline can no longer fire
        // and a duplicate frame finds nothing.
        let entry = self.pending.remove(&id)?;
        let outcome = if status == 0 {
            CallOutcome::Ok(payload)
        } else {
            CallOutcome::Rejected { code: status, payload }
        };

        Some(CallResolution { info: entry.info, outcome, callback: entry.callback })
    }

    /// Collect every call whose deadline has passed.
    ///
    /// Resolution order among simultaneously expired calls is
    /// unspecified.
    pub fn expire(&mut self, now: Instant) -> Vec<CallResolution> {
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|(_, call)| call.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        expired
            .into_iter()
            .filter_map(|id| {
                tracing::debug!(id, "call timed out");
                let entry = self.pending.remove(&id)?;
                Some(CallResolution {
                    info: entry.info,
                    outcome: CallOutcome::Timeout,
                    callback: entry.callback,
                })
            })
            .collect()
    }

    /// Fail every pending call, cancelling all deadlines.
    ///
    /// Used when the connection drops while calls are outstanding.
    pub fn fail_all(&mut self, reason: &str) -> Vec<CallResolution> {
        if !self.pending.is_empty() {
            tracing::debug!(count = self.pending.len(), reason, "failing all pending calls");
        }

        self.pending
            .drain()
            .map(|(_, entry)| CallResolution {
                info: entry.info,
                outcome: CallOutcome::Failed(reason.to_owned()),
                callback: entry.callback,
            })
            .collect()
    }

    fn fresh_id(&mut self) -> u32 {
        // The pending set is tiny compared to the id space; this loop
        // terminates long before wrapping matters.
        loop {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if id != 0 && !self.pending.contains_key(&id) {
                return id;
            }
        }
    }
}
