//! In-flight request registry.
//!
//! Tracks every outstanding request by correlation id and routes each
//! incoming resolution to the caller that registered it. For any id the
//! success path and the failure path are mutually exclusive and fire at most
//! once: the pending entry is removed from the table before its sender is
//! invoked, and the sender is consumed by the send. Late or duplicate
//! resolutions find no entry and are dropped silently.
//!
//! Registration arms a deadline timer; expiry drives the same
//! single-resolution path as an explicit rejection, classified as
//! [`ErrorCode::Timeout`](crate::classify::ErrorCode::Timeout).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::classify::{classify, ErrorCode, ErrorDetail};
use crate::timeout::OperationClass;
use crate::{Result, UplinkError};

/// Outcome delivered to the caller awaiting a registered request.
pub type CallOutcome = std::result::Result<Value, ErrorDetail>;

/// Registry record for one outstanding request.
#[derive(Debug)]
struct PendingEntry {
    /// Resolution channel; consumed by exactly one send.
    tx: oneshot::Sender<CallOutcome>,
    /// Deadline timer task; aborted when the entry resolves first.
    timer: JoinHandle<()>,
    /// Absolute deadline, for diagnostics.
    deadline: Instant,
}

/// Thread-safe table of in-flight requests keyed by correlation id.
///
/// Cheap to clone; all clones share one pending table. The read loop is the
/// sole producer of resolutions, callers are concurrent registrants, and the
/// supervisor bulk-rejects on disconnect so no caller waits forever on a dead
/// channel.
#[derive(Debug, Clone, Default)]
pub struct RequestRegistry {
    pending: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl RequestRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request and arm its deadline timer.
    ///
    /// Returns the receiver the caller awaits. When `timeout` elapses before
    /// the request is resolved or rejected, the entry is removed and the
    /// caller receives a classified `Timeout` failure.
    ///
    /// # Errors
    ///
    /// Returns `UplinkError::Protocol` if `id` is already in flight; ids must
    /// be unique for the lifetime of the pending entry.
    pub async fn register(
        &self,
        id: &str,
        class: OperationClass,
        attempt: u32,
        timeout: Duration,
    ) -> Result<oneshot::Receiver<CallOutcome>> {
        let (tx, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;

        let mut pending = self.pending.lock().await;
        if pending.contains_key(id) {
            return Err(UplinkError::Protocol(format!(
                "correlation id {id} is already in flight"
            )));
        }

        let timer = tokio::spawn({
            let registry = self.clone();
            let id = id.to_owned();
            async move {
                tokio::time::sleep_until(deadline).await;
                let detail = classify(
                    ErrorCode::Timeout,
                    &format!("request {id} ({class:?}, attempt {attempt}) exceeded {timeout:?}"),
                );
                if registry.reject(&id, detail).await {
                    debug!(id = id.as_str(), attempt, "registry: deadline elapsed");
                }
            }
        });

        pending.insert(
            id.to_owned(),
            PendingEntry {
                tx,
                timer,
                deadline,
            },
        );

        Ok(rx)
    }

    /// Resolve a pending request with a successful result.
    ///
    /// Returns `true` if an entry was pending. A late or duplicate response
    /// finds no entry, is dropped silently, and yields `false`.
    pub async fn resolve(&self, id: &str, result: Value) -> bool {
        let Some(entry) = self.pending.lock().await.remove(id) else {
            debug!(id, "registry: dropping resolution for unknown id");
            return false;
        };

        entry.timer.abort();
        if entry.tx.send(Ok(result)).is_err() {
            warn!(id, "registry: receiver already dropped");
        }
        true
    }

    /// Reject a pending request with a classified failure.
    ///
    /// Same single-resolution path as [`resolve`](Self::resolve): the entry is
    /// removed before the sender fires, and rejecting an unknown id is a
    /// no-op returning `false`.
    pub async fn reject(&self, id: &str, detail: ErrorDetail) -> bool {
        let Some(entry) = self.pending.lock().await.remove(id) else {
            return false;
        };

        entry.timer.abort();
        if entry.tx.send(Err(detail)).is_err() {
            warn!(id, "registry: receiver already dropped");
        }
        true
    }

    /// Atomically drain every pending entry, failing each with `detail`.
    ///
    /// Used on disconnect: afterwards the table is empty and every previously
    /// pending caller has received a rejection. Returns the number of entries
    /// drained.
    pub async fn reject_all(&self, detail: &ErrorDetail) -> usize {
        let drained: Vec<(String, PendingEntry)> =
            self.pending.lock().await.drain().collect();
        let count = drained.len();

        for (id, entry) in drained {
            entry.timer.abort();
            if entry.tx.send(Err(detail.clone())).is_err() {
                debug!(id = id.as_str(), "registry: receiver already dropped");
            }
        }

        if count > 0 {
            debug!(count, code = ?detail.code, "registry: rejected all pending requests");
        }
        count
    }

    /// Number of requests currently in flight.
    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Whether no requests are in flight.
    pub async fn is_empty(&self) -> bool {
        self.pending.lock().await.is_empty()
    }

    /// Absolute deadline of a pending request, if still in flight.
    pub async fn deadline(&self, id: &str) -> Option<Instant> {
        self.pending.lock().await.get(id).map(|e| e.deadline)
    }
}
