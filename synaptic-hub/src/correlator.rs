//! Request correlation between forwarded commands and engine results.
//!
//! Ids start at 1 and only grow, so a late result for an expired request can
//! never be mistaken for a newer one. Each pending entry is removed exactly
//! once: by its result, by its deadline, or by the caller going away.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::connection::{ConnectionManager, Role};
use crate::error::{HubError, HubResult};
use crate::protocol::{InvokeFrame, OperationResult};

struct PendingRequest {
    operation: String,
    issued_at: Instant,
    deadline: Instant,
    completion: oneshot::Sender<HubResult<Value>>,
}

/// Snapshot of one in-flight request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingInfo {
    pub id: u64,
    pub operation: String,
    pub age: Duration,
    pub remaining: Duration,
}

#[derive(Default)]
pub struct RequestCorrelator {
    last_id: AtomicU64,
    pending: Mutex<HashMap<u64, PendingRequest>>,
}

/// Removes the entry when a dispatch future ends early or is dropped.
struct PendingGuard<'a> {
    correlator: &'a RequestCorrelator,
    id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.correlator.take(self.id);
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> u64 {
        self.last_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn take(&self, id: u64) -> Option<PendingRequest> {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    /// Highest id handed out so far (0 before the first dispatch)
    pub fn last_issued_id(&self) -> u64 {
        self.last_id.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn pending(&self) -> Vec<PendingInfo> {
        let now = Instant::now();
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut infos: Vec<PendingInfo> = pending
            .iter()
            .map(|(id, entry)| PendingInfo {
                id: *id,
                operation: entry.operation.clone(),
                age: now.saturating_duration_since(entry.issued_at),
                remaining: entry.deadline.saturating_duration_since(now),
            })
            .collect();
        infos.sort_by_key(|i| i.id);
        infos
    }

    /// Send one command to the engine and wait for its result or deadline.
    ///
    /// The engine slot is read at send time, so a reconnect that happened
    /// since the caller started is picked up.
    pub async fn dispatch(
        &self,
        connections: &ConnectionManager,
        command: &str,
        parameters: &Value,
        timeout: Duration,
    ) -> HubResult<Value> {
        let id = self.next_id();
        let (tx, mut rx) = oneshot::channel();
        let issued_at = Instant::now();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                PendingRequest {
                    operation: command.to_string(),
                    issued_at,
                    deadline: issued_at + timeout,
                    completion: tx,
                },
            );
        let _guard = PendingGuard {
            correlator: self,
            id,
        };

        let frame = serde_json::to_string(&InvokeFrame::new(id, command, parameters))?;
        connections.send(Role::Engine, frame)?;
        debug!("[Correlator] Sent {} (id: {})", command, id);

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::Protocol(format!(
                "completion for {} (id: {}) was dropped",
                command, id
            ))),
            Err(_) => {
                if self.take(id).is_some() {
                    warn!("[Correlator] {} timed out (id: {})", command, id);
                    return Err(HubError::Timeout {
                        operation: command.to_string(),
                        id,
                    });
                }
                // a resolver already owns the entry and is about to complete it
                rx.await.unwrap_or_else(|_| {
                    Err(HubError::Timeout {
                        operation: command.to_string(),
                        id,
                    })
                })
            }
        }
    }

    /// Complete the pending request matching `result.id`.
    ///
    /// Returns `false` for unknown, expired or already-resolved ids; those
    /// results are dropped without side effects.
    pub fn resolve(&self, result: OperationResult) -> bool {
        let Some(entry) = self.take(result.id) else {
            debug!("[Correlator] Dropping result for unknown id {}", result.id);
            return false;
        };
        let outcome = if result.success {
            Ok(result.content)
        } else {
            Err(HubError::Application(result.error_detail()))
        };
        debug!(
            "[Correlator] Resolved {} (id: {}) after {:?}",
            entry.operation,
            result.id,
            entry.issued_at.elapsed()
        );
        // a closed receiver means the caller already gave up
        let _ = entry.completion.send(outcome);
        true
    }
}
