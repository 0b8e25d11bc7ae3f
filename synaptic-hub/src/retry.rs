//! Bounded re-attempts for forwarded engine commands.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::connection::{ConnectionManager, Role};
use crate::correlator::RequestCorrelator;
use crate::error::{HubError, HubResult};

/// How hard to try before giving up on the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included
    pub max_attempts: u32,
    pub per_attempt_timeout: Duration,
    /// Fixed pause after a transient failure
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(30),
            retry_delay: Duration::from_secs(1),
        }
    }
}

/// Engine result plus how many attempts it took
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub content: Value,
    pub attempts: u32,
}

impl CallOutcome {
    pub fn retried(&self) -> bool {
        self.attempts > 1
    }
}

pub struct RetryExecutor {
    connections: Arc<ConnectionManager>,
    correlator: Arc<RequestCorrelator>,
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(
        connections: Arc<ConnectionManager>,
        correlator: Arc<RequestCorrelator>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            connections,
            correlator,
            policy,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn call(&self, command: &str, parameters: &Value) -> HubResult<CallOutcome> {
        self.call_with(command, parameters, self.policy).await
    }

    /// Run `command` until it succeeds, fails on the engine side, or the
    /// attempts run out. Every attempt gets a fresh correlation id.
    pub async fn call_with(
        &self,
        command: &str,
        parameters: &Value,
        policy: RetryPolicy,
    ) -> HubResult<CallOutcome> {
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = HubError::NotConnected;

        for attempt in 1..=max_attempts {
            let result = if self.connections.is_connected(Role::Engine) {
                self.correlator
                    .dispatch(
                        &self.connections,
                        command,
                        parameters,
                        policy.per_attempt_timeout,
                    )
                    .await
            } else {
                Err(HubError::NotConnected)
            };

            match result {
                Ok(content) => {
                    if attempt > 1 {
                        info!("[Hub] {} succeeded on attempt {}", command, attempt);
                    }
                    return Ok(CallOutcome {
                        content,
                        attempts: attempt,
                    });
                }
                Err(e) if e.is_transient() => {
                    warn!(
                        "[Hub] {} attempt {}/{} failed: {}",
                        command, attempt, max_attempts, e
                    );
                    last_error = e;
                    if attempt < max_attempts {
                        tokio::time::sleep(policy.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(HubError::RetriesExhausted {
            attempts: max_attempts,
            last: Box::new(last_error),
        })
    }
}
