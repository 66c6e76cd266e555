//! Tries an ordered node list with per-position retry budgets and returns
//! the first success.
//!
//! Nodes are tried strictly in sequence: position 0 exhausts its budget
//! before position 1 starts, and there is no reordering by latency. Every
//! failure kind is treated the same way ("try next"); only the message of
//! the final failed attempt reaches the caller.

use crate::policy::RetryPolicy;
use relay_common::error::RelayError;
use relay_common::metrics::{MetricsCollector, NoopMetrics};
use relay_common::types::NodeAddress;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Why a single attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    /// Non-2xx status, or a body carrying an explicit error status.
    Rejected { status: Option<u16>, message: String },
    /// Non-JSON or HTML-shaped body.
    Malformed(String),
    /// Timeout, DNS failure, refused connection and the like.
    Transport(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Rejected {
                status: Some(status),
                message,
            } => write!(f, "rejected with status {}: {}", status, message),
            AttemptError::Rejected {
                status: None,
                message,
            } => write!(f, "rejected: {}", message),
            AttemptError::Malformed(message) => write!(f, "malformed response: {}", message),
            AttemptError::Transport(message) => write!(f, "transport error: {}", message),
        }
    }
}

impl std::error::Error for AttemptError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    NodeError(String),
    TransportError(String),
    MalformedResponse(String),
}

impl From<&AttemptError> for AttemptOutcome {
    fn from(err: &AttemptError) -> Self {
        match err {
            AttemptError::Rejected { .. } => AttemptOutcome::NodeError(err.to_string()),
            AttemptError::Malformed(_) => AttemptOutcome::MalformedResponse(err.to_string()),
            AttemptError::Transport(_) => AttemptOutcome::TransportError(err.to_string()),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::NodeError(m)
            | AttemptOutcome::TransportError(m)
            | AttemptOutcome::MalformedResponse(m) => write!(f, "{}", m),
        }
    }
}

/// One failed attempt. Successful attempts end the dispatch and are not
/// recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchAttempt {
    pub node: NodeAddress,
    pub retry_index: u32,
    pub outcome: AttemptOutcome,
}

impl DispatchAttempt {
    /// Transport failures mean the node was unreachable; anything the node
    /// answered with is a rejection.
    pub fn to_error(&self) -> RelayError {
        let node = self.node.to_string();
        match &self.outcome {
            AttemptOutcome::TransportError(message) => RelayError::NodeUnreachable {
                node,
                message: message.clone(),
            },
            AttemptOutcome::NodeError(message) | AttemptOutcome::MalformedResponse(message) => {
                RelayError::NodeRejected {
                    node,
                    message: message.clone(),
                }
            }
        }
    }
}

#[derive(Debug)]
pub enum DispatchResult<T> {
    Success {
        value: T,
        source_node: NodeAddress,
    },
    Failure {
        error: String,
        attempts: Vec<DispatchAttempt>,
    },
}

impl<T> DispatchResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Success { .. })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> DispatchResult<U> {
        match self {
            DispatchResult::Success { value, source_node } => DispatchResult::Success {
                value: f(value),
                source_node,
            },
            DispatchResult::Failure { error, attempts } => {
                DispatchResult::Failure { error, attempts }
            }
        }
    }

    /// Failure becomes `AllNodesExhausted` naming the last node tried.
    pub fn into_result(self) -> relay_common::error::Result<(T, NodeAddress)> {
        match self {
            DispatchResult::Success { value, source_node } => Ok((value, source_node)),
            DispatchResult::Failure { error, attempts } => {
                let last = attempts.last();
                Err(RelayError::AllNodesExhausted {
                    last_node: last.map(|a| a.node.to_string()),
                    message: error,
                    cause: last.map(|a| Box::new(a.to_error())),
                })
            }
        }
    }
}

/// Holds no state across invocations beyond the metrics sink.
#[derive(Clone)]
pub struct Dispatcher {
    metrics: Arc<dyn MetricsCollector>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Arc::new(NoopMetrics))
    }
}

impl Dispatcher {
    pub fn new(metrics: Arc<dyn MetricsCollector>) -> Self {
        Self { metrics }
    }

    pub async fn dispatch<T, F, Fut>(
        &self,
        nodes: &[NodeAddress],
        policy: &RetryPolicy,
        mut attempt: F,
    ) -> DispatchResult<T>
    where
        F: FnMut(NodeAddress) -> Fut,
        Fut: Future<Output = Result<T, AttemptError>>,
    {
        let deadline = policy.deadline.map(|d| Instant::now() + d);
        let mut attempts: Vec<DispatchAttempt> = Vec::new();

        'nodes: for (position, node) in nodes.iter().enumerate() {
            let budget = policy.for_position(position);

            for retry_index in 0..budget.attempts {
                if retry_index > 0 {
                    let delay = budget.backoff.delay(retry_index);
                    let delay = match deadline {
                        Some(deadline) => delay.min(deadline.saturating_duration_since(Instant::now())),
                        None => delay,
                    };
                    sleep(delay).await;
                }

                let timeout = match deadline {
                    Some(deadline) => {
                        let remaining = deadline.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            warn!(node = %node, "dispatch deadline reached");
                            break 'nodes;
                        }
                        policy.attempt_timeout.min(remaining)
                    }
                    None => policy.attempt_timeout,
                };

                self.metrics.inc_counter("dispatch.attempt");
                let started = Instant::now();
                let result = match tokio::time::timeout(timeout, attempt(node.clone())).await {
                    Ok(result) => result,
                    Err(_) => Err(AttemptError::Transport(format!(
                        "timed out after {}ms",
                        timeout.as_millis()
                    ))),
                };
                self.metrics
                    .observe_gauge("dispatch.attempt_ms", started.elapsed().as_millis() as f64);

                match result {
                    Ok(value) => {
                        self.metrics.inc_counter("dispatch.success");
                        info!(node = %node, position, retry_index, "dispatch succeeded");
                        return DispatchResult::Success {
                            value,
                            source_node: node.clone(),
                        };
                    }
                    Err(err) => {
                        debug!(node = %node, position, retry_index, "attempt failed: {}", err);
                        attempts.push(DispatchAttempt {
                            node: node.clone(),
                            retry_index,
                            outcome: AttemptOutcome::from(&err),
                        });
                    }
                }
            }
        }

        self.metrics.inc_counter("dispatch.exhausted");
        let error = match attempts.last() {
            Some(last) => format!("{}: {}", last.node, last.outcome),
            None if nodes.is_empty() => "no nodes available".to_string(),
            None => "deadline reached before any attempt".to_string(),
        };
        warn!(attempts = attempts.len(), "dispatch exhausted: {}", error);
        DispatchResult::Failure { error, attempts }
    }
}
