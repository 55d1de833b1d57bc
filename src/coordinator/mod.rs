//! Phase coordinators
//!
//! Each coordinator fans one call out per node, waits for every call to
//! settle (success, failure or timeout) and reduces the outcomes to a verdict.
//! A failing node never aborts the calls to the other nodes.

pub mod restart;
pub mod sync;

pub use restart::{RestartCoordinator, RestartVerdict};
pub use sync::{SyncCoordinator, SyncVerdict};

use crate::cluster::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;

/// Why a node failed a phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The node answered but has not applied the latest configuration
    NotSynced,
    /// The call returned an error
    CallFailed(String),
    /// No answer within the phase budget
    TimedOut { after_ms: u64 },
    /// The call task died before producing an answer
    Aborted,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotSynced => write!(f, "configuration not synchronized"),
            FailureReason::CallFailed(msg) => write!(f, "{}", msg),
            FailureReason::TimedOut { after_ms } => write!(f, "timed out after {} ms", after_ms),
            FailureReason::Aborted => write!(f, "node call aborted"),
        }
    }
}

/// A single node's failure within one phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeFailure {
    pub node: NodeId,
    pub reason: FailureReason,
}

pub(crate) type NodeOutcome = Result<(), FailureReason>;

/// Run `call` once per distinct node, each in its own task with its own
/// timeout, and wait for all of them.
///
/// `on_dispatch` runs right before a node's task is spawned, `on_settled` as
/// soon as that node's outcome is known. Returns the failures in `nodes`
/// order. Dropping the returned future aborts every outstanding call.
pub(crate) async fn settle_all<F, Fut, D, S>(
    nodes: &[NodeId],
    budget: Duration,
    call: F,
    mut on_dispatch: D,
    mut on_settled: S,
) -> Vec<NodeFailure>
where
    F: Fn(NodeId) -> Fut,
    Fut: Future<Output = NodeOutcome> + Send + 'static,
    D: FnMut(&NodeId),
    S: FnMut(&NodeId, &NodeOutcome),
{
    let mut seen = HashSet::new();
    let targets: Vec<NodeId> = nodes
        .iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect();

    let mut join_set = JoinSet::new();
    for node in &targets {
        on_dispatch(node);
        let fut = call(node.clone());
        let node = node.clone();
        join_set.spawn(async move {
            let outcome = match tokio::time::timeout(budget, fut).await {
                Ok(outcome) => outcome,
                Err(_) => Err(FailureReason::TimedOut {
                    after_ms: budget.as_millis() as u64,
                }),
            };
            (node, outcome)
        });
    }

    let mut failures = Vec::new();
    let mut settled = HashSet::new();
    while let Some(joined) = join_set.join_next().await {
        // A panicked task carries no node id; it is caught by the sweep below
        let Ok((node, outcome)) = joined else {
            continue;
        };
        on_settled(&node, &outcome);
        if let Err(reason) = outcome {
            failures.push(NodeFailure {
                node: node.clone(),
                reason,
            });
        }
        settled.insert(node);
    }

    for node in targets.iter().filter(|id| !settled.contains(*id)) {
        let outcome = Err(FailureReason::Aborted);
        on_settled(node, &outcome);
        failures.push(NodeFailure {
            node: node.clone(),
            reason: FailureReason::Aborted,
        });
    }

    failures.sort_by_key(|f| targets.iter().position(|id| id == &f.node));
    failures
}
