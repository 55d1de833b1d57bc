//! Restart phase: restart every targeted node and collect the outcomes

use crate::cluster::{NodeApi, NodeId, NodeStatusTracker, NodeStatusUpdate, RestartStatus};
use crate::coordinator::{settle_all, FailureReason, NodeFailure};
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use slog::{debug, info, o, warn, Logger};
use std::sync::Arc;
use std::time::Duration;

/// Aggregate outcome of the restart phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RestartVerdict {
    /// Every targeted node restarted
    Restarted,
    /// At least one targeted node failed to restart
    Failed { failures: Vec<NodeFailure> },
}

impl RestartVerdict {
    pub fn is_restarted(&self) -> bool {
        matches!(self, RestartVerdict::Restarted)
    }

    pub fn failures(&self) -> &[NodeFailure] {
        match self {
            RestartVerdict::Restarted => &[],
            RestartVerdict::Failed { failures } => failures,
        }
    }
}

/// Drives the restart across the targeted nodes
pub struct RestartCoordinator {
    api: Arc<dyn NodeApi>,
    timeout: Duration,
    logger: Logger,
}

impl RestartCoordinator {
    pub fn new(api: Arc<dyn NodeApi>, timeout: Duration, logger: Logger) -> Self {
        Self {
            api,
            timeout,
            logger,
        }
    }

    /// Restart every node in `nodes`.
    ///
    /// A node is marked in progress when its request is dispatched and
    /// restarted or failed once it settles. Nodes of the snapshot that are not
    /// in `nodes` are left untouched and don't count toward the verdict.
    pub async fn run(&self, tracker: &NodeStatusTracker, nodes: &[NodeId]) -> Result<RestartVerdict> {
        if nodes.is_empty() {
            return Err(OrchestratorError::EmptyNodeSet { phase: "restart" });
        }

        let run = tracker.run();
        let logger = self.logger.new(o!(
            "run_id" => run.id.to_string(),
            "generation" => run.generation
        ));

        info!(logger, "Restarting nodes"; "nodes" => nodes.len());

        let api = self.api.clone();
        let failures = settle_all(
            nodes,
            self.timeout,
            move |node| {
                let api = api.clone();
                async move {
                    api.restart(&node)
                        .await
                        .map_err(|e| FailureReason::CallFailed(e.to_string()))
                }
            },
            |node| {
                tracker.merge(
                    NodeStatusUpdate::new(node.clone(), run.generation)
                        .restart(RestartStatus::InProgress),
                );
            },
            |node, outcome| {
                let update = NodeStatusUpdate::new(node.clone(), run.generation);
                let update = match outcome {
                    Ok(()) => update.restart(RestartStatus::Restarted),
                    Err(reason) => {
                        warn!(logger, "Node failed to restart"; "node" => %node, "reason" => %reason);
                        update.restart(RestartStatus::Failed).detail(reason.to_string())
                    }
                };
                let merged = tracker.merge(update);
                debug!(logger, "Restart status merged"; "node" => %node, "outcome" => ?merged);
            },
        )
        .await;

        if failures.is_empty() {
            info!(logger, "All nodes restarted");
            Ok(RestartVerdict::Restarted)
        } else {
            info!(logger, "Restart failed on some nodes"; "failed" => failures.len());
            Ok(RestartVerdict::Failed { failures })
        }
    }
}
