//! Sync phase: confirm every node applied the latest configuration

use crate::cluster::{NodeApi, NodeId, NodeStatusTracker, NodeStatusUpdate, SyncCheck, SyncStatus};
use crate::coordinator::{settle_all, FailureReason, NodeFailure};
use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use slog::{debug, info, o, warn, Logger};
use std::sync::Arc;
use std::time::Duration;

/// Aggregate outcome of the sync phase
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncVerdict {
    /// Every node reported synced
    Synced,
    /// At least one node failed the check, timed out or errored
    Unsynced { failures: Vec<NodeFailure> },
}

impl SyncVerdict {
    pub fn is_synced(&self) -> bool {
        matches!(self, SyncVerdict::Synced)
    }

    /// Ids of the nodes that did not sync, in membership order
    pub fn unsynced_nodes(&self) -> Vec<NodeId> {
        match self {
            SyncVerdict::Synced => Vec::new(),
            SyncVerdict::Unsynced { failures } => failures.iter().map(|f| f.node.clone()).collect(),
        }
    }
}

/// Drives the configuration-sync check across the cluster
pub struct SyncCoordinator {
    api: Arc<dyn NodeApi>,
    timeout: Duration,
    logger: Logger,
}

impl SyncCoordinator {
    /// # Arguments
    /// * `api` - Per-node operations
    /// * `timeout` - Budget for each node's check
    /// * `logger` - Logger instance
    pub fn new(api: Arc<dyn NodeApi>, timeout: Duration, logger: Logger) -> Self {
        Self {
            api,
            timeout,
            logger,
        }
    }

    /// Check every node in `nodes` and record each answer in `tracker` as it
    /// arrives.
    ///
    /// Returns only after every check settled.
    pub async fn run(&self, tracker: &NodeStatusTracker, nodes: &[NodeId]) -> Result<SyncVerdict> {
        if nodes.is_empty() {
            return Err(OrchestratorError::EmptyNodeSet { phase: "sync" });
        }

        let run = tracker.run();
        let logger = self.logger.new(o!(
            "run_id" => run.id.to_string(),
            "generation" => run.generation
        ));

        info!(logger, "Checking configuration sync"; "nodes" => nodes.len());

        let api = self.api.clone();
        let failures = settle_all(
            nodes,
            self.timeout,
            move |node| {
                let api = api.clone();
                async move {
                    match api.check_sync(&node).await {
                        Ok(SyncCheck::Synced) => Ok(()),
                        Ok(SyncCheck::NotSynced) => Err(FailureReason::NotSynced),
                        Err(e) => Err(FailureReason::CallFailed(e.to_string())),
                    }
                }
            },
            |_| {},
            |node, outcome| {
                let update = NodeStatusUpdate::new(node.clone(), run.generation);
                let update = match outcome {
                    Ok(()) => update.sync(SyncStatus::Synced),
                    Err(reason) => {
                        warn!(logger, "Node failed sync check"; "node" => %node, "reason" => %reason);
                        update.sync(SyncStatus::Failed).detail(reason.to_string())
                    }
                };
                let merged = tracker.merge(update);
                debug!(logger, "Sync status merged"; "node" => %node, "outcome" => ?merged);
            },
        )
        .await;

        if failures.is_empty() {
            info!(logger, "All nodes synchronized");
            Ok(SyncVerdict::Synced)
        } else {
            info!(logger, "Cluster not synchronized"; "unsynced" => failures.len());
            Ok(SyncVerdict::Unsynced { failures })
        }
    }
}
