//! Events emitted while a run progresses

use crate::cluster::NodeStatus;
use crate::orchestrator::{RestartState, RunResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events published on the orchestrator's event bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrchestratorEvent {
    /// The externally observable state changed.
    ///
    /// `run_id` is `None` once the orchestrator is back to idle.
    StateChanged {
        run_id: Option<Uuid>,
        state: RestartState,
    },

    /// A node's status changed in the current run's snapshot
    NodeUpdated {
        run_id: Uuid,
        node: NodeStatus,
    },

    /// A run reached a terminal state
    RunFinished(RunResult),
}
