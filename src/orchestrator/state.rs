//! Orchestrator state machine
//!
//! Pure transition logic: given the current phase and a trigger, return the
//! next phase and the effects the runtime has to carry out. Nothing in here
//! touches the network, spawns tasks or holds locks.

use crate::cluster::{ClusterSnapshot, NodeId, NodeStatus};
use crate::coordinator::{FailureReason, NodeFailure, RestartVerdict, SyncVerdict};
use crate::error::{OrchestratorError, Result};
use crate::run::RunTag;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Externally observable orchestrator state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestartState {
    Idle,
    Syncing,
    SyncError,
    Restarting,
    RestartedInfo,
    RestartError,
}

impl RestartState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RestartState::RestartedInfo | RestartState::RestartError)
    }

    /// Waiting on nodes or on the operator, i.e. a run exists and is not finished
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            RestartState::Syncing | RestartState::SyncError | RestartState::Restarting
        )
    }
}

impl fmt::Display for RestartState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RestartState::Idle => "idle",
            RestartState::Syncing => "syncing",
            RestartState::SyncError => "sync error",
            RestartState::Restarting => "restarting",
            RestartState::RestartedInfo => "restarted",
            RestartState::RestartError => "restart error",
        };
        f.write_str(name)
    }
}

/// Operator actions
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Start,
    ForceRestart,
    Cancel,
    Acknowledge,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Start => "start",
            Action::ForceRestart => "force restart",
            Action::Cancel => "cancel",
            Action::Acknowledge => "acknowledge",
        };
        f.write_str(name)
    }
}

/// Overall verdict of a finished run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunVerdict {
    Restarted,
    RestartError,
}

/// Terminal record of one run, handed to the presentation layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub generation: u64,
    pub verdict: RunVerdict,

    /// Nodes that failed the sync phase and why (empty unless the restart
    /// was forced). Kept apart from `nodes`, whose detail only reflects the
    /// last failed phase.
    pub sync_failures: Vec<NodeFailure>,

    pub restart_failures: Vec<NodeFailure>,

    /// Whether the operator overrode a failed sync
    pub forced: bool,

    /// Final status of every node
    pub nodes: Vec<NodeStatus>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        self.verdict == RunVerdict::Restarted
    }

    pub fn unsynced_nodes(&self) -> Vec<NodeId> {
        self.sync_failures.iter().map(|f| f.node.clone()).collect()
    }

    pub fn failed_nodes(&self) -> Vec<NodeId> {
        self.restart_failures.iter().map(|f| f.node.clone()).collect()
    }
}

/// Internal phase, carrying the data each state needs
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Syncing {
        run: RunTag,
    },
    SyncError {
        run: RunTag,
        unsynced: Vec<NodeFailure>,
    },
    Restarting {
        run: RunTag,
        unsynced: Vec<NodeFailure>,
        forced: bool,
    },
    RestartedInfo {
        result: RunResult,
    },
    RestartError {
        result: RunResult,
    },
}

impl Phase {
    pub fn state(&self) -> RestartState {
        match self {
            Phase::Idle => RestartState::Idle,
            Phase::Syncing { .. } => RestartState::Syncing,
            Phase::SyncError { .. } => RestartState::SyncError,
            Phase::Restarting { .. } => RestartState::Restarting,
            Phase::RestartedInfo { .. } => RestartState::RestartedInfo,
            Phase::RestartError { .. } => RestartState::RestartError,
        }
    }

    /// Run the phase belongs to; `None` when idle or finished
    pub fn run(&self) -> Option<RunTag> {
        match self {
            Phase::Syncing { run } | Phase::SyncError { run, .. } | Phase::Restarting { run, .. } => {
                Some(*run)
            }
            _ => None,
        }
    }

    pub fn run_id(&self) -> Option<Uuid> {
        match self {
            Phase::RestartedInfo { result } | Phase::RestartError { result } => Some(result.run_id),
            _ => self.run().map(|run| run.id),
        }
    }

    /// Unsynced node ids, only exposed while waiting for the operator
    pub fn unsynced_nodes(&self) -> Vec<NodeId> {
        match self {
            Phase::SyncError { unsynced, .. } => unsynced.iter().map(|f| f.node.clone()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn result(&self) -> Option<&RunResult> {
        match self {
            Phase::RestartedInfo { result } | Phase::RestartError { result } => Some(result),
            _ => None,
        }
    }
}

/// Inputs to the state machine: operator actions and coordinator completions
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    Start {
        run: RunTag,
    },
    SyncFinished {
        run: RunTag,
        verdict: SyncVerdict,
    },
    ForceRestart,
    Cancel,
    RestartFinished {
        run: RunTag,
        verdict: RestartVerdict,
        snapshot: ClusterSnapshot,
    },
    Acknowledge,
    /// A coordinator could not run at all; every node of the snapshot is
    /// counted as failed for the current phase
    PhaseFailed {
        run: RunTag,
        reason: String,
        snapshot: ClusterSnapshot,
    },
}

/// Work the runtime performs after entering a new phase
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Run the sync coordinator over the run's snapshot
    BeginSync { run: RunTag },
    /// Run the restart coordinator over every node of the snapshot
    BeginRestart { run: RunTag, forced: bool },
    /// Stop whatever coordinator is still running
    AbortInFlight,
    /// Drop the run's snapshot and reject further updates to it
    DiscardSnapshot,
    /// Hand the finished run to observers
    PublishResult(RunResult),
}

/// Compute the next phase for `trigger`.
///
/// Operator actions that the current phase doesn't allow fail with
/// `InvalidTransition`; completions that don't belong to the current run
/// fail with `StaleRun`. In both cases the caller keeps its phase.
pub fn transition(phase: &Phase, trigger: Trigger) -> Result<(Phase, Vec<Effect>)> {
    match (phase, trigger) {
        (Phase::Idle, Trigger::Start { run }) => {
            Ok((Phase::Syncing { run }, vec![Effect::BeginSync { run }]))
        }

        // Nothing is running, cancelling is a no-op
        (Phase::Idle, Trigger::Cancel) => Ok((Phase::Idle, Vec::new())),

        (Phase::Syncing { run }, Trigger::SyncFinished { run: finished, verdict })
            if finished.generation == run.generation =>
        {
            match verdict {
                SyncVerdict::Synced => Ok((
                    Phase::Restarting {
                        run: *run,
                        unsynced: Vec::new(),
                        forced: false,
                    },
                    vec![Effect::BeginRestart {
                        run: *run,
                        forced: false,
                    }],
                )),
                SyncVerdict::Unsynced { failures } => Ok((
                    Phase::SyncError {
                        run: *run,
                        unsynced: failures,
                    },
                    Vec::new(),
                )),
            }
        }

        (Phase::SyncError { run, unsynced }, Trigger::ForceRestart) => Ok((
            Phase::Restarting {
                run: *run,
                unsynced: unsynced.clone(),
                forced: true,
            },
            vec![Effect::BeginRestart {
                run: *run,
                forced: true,
            }],
        )),

        (Phase::Syncing { .. } | Phase::SyncError { .. } | Phase::Restarting { .. }, Trigger::Cancel) => {
            Ok((Phase::Idle, vec![Effect::AbortInFlight, Effect::DiscardSnapshot]))
        }

        (
            Phase::Restarting {
                run,
                unsynced,
                forced,
            },
            Trigger::RestartFinished {
                run: finished,
                verdict,
                snapshot,
            },
        ) if finished.generation == run.generation => {
            let result = RunResult {
                run_id: run.id,
                generation: run.generation,
                verdict: if verdict.is_restarted() {
                    RunVerdict::Restarted
                } else {
                    RunVerdict::RestartError
                },
                sync_failures: unsynced.clone(),
                restart_failures: verdict.failures().to_vec(),
                forced: *forced,
                nodes: snapshot.nodes,
            };
            let next = if result.is_success() {
                Phase::RestartedInfo {
                    result: result.clone(),
                }
            } else {
                Phase::RestartError {
                    result: result.clone(),
                }
            };
            Ok((next, vec![Effect::PublishResult(result)]))
        }

        (Phase::Syncing { run }, Trigger::PhaseFailed { run: failed, reason, snapshot })
            if failed.generation == run.generation =>
        {
            Ok((
                Phase::SyncError {
                    run: *run,
                    unsynced: fail_all(&snapshot, &reason),
                },
                Vec::new(),
            ))
        }

        (
            Phase::Restarting {
                run,
                unsynced,
                forced,
            },
            Trigger::PhaseFailed {
                run: failed,
                reason,
                snapshot,
            },
        ) if failed.generation == run.generation => {
            let result = RunResult {
                run_id: run.id,
                generation: run.generation,
                verdict: RunVerdict::RestartError,
                sync_failures: unsynced.clone(),
                restart_failures: fail_all(&snapshot, &reason),
                forced: *forced,
                nodes: snapshot.nodes,
            };
            Ok((
                Phase::RestartError {
                    result: result.clone(),
                },
                vec![Effect::PublishResult(result)],
            ))
        }

        (Phase::RestartedInfo { .. } | Phase::RestartError { .. }, Trigger::Acknowledge) => {
            Ok((Phase::Idle, vec![Effect::DiscardSnapshot]))
        }

        (_, Trigger::SyncFinished { run, .. })
        | (_, Trigger::RestartFinished { run, .. })
        | (_, Trigger::PhaseFailed { run, .. }) => Err(OrchestratorError::StaleRun {
            generation: run.generation,
        }),

        (phase, Trigger::Start { .. }) => Err(rejected(Action::Start, phase)),
        (phase, Trigger::ForceRestart) => Err(rejected(Action::ForceRestart, phase)),
        (phase, Trigger::Cancel) => Err(rejected(Action::Cancel, phase)),
        (phase, Trigger::Acknowledge) => Err(rejected(Action::Acknowledge, phase)),
    }
}

fn rejected(action: Action, phase: &Phase) -> OrchestratorError {
    OrchestratorError::InvalidTransition {
        action,
        state: phase.state(),
    }
}

fn fail_all(snapshot: &ClusterSnapshot, reason: &str) -> Vec<NodeFailure> {
    snapshot
        .nodes
        .iter()
        .map(|node| NodeFailure {
            node: node.id.clone(),
            reason: FailureReason::CallFailed(reason.to_string()),
        })
        .collect()
}
