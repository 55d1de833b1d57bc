//! Error types for the restart orchestrator

use crate::orchestrator::{Action, RestartState};
use thiserror::Error;

/// Result type for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Hard errors reported to the caller of an orchestrator action.
///
/// Business-level failures (unsynced or failed nodes) are not errors; they
/// surface as `SyncError` / `RestartError` states.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrchestratorError {
    /// The action is not permitted in the current state
    #[error("cannot {action} while {state}")]
    InvalidTransition { action: Action, state: RestartState },

    /// The membership source returned no nodes
    #[error("cluster has no nodes to target")]
    EmptyCluster,

    /// A coordinator was asked to run against an empty node set
    #[error("node set for the {phase} phase is empty")]
    EmptyNodeSet { phase: &'static str },

    /// The membership source could not be queried
    #[error("membership lookup failed: {0}")]
    Membership(#[from] NodeCallError),

    /// A completion arrived for a run that is no longer current
    #[error("run generation {generation} is no longer current")]
    StaleRun { generation: u64 },

    /// Timeout waiting for the orchestrator
    #[error("timeout waiting for {0}")]
    Timeout(String),

    /// No tokio runtime to run coordinators on
    #[error("no async runtime: {0}")]
    Runtime(String),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failure of a single call against one node (or the membership source)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeCallError {
    /// The node could not be reached
    #[error("node unreachable: {0}")]
    Unreachable(String),

    /// The node answered with an error
    #[error("API error {code}: {message}")]
    Api { code: u16, message: String },

    /// Any other failure
    #[error("{0}")]
    Other(String),
}
