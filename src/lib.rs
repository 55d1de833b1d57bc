//! Cluster configuration-sync and restart orchestration.
//!
//! A run checks that every node applied the latest configuration, then
//! restarts the fleet. A failed sync stops in `SyncError` until the operator
//! forces the restart or cancels.

pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod orchestrator;
pub mod run;

pub use cluster::{
    ClusterSnapshot, MembershipSource, MergeOutcome, NodeApi, NodeId, NodeStatus, NodeStatusTracker,
    NodeStatusUpdate, RestartBehavior, RestartStatus, SimulatedCluster, StaticMembership, SyncBehavior,
    SyncCheck, SyncStatus,
};
pub use config::OrchestratorConfig;
pub use coordinator::{
    FailureReason, NodeFailure, RestartCoordinator, RestartVerdict, SyncCoordinator, SyncVerdict,
};
pub use error::{NodeCallError, OrchestratorError, Result};
pub use event::OrchestratorEvent;
pub use event_bus::EventBus;
pub use orchestrator::{Action, RestartOrchestrator, RestartState, RunResult, RunVerdict};
pub use run::RunTag;
