//! Cluster model
//!
//! Node identity and status records, the per-run status tracker, and the
//! contracts for talking to nodes.

pub mod api;
pub mod node;
pub mod simulated;
pub mod tracker;

pub use api::{MembershipSource, NodeApi, StaticMembership, SyncCheck};
pub use node::{ClusterSnapshot, NodeId, NodeStatus, NodeStatusUpdate, RestartStatus, SyncStatus};
pub use simulated::{RestartBehavior, SimulatedCluster, SyncBehavior};
pub use tracker::{MergeOutcome, NodeStatusTracker};
