//! Collaborator contracts consumed by the coordinators
//!
//! The orchestrator doesn't own a wire protocol. Whatever actually talks to
//! the nodes implements these traits.

use crate::cluster::NodeId;
use crate::error::NodeCallError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Answer of a configuration-sync check
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncCheck {
    Synced,
    NotSynced,
}

/// Per-node operations used during a run
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Check whether `node` has applied the latest configuration
    async fn check_sync(&self, node: &NodeId) -> Result<SyncCheck, NodeCallError>;

    /// Restart `node`. Returns once the node reports it restarted.
    async fn restart(&self, node: &NodeId) -> Result<(), NodeCallError>;
}

/// Source of the node set targeted by a new run
#[async_trait]
pub trait MembershipSource: Send + Sync {
    async fn members(&self) -> Result<Vec<NodeId>, NodeCallError>;
}

/// Fixed membership list
#[derive(Clone, Debug, Default)]
pub struct StaticMembership {
    nodes: Vec<NodeId>,
}

impl StaticMembership {
    pub fn new(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }
}

#[async_trait]
impl MembershipSource for StaticMembership {
    async fn members(&self) -> Result<Vec<NodeId>, NodeCallError> {
        Ok(self.nodes.clone())
    }
}
