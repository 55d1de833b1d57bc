//! Node records and the cluster snapshot handed to observers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, stable identifier of one cluster member
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Configuration-sync status of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

/// Restart status of a node
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestartStatus {
    Pending,
    InProgress,
    Restarted,
    Failed,
}

/// Latest known status of one node within a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub id: NodeId,
    pub sync_status: SyncStatus,
    pub restart_status: RestartStatus,

    /// Reason of the most recent failure, if any
    pub detail: Option<String>,
}

impl NodeStatus {
    pub fn pending(id: NodeId) -> Self {
        Self {
            id,
            sync_status: SyncStatus::Pending,
            restart_status: RestartStatus::Pending,
            detail: None,
        }
    }
}

/// Partial status update for a single node.
///
/// Fields left as `None` keep their current value when merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatusUpdate {
    pub id: NodeId,
    pub generation: u64,
    pub sync_status: Option<SyncStatus>,
    pub restart_status: Option<RestartStatus>,
    pub detail: Option<String>,
}

impl NodeStatusUpdate {
    pub fn new(id: NodeId, generation: u64) -> Self {
        Self {
            id,
            generation,
            sync_status: None,
            restart_status: None,
            detail: None,
        }
    }

    pub fn sync(mut self, status: SyncStatus) -> Self {
        self.sync_status = Some(status);
        self
    }

    pub fn restart(mut self, status: RestartStatus) -> Self {
        self.restart_status = Some(status);
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Read-only copy of every node's status, in membership order
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub generation: u64,
    pub nodes: Vec<NodeStatus>,
}

impl ClusterSnapshot {
    pub fn node(&self, id: &NodeId) -> Option<&NodeStatus> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
