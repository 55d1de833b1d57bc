//! In-memory cluster used by the CLI simulator and the tests
//!
//! Every node answers from a script: synced or not, restart ok or failing,
//! or never answering at all. All requests are recorded so callers can check
//! what was dispatched.

use crate::cluster::{MembershipSource, NodeApi, NodeId, SyncCheck};
use crate::error::NodeCallError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Scripted answer to a sync check
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncBehavior {
    Synced,
    NotSynced,
    Error(NodeCallError),
    /// Never answers
    Hang,
}

/// Scripted answer to a restart request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RestartBehavior {
    Restarted,
    Error(NodeCallError),
    /// Never answers
    Hang,
}

#[derive(Clone, Debug)]
struct NodeScript {
    sync: SyncBehavior,
    restart: RestartBehavior,
    latency: Duration,
}

impl Default for NodeScript {
    fn default() -> Self {
        Self {
            sync: SyncBehavior::Synced,
            restart: RestartBehavior::Restarted,
            latency: Duration::ZERO,
        }
    }
}

#[derive(Default)]
struct CallLog {
    sync: Vec<NodeId>,
    restart: Vec<NodeId>,
}

/// Scripted stand-in for a real cluster
pub struct SimulatedCluster {
    members: Vec<NodeId>,
    scripts: Mutex<HashMap<NodeId, NodeScript>>,
    calls: Mutex<CallLog>,
}

impl SimulatedCluster {
    /// Every node syncs and restarts successfully until told otherwise
    pub fn new<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        let members: Vec<NodeId> = nodes.into_iter().map(Into::into).collect();
        let scripts = members
            .iter()
            .map(|id| (id.clone(), NodeScript::default()))
            .collect();

        Self {
            members,
            scripts: Mutex::new(scripts),
            calls: Mutex::new(CallLog::default()),
        }
    }

    pub fn with_sync(self, node: impl Into<NodeId>, behavior: SyncBehavior) -> Self {
        self.set_sync(node, behavior);
        self
    }

    pub fn with_restart(self, node: impl Into<NodeId>, behavior: RestartBehavior) -> Self {
        self.set_restart(node, behavior);
        self
    }

    /// Delay every answer of `node` by `latency`
    pub fn with_latency(self, node: impl Into<NodeId>, latency: Duration) -> Self {
        self.script_mut(node.into(), |script| script.latency = latency);
        self
    }

    pub fn set_sync(&self, node: impl Into<NodeId>, behavior: SyncBehavior) {
        self.script_mut(node.into(), |script| script.sync = behavior);
    }

    pub fn set_restart(&self, node: impl Into<NodeId>, behavior: RestartBehavior) {
        self.script_mut(node.into(), |script| script.restart = behavior);
    }

    /// Node ids a sync check was dispatched to, in dispatch order
    pub fn sync_requests(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).sync.clone()
    }

    /// Node ids a restart was dispatched to, in dispatch order
    pub fn restart_requests(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).restart.clone()
    }

    fn script_mut(&self, node: NodeId, f: impl FnOnce(&mut NodeScript)) {
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
        f(scripts.entry(node).or_default());
    }

    fn script(&self, node: &NodeId) -> Option<NodeScript> {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(node)
            .cloned()
    }

    fn unknown(node: &NodeId) -> NodeCallError {
        NodeCallError::Api {
            code: 404,
            message: format!("node {} not found", node),
        }
    }
}

#[async_trait]
impl NodeApi for SimulatedCluster {
    async fn check_sync(&self, node: &NodeId) -> Result<SyncCheck, NodeCallError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sync
            .push(node.clone());

        let script = self.script(node).ok_or_else(|| Self::unknown(node))?;
        tokio::time::sleep(script.latency).await;

        match script.sync {
            SyncBehavior::Synced => Ok(SyncCheck::Synced),
            SyncBehavior::NotSynced => Ok(SyncCheck::NotSynced),
            SyncBehavior::Error(e) => Err(e),
            SyncBehavior::Hang => std::future::pending().await,
        }
    }

    async fn restart(&self, node: &NodeId) -> Result<(), NodeCallError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .restart
            .push(node.clone());

        let script = self.script(node).ok_or_else(|| Self::unknown(node))?;
        tokio::time::sleep(script.latency).await;

        match script.restart {
            RestartBehavior::Restarted => Ok(()),
            RestartBehavior::Error(e) => Err(e),
            RestartBehavior::Hang => std::future::pending().await,
        }
    }
}

#[async_trait]
impl MembershipSource for SimulatedCluster {
    async fn members(&self) -> Result<Vec<NodeId>, NodeCallError> {
        Ok(self.members.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_script_succeeds() {
        let cluster = SimulatedCluster::new(["n1", "n2"]);

        assert_eq!(cluster.check_sync(&"n1".into()).await, Ok(SyncCheck::Synced));
        assert_eq!(cluster.restart(&"n2".into()).await, Ok(()));
        assert_eq!(cluster.sync_requests(), vec![NodeId::from("n1")]);
        assert_eq!(cluster.restart_requests(), vec![NodeId::from("n2")]);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let cluster = SimulatedCluster::new(["n1", "n2"])
            .with_sync("n1", SyncBehavior::NotSynced)
            .with_restart("n2", RestartBehavior::Error(NodeCallError::Other("boom".into())));

        assert_eq!(cluster.check_sync(&"n1".into()).await, Ok(SyncCheck::NotSynced));
        assert_eq!(
            cluster.restart(&"n2".into()).await,
            Err(NodeCallError::Other("boom".into()))
        );
    }

    #[tokio::test]
    async fn test_unknown_node_errors() {
        let cluster = SimulatedCluster::new(["n1"]);
        let result = cluster.check_sync(&"n9".into()).await;

        assert!(matches!(result, Err(NodeCallError::Api { code: 404, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_node_never_answers() {
        let cluster = SimulatedCluster::new(["n1"]).with_sync("n1", SyncBehavior::Hang);
        let result =
            tokio::time::timeout(Duration::from_millis(50), cluster.check_sync(&"n1".into())).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_membership_lists_all_nodes() {
        let cluster = SimulatedCluster::new(["n1", "n2", "n3"]);
        let members = cluster.members().await.unwrap();

        assert_eq!(members.len(), 3);
    }
}
