//! Node status tracker
//!
//! Holds the latest known status of every node in one run. Coordinators
//! write into it as node calls settle; the presentation layer reads owned
//! snapshots out of it.

use crate::cluster::{ClusterSnapshot, NodeId, NodeStatus, NodeStatusUpdate};
use crate::event::OrchestratorEvent;
use crate::event_bus::EventBus;
use crate::run::RunTag;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// What happened to a merged update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The node record changed
    Applied,
    /// The update matched the current record (idempotent re-apply)
    Unchanged,
    /// The node is not part of this run's membership
    UnknownNode,
    /// The update belongs to another run, or this tracker was retired
    Stale,
}

struct TrackerState {
    nodes: Vec<NodeStatus>,
    index: HashMap<NodeId, usize>,
    retired: bool,
}

/// Per-run store of node statuses.
///
/// Membership is fixed at construction; a node is never added or removed
/// afterwards, only its status fields change. Every merge takes the write
/// lock for the whole node record, so readers never see half an update.
pub struct NodeStatusTracker {
    run: RunTag,
    state: RwLock<TrackerState>,
    events: Option<Arc<EventBus<OrchestratorEvent>>>,
}

impl NodeStatusTracker {
    /// Create a tracker for `nodes`, all starting out pending.
    ///
    /// Duplicate ids collapse onto the first occurrence.
    pub fn new(run: RunTag, nodes: impl IntoIterator<Item = NodeId>) -> Self {
        let mut records = Vec::new();
        let mut index = HashMap::new();

        for id in nodes {
            if index.contains_key(&id) {
                continue;
            }
            index.insert(id.clone(), records.len());
            records.push(NodeStatus::pending(id));
        }

        Self {
            run,
            state: RwLock::new(TrackerState {
                nodes: records,
                index,
                retired: false,
            }),
            events: None,
        }
    }

    /// Publish a `NodeUpdated` event for every applied merge
    pub fn with_events(mut self, events: Arc<EventBus<OrchestratorEvent>>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn run(&self) -> RunTag {
        self.run
    }

    /// Apply a partial update to one node
    pub fn merge(&self, update: NodeStatusUpdate) -> MergeOutcome {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.retired || update.generation != self.run.generation {
            return MergeOutcome::Stale;
        }

        let Some(&slot) = state.index.get(&update.id) else {
            return MergeOutcome::UnknownNode;
        };

        let current = &state.nodes[slot];
        let mut next = current.clone();
        if let Some(sync_status) = update.sync_status {
            next.sync_status = sync_status;
        }
        if let Some(restart_status) = update.restart_status {
            next.restart_status = restart_status;
        }
        if update.detail.is_some() {
            next.detail = update.detail;
        }

        if &next == current {
            return MergeOutcome::Unchanged;
        }

        state.nodes[slot] = next.clone();

        // Published under the lock so a retire() can't slip in between
        if let Some(events) = &self.events {
            events.publish(OrchestratorEvent::NodeUpdated {
                run_id: self.run.id,
                node: next,
            });
        }

        MergeOutcome::Applied
    }

    /// Owned copy of all node records
    pub fn snapshot(&self) -> ClusterSnapshot {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        ClusterSnapshot {
            generation: self.run.generation,
            nodes: state.nodes.clone(),
        }
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Reject every later merge. Called when the owning run is discarded.
    pub fn retire(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.retired = true;
    }

    pub fn is_retired(&self) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .retired
    }
}
