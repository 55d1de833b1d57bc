use cluster_restart::{
    FailureReason, NodeCallError, NodeId, OrchestratorConfig, OrchestratorError, RestartBehavior, RestartOrchestrator,
    RestartState, RestartStatus, RunVerdict, SimulatedCluster, SyncBehavior, SyncStatus,
};
use slog::{o, Logger};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn create_logger() -> Logger {
    Logger::root(slog::Discard, o!())
}

fn orchestrator_for(cluster: &Arc<SimulatedCluster>) -> RestartOrchestrator {
    let config = OrchestratorConfig::default()
        .with_sync_timeout(Duration::from_millis(250))
        .with_restart_timeout(Duration::from_millis(250));
    RestartOrchestrator::new(cluster.clone(), cluster.clone(), config, create_logger())
        .expect("orchestrator should build")
}

fn ids(names: &[&str]) -> Vec<NodeId> {
    names.iter().map(|n| NodeId::from(*n)).collect()
}

#[tokio::test]
async fn test_scenario_a_all_synced_all_restarted() {
    let cluster = Arc::new(SimulatedCluster::new(["n1", "n2", "n3"]));
    let orchestrator = orchestrator_for(&cluster);

    orchestrator.start().await.expect("start should succeed");
    let state = orchestrator.wait_until_settled(WAIT).await.expect("run should settle");

    assert_eq!(state, RestartState::RestartedInfo);
    let result = orchestrator.run_result().expect("finished run has a result");
    assert_eq!(result.verdict, RunVerdict::Restarted);
    assert!(result.unsynced_nodes().is_empty());
    assert!(result.restart_failures.is_empty());
    assert_eq!(cluster.restart_requests().len(), 3);

    orchestrator.acknowledge().expect("acknowledge should succeed");
    assert_eq!(orchestrator.state(), RestartState::Idle);
    assert!(orchestrator.node_statuses().is_none());
}

#[tokio::test]
async fn test_scenario_b_unsynced_node_then_force_restart() {
    let cluster = Arc::new(SimulatedCluster::new(["n1", "n2", "n3"]).with_sync("n2", SyncBehavior::NotSynced));
    let orchestrator = orchestrator_for(&cluster);

    orchestrator.start().await.expect("start should succeed");
    let state = orchestrator.wait_until_settled(WAIT).await.expect("sync should settle");

    assert_eq!(state, RestartState::SyncError);
    assert_eq!(orchestrator.unsynced_nodes(), ids(&["n2"]));
    assert!(cluster.restart_requests().is_empty());

    orchestrator.force_restart().expect("force restart allowed in sync error");
    let state = orchestrator.wait_until_settled(WAIT).await.expect("restart should settle");

    assert_eq!(state, RestartState::RestartedInfo);
    let result = orchestrator.run_result().expect("finished run has a result");
    assert!(result.forced);
    assert_eq!(result.unsynced_nodes(), ids(&["n2"]));
    assert_eq!(result.sync_failures[0].reason, FailureReason::NotSynced);

    // The unsynced node was restarted along with the others
    let restarted: HashSet<NodeId> = cluster.restart_requests().into_iter().collect();
    let expected: HashSet<NodeId> = ids(&["n1", "n2", "n3"]).into_iter().collect();
    assert_eq!(restarted, expected);

    let n2 = result.nodes.iter().find(|n| n.id == NodeId::from("n2")).unwrap();
    assert_eq!(n2.sync_status, SyncStatus::Failed);
    assert_eq!(n2.restart_status, RestartStatus::Restarted);
}

#[tokio::test(start_paused = true)]
async fn test_scenario_c_unsynced_node_then_cancel() {
    let cluster = Arc::new(SimulatedCluster::new(["n1", "n2", "n3"]).with_sync("n2", SyncBehavior::NotSynced));
    let orchestrator = orchestrator_for(&cluster);

    orchestrator.start().await.expect("start should succeed");
    orchestrator.wait_until_settled(WAIT).await.expect("sync should settle");
    assert_eq!(orchestrator.state(), RestartState::SyncError);

    orchestrator.cancel().expect("cancel allowed in sync error");

    assert_eq!(orchestrator.state(), RestartState::Idle);
    assert!(orchestrator.unsynced_nodes().is_empty());
    assert!(orchestrator.node_statuses().is_none());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(cluster.restart_requests().is_empty());
}

#[tokio::test]
async fn test_scenario_d_restart_failure_on_one_node() {
    let cluster = Arc::new(SimulatedCluster::new(["n1", "n2", "n3"]).with_restart(
        "n1",
        RestartBehavior::Error(NodeCallError::Unreachable("connection reset".into())),
    ));
    let orchestrator = orchestrator_for(&cluster);

    orchestrator.start().await.expect("start should succeed");
    let state = orchestrator.wait_until_settled(WAIT).await.expect("run should settle");

    assert_eq!(state, RestartState::RestartError);
    let result = orchestrator.run_result().expect("finished run has a result");
    assert_eq!(result.verdict, RunVerdict::RestartError);
    assert_eq!(result.failed_nodes(), ids(&["n1"]));
    assert!(!result.forced);

    // Not auto-retried
    assert_eq!(
        cluster
            .restart_requests()
            .iter()
            .filter(|n| n.as_str() == "n1")
            .count(),
        1
    );
}

#[tokio::test]
async fn test_all_synced_never_reaches_sync_error() {
    for size in 1..=5 {
        let names: Vec<String> = (1..=size).map(|i| format!("node-{}", i)).collect();
        let cluster = Arc::new(SimulatedCluster::new(names.clone()));
        let orchestrator = orchestrator_for(&cluster);
        let mut states = orchestrator.watch_state();

        orchestrator.start().await.expect("start should succeed");

        let mut seen = Vec::new();
        loop {
            let state = *states.borrow_and_update();
            seen.push(state);
            if state.is_terminal() {
                break;
            }
            tokio::time::timeout(WAIT, states.changed())
                .await
                .expect("state should change")
                .expect("orchestrator alive");
        }

        assert!(!seen.contains(&RestartState::SyncError), "cluster of {} hit sync error", size);
        assert_eq!(seen.last(), Some(&RestartState::RestartedInfo));
    }
}

#[tokio::test]
async fn test_unsynced_nodes_match_failed_nodes_exactly() {
    let cluster = Arc::new(
        SimulatedCluster::new(["a", "b", "c", "d", "e"])
            .with_sync("b", SyncBehavior::NotSynced)
            .with_sync("d", SyncBehavior::Error(NodeCallError::Other("bad gateway".into())))
            .with_sync("e", SyncBehavior::Hang),
    );
    let orchestrator = orchestrator_for(&cluster);

    orchestrator.start().await.expect("start should succeed");
    let state = orchestrator.wait_until_settled(WAIT).await.expect("sync should settle");

    assert_eq!(state, RestartState::SyncError);
    let unsynced: HashSet<NodeId> = orchestrator.unsynced_nodes().into_iter().collect();
    let expected: HashSet<NodeId> = ids(&["b", "d", "e"]).into_iter().collect();
    assert_eq!(unsynced, expected);

    // Each failed node carries its reason for the operator
    let snapshot = orchestrator.node_statuses().expect("snapshot kept in sync error");
    for id in ["b", "d", "e"] {
        let node = snapshot.node(&id.into()).unwrap();
        assert_eq!(node.sync_status, SyncStatus::Failed);
        assert!(node.detail.is_some(), "node {} has no failure detail", id);
    }
}

#[tokio::test]
async fn test_force_restart_rejected_outside_sync_error() {
    let cluster = Arc::new(SimulatedCluster::new(["n1", "n2"]));
    let orchestrator = orchestrator_for(&cluster);

    let err = orchestrator.force_restart().unwrap_err();
    assert!(matches!(
        err,
        OrchestratorError::InvalidTransition {
            state: RestartState::Idle,
            ..
        }
    ));

    orchestrator.start().await.expect("start should succeed");
    orchestrator.wait_until_settled(WAIT).await.expect("run should settle");
    assert_eq!(orchestrator.state(), RestartState::RestartedInfo);

    assert!(orchestrator.force_restart().is_err());
    assert_eq!(orchestrator.state(), RestartState::RestartedInfo);
    // Exactly one restart per node, the rejected override dispatched nothing
    assert_eq!(cluster.restart_requests().len(), 2);
}

#[tokio::test]
async fn test_events_follow_the_run() {
    use cluster_restart::OrchestratorEvent;

    let cluster = Arc::new(SimulatedCluster::new(["n1", "n2"]));
    let orchestrator = orchestrator_for(&cluster);
    let mut events = orchestrator.subscribe();

    let run = orchestrator.start().await.expect("start should succeed");
    orchestrator.wait_until_settled(WAIT).await.expect("run should settle");

    let mut states = Vec::new();
    let mut node_updates = 0;
    let mut finished = None;
    while let Ok(event) = events.try_recv() {
        match event {
            OrchestratorEvent::StateChanged { state, .. } => states.push(state),
            OrchestratorEvent::NodeUpdated { run_id, .. } => {
                assert_eq!(run_id, run.id);
                node_updates += 1;
            }
            OrchestratorEvent::RunFinished(result) => finished = Some(result),
        }
    }

    assert_eq!(
        states,
        vec![
            RestartState::Syncing,
            RestartState::Restarting,
            RestartState::RestartedInfo
        ]
    );
    // synced, in progress and restarted for each node
    assert_eq!(node_updates, 6);
    assert_eq!(finished.map(|r| r.run_id), Some(run.id));
}

#[tokio::test]
async fn test_forced_run_keeps_sync_reason_of_node_that_also_fails_restart() {
    let cluster = Arc::new(
        SimulatedCluster::new(["n1", "n2"])
            .with_sync("n2", SyncBehavior::NotSynced)
            .with_restart("n2", RestartBehavior::Error(NodeCallError::Unreachable("conn reset".into()))),
    );
    let orchestrator = orchestrator_for(&cluster);

    orchestrator.start().await.expect("start should succeed");
    orchestrator.wait_until_settled(WAIT).await.expect("sync should settle");
    orchestrator.force_restart().expect("force restart allowed in sync error");
    let state = orchestrator.wait_until_settled(WAIT).await.expect("restart should settle");

    assert_eq!(state, RestartState::RestartError);
    let result = orchestrator.run_result().expect("finished run has a result");
    assert_eq!(result.sync_failures.len(), 1);
    assert_eq!(result.sync_failures[0].node, NodeId::from("n2"));
    assert_eq!(result.sync_failures[0].reason, FailureReason::NotSynced);
    assert_eq!(result.failed_nodes(), ids(&["n2"]));
    assert_eq!(
        result.restart_failures[0].reason,
        FailureReason::CallFailed("node unreachable: conn reset".into())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_force_restart_from_plain_control_thread() {
    let cluster = Arc::new(SimulatedCluster::new(["n1", "n2"]).with_sync("n2", SyncBehavior::NotSynced));
    let orchestrator = orchestrator_for(&cluster);

    orchestrator.start().await.expect("start should succeed");
    let state = orchestrator.wait_until_settled(WAIT).await.expect("sync should settle");
    assert_eq!(state, RestartState::SyncError);

    // The operator's thread has no tokio runtime of its own
    let control = orchestrator.clone();
    std::thread::spawn(move || control.force_restart())
        .join()
        .expect("control thread should not panic")
        .expect("force restart allowed in sync error");

    let state = orchestrator.wait_until_settled(WAIT).await.expect("restart should settle");
    assert_eq!(state, RestartState::RestartedInfo);
    assert_eq!(cluster.restart_requests().len(), 2);
}

#[test]
fn test_orchestrator_needs_a_runtime() {
    let cluster = Arc::new(SimulatedCluster::new(["n1"]));
    let result = RestartOrchestrator::new(
        cluster.clone(),
        cluster,
        OrchestratorConfig::default(),
        create_logger(),
    );

    assert!(matches!(result, Err(OrchestratorError::Runtime(_))));
}
