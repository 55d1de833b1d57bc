use clap::Parser;
use cluster_restart::{
    NodeCallError, OrchestratorConfig, RestartBehavior, RestartOrchestrator, RestartState,
    SimulatedCluster, SyncBehavior,
};
use log::{error, info, warn};
use slog::Drain;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "cluster-restart")]
#[command(about = "Sync configuration across a simulated cluster and restart it", long_about = None)]
struct Args {
    /// Cluster node ids (e.g., master,worker1,worker2)
    #[arg(short, long, value_delimiter = ',', default_value = "master,worker1,worker2")]
    nodes: Vec<String>,

    /// Nodes that report their configuration as not synchronized
    #[arg(short, long, value_delimiter = ',')]
    unsynced: Vec<String>,

    /// Nodes whose restart request fails
    #[arg(short, long, value_delimiter = ',')]
    restart_failures: Vec<String>,

    /// Nodes that never answer (they hit the phase timeout)
    #[arg(long, value_delimiter = ',')]
    unreachable: Vec<String>,

    /// Simulated latency of every node call, in milliseconds
    #[arg(long, default_value_t = 100)]
    latency_ms: u64,

    /// Force the restart when some nodes did not synchronize
    #[arg(short, long, default_value_t = false)]
    force: bool,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Override the per-node sync timeout, in milliseconds
    #[arg(long)]
    sync_timeout_ms: Option<u64>,

    /// Override the per-node restart timeout, in milliseconds
    #[arg(long)]
    restart_timeout_ms: Option<u64>,
}

fn create_logger() -> slog::Logger {
    let decorator = slog_term::PlainDecorator::new(std::io::stderr());
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

fn build_cluster(args: &Args) -> SimulatedCluster {
    let latency = Duration::from_millis(args.latency_ms);
    let mut cluster = SimulatedCluster::new(args.nodes.iter().cloned());

    for node in &args.nodes {
        cluster = cluster.with_latency(node.as_str(), latency);
    }
    for node in &args.unsynced {
        cluster = cluster.with_sync(node.as_str(), SyncBehavior::NotSynced);
    }
    for node in &args.restart_failures {
        cluster = cluster.with_restart(
            node.as_str(),
            RestartBehavior::Error(NodeCallError::Api {
                code: 500,
                message: "restart failed".to_string(),
            }),
        );
    }
    for node in &args.unreachable {
        cluster = cluster
            .with_sync(node.as_str(), SyncBehavior::Hang)
            .with_restart(node.as_str(), RestartBehavior::Hang);
    }
    cluster
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::from_file(path)?,
        None => OrchestratorConfig::default(),
    };
    if let Some(ms) = args.sync_timeout_ms {
        config = config.with_sync_timeout(Duration::from_millis(ms));
    }
    if let Some(ms) = args.restart_timeout_ms {
        config = config.with_restart_timeout(Duration::from_millis(ms));
    }

    // Waiting on a phase never takes longer than its per-node budget plus slack
    let phase_wait = Duration::from_millis(config.sync_timeout_ms.max(config.restart_timeout_ms))
        + Duration::from_secs(5);

    let cluster = Arc::new(build_cluster(&args));
    let orchestrator = RestartOrchestrator::new(cluster.clone(), cluster, config, create_logger())?;

    let run = orchestrator.start().await?;
    info!("Started run {} (generation {})", run.id, run.generation);

    let mut state = orchestrator.wait_until_settled(phase_wait).await?;

    if state == RestartState::SyncError {
        let unsynced: Vec<String> = orchestrator
            .unsynced_nodes()
            .iter()
            .map(|n| n.to_string())
            .collect();
        warn!("Nodes {} did not synchronize", unsynced.join(", "));

        if args.force {
            info!("Forcing restart");
            orchestrator.force_restart()?;
            state = orchestrator.wait_until_settled(phase_wait).await?;
        } else {
            info!("Cancelling; rerun with --force to restart anyway");
            orchestrator.cancel()?;
            return Ok(());
        }
    }

    match orchestrator.run_result() {
        Some(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            if state == RestartState::RestartError {
                error!("Restart failed on: {:?}", result.failed_nodes());
            }
            orchestrator.acknowledge()?;
        }
        None => error!("Run ended in {} without a result", state),
    }

    Ok(())
}
