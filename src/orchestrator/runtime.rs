//! Restart orchestrator runtime
//!
//! Owns the current phase and the active run's snapshot, executes the effects
//! returned by the state machine, and exposes the operator actions.
//!
//! All phase changes happen under one short-lived lock that is never held
//! across an await. Coordinators run in a spawned task per phase; their
//! completions re-enter the state machine through the same lock and are
//! dropped if the run they belong to is no longer current.

use crate::cluster::{ClusterSnapshot, MembershipSource, NodeApi, NodeId, NodeStatusTracker};
use crate::config::OrchestratorConfig;
use crate::coordinator::{RestartCoordinator, SyncCoordinator};
use crate::error::{OrchestratorError, Result};
use crate::event::OrchestratorEvent;
use crate::event_bus::EventBus;
use crate::orchestrator::state::{transition, Action, Effect, Phase, RestartState, RunResult, Trigger};
use crate::run::RunTag;
use slog::{debug, error, info, o, Logger};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

struct Inner {
    phase: Phase,

    /// Snapshot of the active run; `None` when idle
    tracker: Option<Arc<NodeStatusTracker>>,

    /// Coordinator task of the active run
    in_flight: Option<JoinHandle<()>>,
}

struct Shared {
    inner: Mutex<Inner>,
    membership: Arc<dyn MembershipSource>,
    sync: SyncCoordinator,
    restart: RestartCoordinator,
    events: Arc<EventBus<OrchestratorEvent>>,
    state_tx: watch::Sender<RestartState>,
    generation: AtomicU64,

    /// Runtime the orchestrator was created on; coordinators always run here
    runtime: Handle,
    logger: Logger,
}

/// Top-level cluster restart state machine.
///
/// Cheap to clone; clones share the same orchestrator. Must be created inside
/// a tokio runtime. Actions other than `start` are synchronous and may be
/// called from any thread, including ones without a runtime.
#[derive(Clone)]
pub struct RestartOrchestrator {
    shared: Arc<Shared>,
}

impl RestartOrchestrator {
    /// Create an idle orchestrator
    ///
    /// # Arguments
    /// * `api` - Per-node sync check and restart operations
    /// * `membership` - Source of the nodes targeted by each run
    /// * `config` - Timeouts and event buffering
    /// * `logger` - Logger instance
    pub fn new(
        api: Arc<dyn NodeApi>,
        membership: Arc<dyn MembershipSource>,
        config: OrchestratorConfig,
        logger: Logger,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| OrchestratorError::Runtime(e.to_string()))?;

        let (state_tx, _) = watch::channel(RestartState::Idle);
        let logger = logger.new(o!("component" => "restart_orchestrator"));

        info!(logger, "Creating restart orchestrator";
            "sync_timeout_ms" => config.sync_timeout_ms,
            "restart_timeout_ms" => config.restart_timeout_ms
        );

        let shared = Shared {
            inner: Mutex::new(Inner {
                phase: Phase::Idle,
                tracker: None,
                in_flight: None,
            }),
            membership,
            sync: SyncCoordinator::new(api.clone(), config.sync_timeout(), logger.clone()),
            restart: RestartCoordinator::new(api, config.restart_timeout(), logger.clone()),
            events: Arc::new(EventBus::new(config.event_capacity)),
            state_tx,
            generation: AtomicU64::new(0),
            runtime,
            logger,
        };

        Ok(Self {
            shared: Arc::new(shared),
        })
    }

    /// Start a new run: snapshot the current membership and begin syncing.
    ///
    /// Only allowed when idle. Fails with `EmptyCluster` if the membership
    /// source returns no nodes.
    pub async fn start(&self) -> Result<RunTag> {
        let state = self.state();
        if state != RestartState::Idle {
            return Err(OrchestratorError::InvalidTransition {
                action: Action::Start,
                state,
            });
        }

        let members = self.shared.membership.members().await?;
        if members.is_empty() {
            return Err(OrchestratorError::EmptyCluster);
        }

        let run = RunTag::new(self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1);
        let tracker = Arc::new(NodeStatusTracker::new(run, members).with_events(self.shared.events.clone()));

        // The phase may have moved on while membership was being fetched
        let mut inner = self.shared.lock();
        let (phase, effects) = transition(&inner.phase, Trigger::Start { run })?;

        info!(self.shared.logger, "Starting restart run";
            "run_id" => run.id.to_string(),
            "generation" => run.generation,
            "nodes" => tracker.snapshot().len()
        );

        inner.tracker = Some(tracker);
        self.shared.enter(&mut inner, phase, effects);
        Ok(run)
    }

    /// Restart every node despite a failed sync. Only allowed in `SyncError`.
    pub fn force_restart(&self) -> Result<()> {
        self.shared.apply(Trigger::ForceRestart).map(|_| ())
    }

    /// Abandon the active run and go back to idle.
    ///
    /// Stops in-flight node calls; answers that still arrive for the
    /// abandoned run are discarded. A no-op when already idle.
    pub fn cancel(&self) -> Result<()> {
        self.shared.apply(Trigger::Cancel).map(|_| ())
    }

    /// Dismiss a finished run and go back to idle
    pub fn acknowledge(&self) -> Result<()> {
        self.shared.apply(Trigger::Acknowledge).map(|_| ())
    }

    pub fn state(&self) -> RestartState {
        self.shared.lock().phase.state()
    }

    /// Nodes that failed the sync check; empty outside `SyncError`
    pub fn unsynced_nodes(&self) -> Vec<NodeId> {
        self.shared.lock().phase.unsynced_nodes()
    }

    /// Live node statuses of the active run
    pub fn node_statuses(&self) -> Option<ClusterSnapshot> {
        self.shared.lock().tracker.as_ref().map(|t| t.snapshot())
    }

    /// Result of the finished run, until it is acknowledged
    pub fn run_result(&self) -> Option<RunResult> {
        self.shared.lock().phase.result().cloned()
    }

    pub fn current_run(&self) -> Option<RunTag> {
        self.shared.lock().phase.run()
    }

    /// Subscribe to state changes, node updates and finished runs
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.shared.events.subscribe()
    }

    pub fn watch_state(&self) -> watch::Receiver<RestartState> {
        self.shared.state_tx.subscribe()
    }

    /// Wait until the state satisfies `predicate`, checking the current state first
    pub async fn wait_for_state<P>(&self, predicate: P, timeout: Duration) -> Result<RestartState>
    where
        P: FnMut(&RestartState) -> bool,
    {
        let mut rx = self.watch_state();
        // The borrowed state must be dropped before `rx`
        let waited = tokio::time::timeout(timeout, rx.wait_for(predicate)).await;
        match waited {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_)) => Err(OrchestratorError::Timeout("closed state channel".into())),
            Err(_) => Err(OrchestratorError::Timeout("orchestrator state".into())),
        }
    }

    /// Wait until the active run needs the operator or has finished
    pub async fn wait_until_settled(&self, timeout: Duration) -> Result<RestartState> {
        self.wait_for_state(
            |state| !matches!(state, RestartState::Syncing | RestartState::Restarting),
            timeout,
        )
        .await
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(self: &Arc<Self>, trigger: Trigger) -> Result<RestartState> {
        let mut inner = self.lock();
        let (phase, effects) = transition(&inner.phase, trigger)?;
        Ok(self.enter(&mut inner, phase, effects))
    }

    fn enter(self: &Arc<Self>, inner: &mut Inner, phase: Phase, effects: Vec<Effect>) -> RestartState {
        let previous = inner.phase.state();
        let state = phase.state();
        let run_id = phase.run_id();
        inner.phase = phase;

        let changed = previous != state;
        if changed {
            info!(self.logger, "Restart state changed";
                "from" => %previous,
                "to" => %state,
                "run_id" => run_id.map(|id| id.to_string())
            );
            self.events.publish(OrchestratorEvent::StateChanged { run_id, state });
        }

        for effect in effects {
            self.execute(inner, effect);
        }

        // Watchers wake last, after every event of this transition is out
        if changed {
            self.state_tx.send_replace(state);
        }
        state
    }

    fn execute(self: &Arc<Self>, inner: &mut Inner, effect: Effect) {
        match effect {
            Effect::BeginSync { run } => {
                let Some(tracker) = inner.tracker.clone() else {
                    error!(self.logger, "No snapshot for sync phase"; "generation" => run.generation);
                    return;
                };
                let shared = self.clone();
                inner.in_flight = Some(self.runtime.spawn(async move {
                    let nodes = tracker.node_ids();
                    match shared.sync.run(&tracker, &nodes).await {
                        Ok(verdict) => shared.complete(Trigger::SyncFinished { run, verdict }),
                        Err(e) => {
                            error!(shared.logger, "Sync phase failed to run"; "error" => %e);
                            shared.complete(Trigger::PhaseFailed {
                                run,
                                reason: e.to_string(),
                                snapshot: tracker.snapshot(),
                            });
                        }
                    }
                }));
            }

            Effect::BeginRestart { run, forced } => {
                let Some(tracker) = inner.tracker.clone() else {
                    error!(self.logger, "No snapshot for restart phase"; "generation" => run.generation);
                    return;
                };
                if forced {
                    info!(self.logger, "Forcing restart despite unsynced nodes";
                        "run_id" => run.id.to_string());
                }
                let shared = self.clone();
                inner.in_flight = Some(self.runtime.spawn(async move {
                    // Every node of the snapshot, including the ones that failed to sync
                    let nodes = tracker.node_ids();
                    match shared.restart.run(&tracker, &nodes).await {
                        Ok(verdict) => shared.complete(Trigger::RestartFinished {
                            run,
                            verdict,
                            snapshot: tracker.snapshot(),
                        }),
                        Err(e) => {
                            error!(shared.logger, "Restart phase failed to run"; "error" => %e);
                            shared.complete(Trigger::PhaseFailed {
                                run,
                                reason: e.to_string(),
                                snapshot: tracker.snapshot(),
                            });
                        }
                    }
                }));
            }

            Effect::AbortInFlight => {
                if let Some(handle) = inner.in_flight.take() {
                    handle.abort();
                }
            }

            Effect::DiscardSnapshot => {
                if let Some(tracker) = inner.tracker.take() {
                    tracker.retire();
                }
            }

            Effect::PublishResult(result) => {
                inner.in_flight = None;
                info!(self.logger, "Restart run finished";
                    "run_id" => result.run_id.to_string(),
                    "verdict" => ?result.verdict,
                    "failed" => result.restart_failures.len()
                );
                self.events.publish(OrchestratorEvent::RunFinished(result));
            }
        }
    }

    /// Feed a coordinator completion back into the state machine
    fn complete(self: &Arc<Self>, trigger: Trigger) {
        if let Err(e) = self.apply(trigger) {
            debug!(self.logger, "Discarding completion"; "reason" => %e);
        }
    }
}
