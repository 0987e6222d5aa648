use crate::config::{ConfigIssue, SimulationRequest, SimulationSettings};
use crate::simulation::{run_simulation, MarketDataPorts};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};
use tradesphere_domain::entities::metrics::{BetaEstimate, ReturnsSummary};
use tradesphere_domain::services::audit::AuditEvent;
use tradesphere_domain::services::engine::simulation::{
    RunControl, SimulationPlan, SimulationResults, SimulationState, TickProgress,
};
use tradesphere_domain::value_objects::snapshot::{FinalMetrics, SimulationSnapshot};
use tradesphere_domain::value_objects::trade::HedgeTrade;

pub type SimulationId = String;

/// Cooperative stop flag, observed by the simulation loop once per tick.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl RunControl for CancellationToken {
    fn should_cancel(&self) -> bool {
        self.is_cancelled()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatus {
    pub id: SimulationId,
    pub state: SimulationState,
    pub is_running: bool,
    pub is_complete: bool,
    pub results: Vec<SimulationSnapshot>,
    pub final_metrics: Option<FinalMetrics>,
    pub error: Option<String>,
    /// Recorded ticks over planned ticks, in `[0, 1]`.
    pub progress: f64,
    pub planned_ticks: u32,
    pub skipped_entries: Vec<ConfigIssue>,
    pub beta: Option<BetaEstimate>,
    pub returns_summary: Option<ReturnsSummary>,
    pub hedge_trades: Vec<HedgeTrade>,
    pub audit_events: Vec<AuditEvent>,
}

impl SimulationStatus {
    fn pending(id: &str, planned_ticks: u32, skipped: Vec<ConfigIssue>) -> Self {
        Self {
            id: id.to_string(),
            state: SimulationState::Pending,
            is_running: false,
            is_complete: false,
            results: Vec::new(),
            final_metrics: None,
            error: None,
            progress: 0.0,
            planned_ticks,
            skipped_entries: skipped,
            beta: None,
            returns_summary: None,
            hedge_trades: Vec::new(),
            audit_events: Vec::new(),
        }
    }

    fn set_state(&mut self, state: SimulationState) {
        self.state = state;
        self.is_running = state == SimulationState::Running;
        self.is_complete = state.is_terminal();
    }

    fn fail(&mut self, initial_cash: f64, message: String) {
        self.set_state(SimulationState::Failed);
        self.final_metrics = Some(FinalMetrics::zeroed(initial_cash));
        self.error = Some(message);
    }

    fn record_tick(&mut self, progress: TickProgress<'_>) {
        self.results.push(progress.snapshot.clone());
        self.progress = if progress.planned_ticks == 0 {
            1.0
        } else {
            f64::from(progress.tick) / f64::from(progress.planned_ticks)
        };
    }

    fn finish(&mut self, results: SimulationResults) {
        self.set_state(results.state);
        self.results = results.snapshots;
        self.final_metrics = Some(results.final_metrics);
        self.beta = results.beta;
        self.returns_summary = results.returns_summary;
        self.hedge_trades = results.hedge_trades;
        self.audit_events = results.audit_events;
    }
}

#[derive(Debug)]
struct SimulationHandle {
    status: Mutex<SimulationStatus>,
    token: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Owns every live simulation and exposes the start/status/stop/cleanup surface.
///
/// Each simulation runs on its own worker thread and is the only writer of its
/// status; readers receive clones.
#[derive(Debug)]
pub struct SimulationRegistry {
    simulations: Arc<RwLock<HashMap<SimulationId, Arc<SimulationHandle>>>>,
    next_id: AtomicU64,
    ports: MarketDataPorts,
    settings: SimulationSettings,
}

impl SimulationRegistry {
    pub fn new(ports: MarketDataPorts, settings: SimulationSettings) -> Self {
        Self {
            simulations: Arc::new(RwLock::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            ports,
            settings,
        }
    }

    pub fn settings(&self) -> &SimulationSettings {
        &self.settings
    }

    /// Registers and launches a simulation. Always returns an id; requests
    /// that cannot run are registered as failed.
    pub fn start(&self, request: &SimulationRequest) -> SimulationId {
        let id = format!("sim-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        metrics::counter!("tradesphere.simulations.started").increment(1);

        let prepared = match request.prepare(&id, &self.settings) {
            Ok(prepared) => prepared,
            Err(err) => {
                warn!(id = %id, error = %err, "simulation request rejected");
                let mut status = SimulationStatus::pending(&id, 0, Vec::new());
                status.fail(request.initial_cash, err);
                metrics::counter!("tradesphere.simulations.failed").increment(1);
                self.register(&id, status, CancellationToken::new());
                return id;
            }
        };
        for issue in &prepared.skipped {
            warn!(id = %id, entry = %issue.entry, reason = %issue.reason, "skipping configuration entry");
        }

        let planned_ticks = prepared.plan.planned_ticks();
        let token = CancellationToken::new();
        let handle = self.register(
            &id,
            SimulationStatus::pending(&id, planned_ticks, prepared.skipped),
            token,
        );

        let worker_handle = handle.clone();
        let ports = self.ports.clone();
        let settings = self.settings.clone();
        let plan = prepared.plan;
        let spawned = thread::Builder::new()
            .name(format!("simulation-{id}"))
            .spawn(move || execute(worker_handle, plan, ports, settings));

        match spawned {
            Ok(join) => {
                *handle.worker.lock() = Some(join);
                info!(id = %id, planned_ticks, "simulation started");
            }
            Err(err) => {
                error!(id = %id, error = %err, "failed to spawn simulation worker");
                handle
                    .status
                    .lock()
                    .fail(request.initial_cash, format!("failed to spawn worker: {err}"));
                metrics::counter!("tradesphere.simulations.failed").increment(1);
            }
        }
        id
    }

    pub fn status(&self, id: &str) -> Option<SimulationStatus> {
        let handle = self.simulations.read().get(id).cloned()?;
        let status = handle.status.lock().clone();
        Some(status)
    }

    /// Requests a cooperative stop. Returns `false` for unknown ids.
    pub fn stop(&self, id: &str) -> bool {
        match self.simulations.read().get(id) {
            Some(handle) => {
                handle.token.cancel();
                info!(id = %id, "simulation stop requested");
                true
            }
            None => false,
        }
    }

    /// Stops the simulation if needed and forgets it.
    pub fn cleanup(&self, id: &str) -> bool {
        let removed = self.simulations.write().remove(id);
        match removed {
            Some(handle) => {
                handle.token.cancel();
                info!(id = %id, "simulation cleaned up");
                true
            }
            None => false,
        }
    }

    /// Blocks until the worker exits and returns the final status.
    pub fn wait(&self, id: &str) -> Option<SimulationStatus> {
        let handle = self.simulations.read().get(id).cloned()?;
        let worker = handle.worker.lock().take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!(id = %id, "simulation worker exited abnormally");
            }
        }
        let status = handle.status.lock().clone();
        Some(status)
    }

    pub fn ids(&self) -> Vec<SimulationId> {
        let mut ids: Vec<SimulationId> = self.simulations.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn register(&self, id: &str, status: SimulationStatus, token: CancellationToken) -> Arc<SimulationHandle> {
        let handle = Arc::new(SimulationHandle {
            status: Mutex::new(status),
            token,
            worker: Mutex::new(None),
        });
        self.simulations.write().insert(id.to_string(), handle.clone());
        handle
    }
}

fn execute(handle: Arc<SimulationHandle>, plan: SimulationPlan, ports: MarketDataPorts, settings: SimulationSettings) {
    let initial_cash = plan.initial_cash;
    let run_id = plan.run_id.clone();
    handle.status.lock().set_state(SimulationState::Running);
    metrics::gauge!("tradesphere.simulations.active").increment(1.0);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        run_simulation(
            plan,
            &ports,
            &settings.provider,
            &settings.runtime,
            &handle.token,
            &mut |progress: TickProgress<'_>| handle.status.lock().record_tick(progress),
        )
    }));

    let mut status = handle.status.lock();
    match outcome {
        Ok(Ok((results, skipped))) => {
            let state = results.state;
            status.skipped_entries.extend(skipped);
            status.finish(results);
            match state {
                SimulationState::Cancelled => {
                    metrics::counter!("tradesphere.simulations.cancelled").increment(1);
                    info!(id = %run_id, "simulation cancelled");
                }
                _ => {
                    metrics::counter!("tradesphere.simulations.completed").increment(1);
                }
            }
        }
        Ok(Err(err)) => {
            error!(id = %run_id, error = %err, "simulation failed");
            status.fail(initial_cash, err);
            metrics::counter!("tradesphere.simulations.failed").increment(1);
        }
        Err(_) => {
            error!(id = %run_id, "simulation worker panicked");
            status.fail(initial_cash, "simulation worker panicked".to_string());
            metrics::counter!("tradesphere.simulations.failed").increment(1);
        }
    }
    drop(status);
    metrics::gauge!("tradesphere.simulations.active").decrement(1.0);
}
