//! Run orchestrator: connects the engine to the server.
//!
//! `RunOrchestrator` is the single invocation surface: `submit` a problem,
//! get back a fresh run id and its event stream. `EngineOrchestrator` is the
//! production implementation that spawns a `PipelineRunner` per run.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use triad_core::events::RunEvent;
use triad_core::ids::RunId;
use triad_engine::{ActivityGate, PipelineRun, PipelineRunner, RunOutcome};
use triad_store::RunStore;

/// Events buffered between a run and a slow observer.
pub const DEFAULT_EVENT_BUFFER: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("problem text is empty")]
    EmptyProblem,
}

/// A started run and the receiving end of its event stream.
/// Dropping `events` tells the run its observer is gone.
#[derive(Debug)]
pub struct RunSubmission {
    pub run_id: RunId,
    pub dormant: bool,
    pub events: mpsc::Receiver<RunEvent>,
}

#[async_trait]
pub trait RunOrchestrator: Send + Sync {
    /// Start a brand-new run for `problem`.
    async fn submit(&self, problem: &str) -> Result<RunSubmission, SubmitError>;
    fn abort(&self, run_id: &RunId) -> bool;
    fn active_runs(&self) -> usize;
    fn abort_all(&self) -> usize;
}

struct ActiveRun {
    cancel: CancellationToken,
    started_at: Instant,
}

/// Production orchestrator backed by the engine crates.
pub struct EngineOrchestrator {
    runner: Arc<PipelineRunner>,
    gate: ActivityGate,
    event_buffer: usize,
    active_runs: Arc<DashMap<RunId, ActiveRun>>,
}

impl EngineOrchestrator {
    pub fn new(runner: Arc<PipelineRunner>) -> Self {
        Self {
            runner,
            gate: ActivityGate::new(),
            event_buffer: DEFAULT_EVENT_BUFFER,
            active_runs: Arc::new(DashMap::new()),
        }
    }

    /// Events a run may queue ahead of its observer; at least one.
    pub fn with_event_buffer(mut self, event_buffer: usize) -> Self {
        self.event_buffer = event_buffer.max(1);
        self
    }
}

#[async_trait]
impl RunOrchestrator for EngineOrchestrator {
    #[instrument(skip_all, fields(problem_len = problem.len()))]
    async fn submit(&self, problem: &str) -> Result<RunSubmission, SubmitError> {
        if problem.trim().is_empty() {
            return Err(SubmitError::EmptyProblem);
        }

        // Gate first: this run's own session must not count as prior activity.
        let now = Utc::now();
        let store = self.runner.store().clone();
        let dormant = self.gate.evaluate(store.as_ref(), now);

        let run_id = RunId::new();
        if let Err(e) = store.record_session(&run_id, problem, dormant, now) {
            error!(run_id = %run_id, error = %e, "failed to record session");
        }

        let (tx, rx) = mpsc::channel(self.event_buffer);
        let cancel = CancellationToken::new();
        self.active_runs.insert(
            run_id.clone(),
            ActiveRun {
                cancel: cancel.clone(),
                started_at: Instant::now(),
            },
        );

        let runner = Arc::clone(&self.runner);
        let active_runs = Arc::clone(&self.active_runs);
        let run = PipelineRun::new(run_id.clone(), problem, dormant);
        let task_run_id = run_id.clone();

        tokio::spawn(async move {
            match runner.execute(run, tx, cancel).await {
                Ok(summary) if summary.outcome == RunOutcome::Completed => {
                    info!(run_id = %task_run_id, degraded = summary.degraded_phases, "run finished");
                }
                Ok(summary) => {
                    info!(
                        run_id = %task_run_id,
                        phases = summary.phases_completed(),
                        "run cancelled"
                    );
                }
                Err(e) => {
                    warn!(run_id = %task_run_id, error = %e, "run failed");
                }
            }

            if let Some((_, active)) = active_runs.remove(&task_run_id) {
                info!(
                    run_id = %task_run_id,
                    elapsed_ms = active.started_at.elapsed().as_millis() as u64,
                    "run released"
                );
            }
        });

        info!(run_id = %run_id, dormant, "run submitted");
        Ok(RunSubmission {
            run_id,
            dormant,
            events: rx,
        })
    }

    fn abort(&self, run_id: &RunId) -> bool {
        if let Some((_, run)) = self.active_runs.remove(run_id) {
            run.cancel.cancel();
            true
        } else {
            false
        }
    }

    fn active_runs(&self) -> usize {
        self.active_runs.len()
    }

    fn abort_all(&self) -> usize {
        let count = self.active_runs.len();
        for entry in self.active_runs.iter() {
            entry.value().cancel.cancel();
        }
        self.active_runs.clear();
        count
    }
}
