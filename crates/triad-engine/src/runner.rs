use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use triad_core::events::RunEvent;
use triad_core::ids::RunId;
use triad_core::messages::ConversationHistory;
use triad_core::phase::{validate_phases, PhaseSpec};
use triad_llm::{BackendRegistry, FallbackDispatcher};
use triad_store::RunStore;

use crate::error::EngineError;
use crate::phases::{default_phases, render_instruction};
use crate::protocol::{Flow, RunProtocol};

/// State of one run. Owned by the runner for the run's lifetime and
/// dropped when it ends; only the store keeps the outputs.
#[derive(Debug)]
pub struct PipelineRun {
    run_id: RunId,
    problem: String,
    dormant: bool,
    history: ConversationHistory,
}

impl PipelineRun {
    pub fn new(run_id: RunId, problem: impl Into<String>, dormant: bool) -> Self {
        Self {
            run_id,
            problem: problem.into(),
            dormant,
            history: ConversationHistory::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The observer went away; later phases were never scheduled.
    Cancelled,
}

/// What a run produced, phase outputs in order.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    pub outputs: Vec<(String, String)>,
    pub degraded_phases: usize,
}

impl RunSummary {
    pub fn phases_completed(&self) -> usize {
        self.outputs.len()
    }
}

/// Executes the fixed phase sequence for a run, threading one growing
/// conversation through the dispatcher.
pub struct PipelineRunner {
    dispatcher: Arc<FallbackDispatcher>,
    registry: Arc<BackendRegistry>,
    store: Arc<dyn RunStore>,
    phases: Arc<[PhaseSpec]>,
}

impl PipelineRunner {
    pub fn new(
        dispatcher: Arc<FallbackDispatcher>,
        registry: Arc<BackendRegistry>,
        store: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            dispatcher,
            registry,
            store,
            phases: default_phases().into(),
        }
    }

    /// Replace the phase set. It must hold exactly one problem slot.
    pub fn with_phases(mut self, phases: Vec<PhaseSpec>) -> Result<Self, EngineError> {
        validate_phases(&phases)?;
        self.phases = phases.into();
        Ok(self)
    }

    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Drive `run` through every phase, emitting events to `events`.
    ///
    /// Cancellation is checked at phase boundaries only: a dispatch that has
    /// started always finishes and its result is recorded.
    #[instrument(skip_all, fields(run_id = %run.run_id, dormant = run.dormant))]
    pub async fn execute(
        &self,
        mut run: PipelineRun,
        events: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> Result<RunSummary, EngineError> {
        let mut protocol = RunProtocol::new(run.run_id.clone(), self.phases.len(), events, cancel);
        let mut summary = RunSummary {
            run_id: run.run_id.clone(),
            outcome: RunOutcome::Cancelled,
            outputs: Vec::with_capacity(self.phases.len()),
            degraded_phases: 0,
        };

        if protocol.open(run.dormant).await? == Flow::Cancelled {
            return Ok(summary);
        }

        for (index, phase) in self.phases.iter().enumerate() {
            if protocol.start_phase(phase).await? == Flow::Cancelled {
                return Ok(summary);
            }
            info!(phase = %phase.id, index, "phase started");

            let instruction = render_instruction(phase, &run.problem, run.dormant);
            run.history.append_request(instruction)?;

            let outcome = self.dispatcher.dispatch(&run.history, &self.registry).await;
            if outcome.is_degraded() {
                summary.degraded_phases += 1;
            }
            let output = outcome.into_text();
            run.history.append_response(output.clone())?;
            debug_assert_eq!(run.history.len(), 2 * (index + 1));

            self.record_message(&run.run_id, &phase.id, &output);
            info!(phase = %phase.id, index, chars = output.len(), "phase completed");

            let flow = protocol.complete_phase(phase, &output).await?;
            summary.outputs.push((phase.id.clone(), output));
            if flow == Flow::Cancelled {
                return Ok(summary);
            }
        }

        if protocol.finish().await? == Flow::Continue {
            summary.outcome = RunOutcome::Completed;
            info!(
                phases = summary.phases_completed(),
                degraded = summary.degraded_phases,
                "run complete"
            );
        }
        Ok(summary)
    }

    fn record_message(&self, run_id: &RunId, phase_id: &str, content: &str) {
        if let Err(e) = self.store.record_message(run_id, phase_id, content, Utc::now()) {
            error!(run_id = %run_id, phase = phase_id, error = %e, "failed to record phase output");
        }
    }
}
