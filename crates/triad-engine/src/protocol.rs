use std::fmt;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use triad_core::events::RunEvent;
use triad_core::ids::RunId;
use triad_core::phase::PhaseSpec;

/// Lifecycle of one observed run.
///
/// NotStarted → (DormantAnnounced)? → PhasePending(0) → PhaseRunning(0) →
/// PhaseDone(0) → PhasePending(1) → … → Complete. Cancelled may be entered
/// from any non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    DormantAnnounced,
    PhasePending(usize),
    PhaseRunning(usize),
    PhaseDone(usize),
    Complete,
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Cancelled)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::DormantAnnounced => write!(f, "dormant_announced"),
            Self::PhasePending(i) => write!(f, "phase_pending({i})"),
            Self::PhaseRunning(i) => write!(f, "phase_running({i})"),
            Self::PhaseDone(i) => write!(f, "phase_done({i})"),
            Self::Complete => write!(f, "complete"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("cannot {action} from state {from}")]
    IllegalTransition { from: RunState, action: &'static str },
}

/// Whether the run should keep going after a protocol step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Cancelled,
}

/// Turns phase transitions into ordered [`RunEvent`]s for one observer.
///
/// The observer is gone once its receiver is dropped or `cancel` fires.
/// That is checked before a phase starts and before the final event; an
/// event that cannot be delivered also cancels the run. A phase already
/// running when `cancel` fires still reports its `PhaseCompleted` if the
/// receiver is open. No later `PhaseStarted` or `RunComplete` follows.
pub struct RunProtocol {
    run_id: RunId,
    phase_count: usize,
    state: RunState,
    sink: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
}

impl RunProtocol {
    pub fn new(
        run_id: RunId,
        phase_count: usize,
        sink: mpsc::Sender<RunEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id,
            phase_count,
            state: RunState::NotStarted,
            sink,
            cancel,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn observer_gone(&self) -> bool {
        self.cancel.is_cancelled() || self.sink.is_closed()
    }

    /// Announce dormant mode if set, then make phase 0 pending.
    pub async fn open(&mut self, dormant: bool) -> Result<Flow, ProtocolError> {
        self.require(self.state == RunState::NotStarted, "open run")?;
        if self.observer_gone() {
            return Ok(self.cancelled());
        }

        if dormant {
            let event = RunEvent::DormantNotice {
                run_id: self.run_id.clone(),
            };
            if self.deliver(event).await == Flow::Cancelled {
                return Ok(Flow::Cancelled);
            }
            self.state = RunState::DormantAnnounced;
        }

        self.state = RunState::PhasePending(0);
        Ok(Flow::Continue)
    }

    /// Emit `PhaseStarted` for the next phase unless the observer is gone.
    pub async fn start_phase(&mut self, phase: &PhaseSpec) -> Result<Flow, ProtocolError> {
        let index = match self.state {
            RunState::PhasePending(i) => i,
            RunState::PhaseDone(i) if i + 1 < self.phase_count => i + 1,
            _ => return Err(self.illegal("start phase")),
        };
        self.state = RunState::PhasePending(index);

        if self.observer_gone() {
            return Ok(self.cancelled());
        }

        let event = RunEvent::PhaseStarted {
            run_id: self.run_id.clone(),
            phase_id: phase.id.clone(),
            label: phase.label.clone(),
        };
        if self.deliver(event).await == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }
        self.state = RunState::PhaseRunning(index);
        Ok(Flow::Continue)
    }

    /// Emit `PhaseCompleted` for the running phase.
    pub async fn complete_phase(
        &mut self,
        phase: &PhaseSpec,
        output: &str,
    ) -> Result<Flow, ProtocolError> {
        let RunState::PhaseRunning(index) = self.state else {
            return Err(self.illegal("complete phase"));
        };

        let event = RunEvent::PhaseCompleted {
            run_id: self.run_id.clone(),
            phase_id: phase.id.clone(),
            label: phase.label.clone(),
            output: output.to_string(),
        };
        if self.deliver(event).await == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }
        self.state = RunState::PhaseDone(index);
        Ok(Flow::Continue)
    }

    /// Emit `RunComplete` once the last phase is done.
    pub async fn finish(&mut self) -> Result<Flow, ProtocolError> {
        let last_done = matches!(self.state, RunState::PhaseDone(i) if i + 1 == self.phase_count);
        self.require(last_done, "finish run")?;

        if self.observer_gone() {
            return Ok(self.cancelled());
        }

        let event = RunEvent::RunComplete {
            run_id: self.run_id.clone(),
        };
        if self.deliver(event).await == Flow::Cancelled {
            return Ok(Flow::Cancelled);
        }
        self.state = RunState::Complete;
        Ok(Flow::Continue)
    }

    async fn deliver(&mut self, event: RunEvent) -> Flow {
        let kind = event.event_type();
        match self.sink.send(event).await {
            Ok(()) => {
                debug!(run_id = %self.run_id, event = kind, "event delivered");
                Flow::Continue
            }
            Err(_) => self.cancelled(),
        }
    }

    fn cancelled(&mut self) -> Flow {
        info!(run_id = %self.run_id, state = %self.state, "observer disconnected, cancelling run");
        self.state = RunState::Cancelled;
        Flow::Cancelled
    }

    fn require(&self, ok: bool, action: &'static str) -> Result<(), ProtocolError> {
        if ok {
            Ok(())
        } else {
            Err(self.illegal(action))
        }
    }

    fn illegal(&self, action: &'static str) -> ProtocolError {
        ProtocolError::IllegalTransition {
            from: self.state,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases() -> Vec<PhaseSpec> {
        vec![
            PhaseSpec::new("a", "A", "first {problem}"),
            PhaseSpec::new("b", "B", "second"),
        ]
    }

    fn protocol(capacity: usize) -> (RunProtocol, mpsc::Receiver<RunEvent>, CancellationToken) {
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        let protocol = RunProtocol::new(RunId::from_raw("run_t"), 2, tx, cancel.clone());
        (protocol, rx, cancel)
    }

    fn drain(rx: &mut mpsc::Receiver<RunEvent>) -> Vec<&'static str> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.event_type());
        }
        kinds
    }

    #[tokio::test]
    async fn full_sequence_with_dormant_notice() {
        let (mut p, mut rx, _cancel) = protocol(16);
        let phases = phases();

        assert_eq!(p.open(true).await.unwrap(), Flow::Continue);
        for phase in &phases {
            assert_eq!(p.start_phase(phase).await.unwrap(), Flow::Continue);
            assert_eq!(p.complete_phase(phase, "out").await.unwrap(), Flow::Continue);
        }
        assert_eq!(p.finish().await.unwrap(), Flow::Continue);
        assert_eq!(p.state(), RunState::Complete);

        assert_eq!(
            drain(&mut rx),
            vec![
                "dormant_notice",
                "phase_started",
                "phase_completed",
                "phase_started",
                "phase_completed",
                "run_complete"
            ]
        );
    }

    #[tokio::test]
    async fn awake_run_has_no_notice() {
        let (mut p, mut rx, _cancel) = protocol(16);
        p.open(false).await.unwrap();
        assert_eq!(p.state(), RunState::PhasePending(0));
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn states_track_transitions() {
        let (mut p, _rx, _cancel) = protocol(16);
        let phases = phases();
        assert_eq!(p.state(), RunState::NotStarted);
        p.open(false).await.unwrap();
        p.start_phase(&phases[0]).await.unwrap();
        assert_eq!(p.state(), RunState::PhaseRunning(0));
        p.complete_phase(&phases[0], "x").await.unwrap();
        assert_eq!(p.state(), RunState::PhaseDone(0));
        p.start_phase(&phases[1]).await.unwrap();
        assert_eq!(p.state(), RunState::PhaseRunning(1));
    }

    #[tokio::test]
    async fn illegal_transitions_rejected() {
        let (mut p, _rx, _cancel) = protocol(16);
        let phases = phases();

        let err = p.complete_phase(&phases[0], "x").await.unwrap_err();
        assert_eq!(
            err,
            ProtocolError::IllegalTransition {
                from: RunState::NotStarted,
                action: "complete phase"
            }
        );
        assert!(p.finish().await.is_err());

        p.open(false).await.unwrap();
        assert!(p.open(false).await.is_err());
        p.start_phase(&phases[0]).await.unwrap();
        assert!(p.start_phase(&phases[1]).await.is_err());
        assert!(p.finish().await.is_err());
    }

    #[tokio::test]
    async fn cannot_start_past_last_phase() {
        let (mut p, _rx, _cancel) = protocol(16);
        let phases = phases();
        p.open(false).await.unwrap();
        for phase in &phases {
            p.start_phase(phase).await.unwrap();
            p.complete_phase(phase, "x").await.unwrap();
        }
        assert!(p.start_phase(&phases[0]).await.is_err());
    }

    #[tokio::test]
    async fn cancel_token_stops_next_phase() {
        let (mut p, mut rx, cancel) = protocol(16);
        let phases = phases();
        p.open(false).await.unwrap();
        p.start_phase(&phases[0]).await.unwrap();
        p.complete_phase(&phases[0], "x").await.unwrap();

        cancel.cancel();
        assert_eq!(p.start_phase(&phases[1]).await.unwrap(), Flow::Cancelled);
        assert_eq!(p.state(), RunState::Cancelled);
        assert_eq!(drain(&mut rx), vec!["phase_started", "phase_completed"]);
    }

    #[tokio::test]
    async fn dropped_receiver_cancels_before_any_event() {
        let (mut p, rx, _cancel) = protocol(16);
        drop(rx);
        assert!(p.observer_gone());
        assert_eq!(p.open(true).await.unwrap(), Flow::Cancelled);
        assert!(p.state().is_terminal());
    }

    #[tokio::test]
    async fn in_flight_phase_completion_still_delivered_after_cancel() {
        let (mut p, mut rx, cancel) = protocol(16);
        let phases = phases();
        p.open(false).await.unwrap();
        p.start_phase(&phases[0]).await.unwrap();
        cancel.cancel();
        assert_eq!(p.complete_phase(&phases[0], "x").await.unwrap(), Flow::Continue);
        assert_eq!(p.start_phase(&phases[1]).await.unwrap(), Flow::Cancelled);
        assert_eq!(drain(&mut rx), vec!["phase_started", "phase_completed"]);
    }

    #[tokio::test]
    async fn cancelled_before_finish_sends_no_completion() {
        let (mut p, mut rx, cancel) = protocol(16);
        let phases = phases();
        p.open(false).await.unwrap();
        for phase in &phases {
            p.start_phase(phase).await.unwrap();
            p.complete_phase(phase, "x").await.unwrap();
        }
        cancel.cancel();
        assert_eq!(p.finish().await.unwrap(), Flow::Cancelled);
        assert!(!drain(&mut rx).contains(&"run_complete"));
    }
}
