use serde::{Deserialize, Serialize};

use crate::ids::RunId;

/// Observer-facing events for one run. Strict ordering contract:
///
/// DormantNotice? → (PhaseStarted → PhaseCompleted)* → RunComplete
///
/// A run whose observer disconnects stops emitting; it never produces a
/// `PhaseStarted` without the matching `PhaseCompleted` unless the observer
/// is already gone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "dormant_notice")]
    DormantNotice { run_id: RunId },

    #[serde(rename = "phase_started")]
    PhaseStarted {
        run_id: RunId,
        phase_id: String,
        label: String,
    },

    #[serde(rename = "phase_completed")]
    PhaseCompleted {
        run_id: RunId,
        phase_id: String,
        label: String,
        output: String,
    },

    #[serde(rename = "run_complete")]
    RunComplete { run_id: RunId },
}

impl RunEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            Self::DormantNotice { run_id }
            | Self::PhaseStarted { run_id, .. }
            | Self::PhaseCompleted { run_id, .. }
            | Self::RunComplete { run_id } => run_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::DormantNotice { .. } => "dormant_notice",
            Self::PhaseStarted { .. } => "phase_started",
            Self::PhaseCompleted { .. } => "phase_completed",
            Self::RunComplete { .. } => "run_complete",
        }
    }
}
