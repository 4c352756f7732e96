use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the run's problem text.
pub const PROBLEM_SLOT: &str = "{problem}";

/// One step of the fixed pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub id: String,
    pub label: String,
    pub template: String,
}

impl PhaseSpec {
    pub fn new(id: impl Into<String>, label: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            template: template.into(),
        }
    }

    pub fn has_slot(&self) -> bool {
        self.template.contains(PROBLEM_SLOT)
    }

    /// Render the instruction text. Only a template that declares the slot
    /// sees the problem; every other template is returned verbatim.
    pub fn render(&self, problem: &str) -> String {
        if self.has_slot() {
            self.template.replacen(PROBLEM_SLOT, problem, 1)
        } else {
            self.template.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PhaseSetError {
    #[error("phase set is empty")]
    Empty,
    #[error("duplicate phase id: {0}")]
    DuplicateId(String),
    #[error("phase {0} declares the problem slot more than once")]
    RepeatedSlot(String),
    #[error("expected exactly one phase with the problem slot, found {0}")]
    SlotCount(usize),
}

/// Check the structural rules of a phase set: non-empty, unique ids, and
/// exactly one template carrying a single problem slot.
pub fn validate_phases(phases: &[PhaseSpec]) -> Result<(), PhaseSetError> {
    if phases.is_empty() {
        return Err(PhaseSetError::Empty);
    }

    let mut seen = HashSet::new();
    let mut slotted = 0;
    for phase in phases {
        if !seen.insert(phase.id.as_str()) {
            return Err(PhaseSetError::DuplicateId(phase.id.clone()));
        }
        match phase.template.matches(PROBLEM_SLOT).count() {
            0 => {}
            1 => slotted += 1,
            _ => return Err(PhaseSetError::RepeatedSlot(phase.id.clone())),
        }
    }

    if slotted != 1 {
        return Err(PhaseSetError::SlotCount(slotted));
    }
    Ok(())
}
