use triad_core::phase::PhaseSpec;

/// Prepended to every phase instruction of a dormant run.
pub const DORMANT_MODIFIER: &str =
    "[MODE: DORMANT_AWAKENING] Increase density, decrease verbosity.\n\n";

/// The fixed pipeline: logic, resonance, synthesis, canon.
pub fn default_phases() -> Vec<PhaseSpec> {
    vec![
        PhaseSpec::new(
            "logic",
            "Logic",
            "Analyze the following problem with strict logical rigor. State the \
             assumptions, decompose it into sub-problems and reason through each \
             one step by step.\n\nProblem: {problem}",
        ),
        PhaseSpec::new(
            "resonance",
            "Resonance",
            "Revisit the analysis above from the human side. Identify the intuitions, \
             tensions and values it leaves out, and where the strict reasoning \
             conflicts with lived experience.",
        ),
        PhaseSpec::new(
            "synthesis",
            "Synthesis",
            "Integrate the logical analysis and the resonance critique above into a \
             single coherent position. Resolve the conflicts explicitly rather than \
             averaging them.",
        ),
        PhaseSpec::new(
            "canon",
            "Canon",
            "Distill everything above into a final canonical answer: a short verdict \
             followed by the few principles that justify it.",
        ),
    ]
}

/// Instruction text sent as the requester turn for `phase`.
pub fn render_instruction(phase: &PhaseSpec, problem: &str, dormant: bool) -> String {
    let body = phase.render(problem);
    if dormant {
        format!("{DORMANT_MODIFIER}{body}")
    } else {
        body
    }
}
