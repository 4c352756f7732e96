pub mod activity;
pub mod error;
pub mod phases;
pub mod protocol;
pub mod runner;

pub use activity::ActivityGate;
pub use error::EngineError;
pub use protocol::{Flow, ProtocolError, RunProtocol, RunState};
pub use runner::{PipelineRun, PipelineRunner, RunOutcome, RunSummary};
