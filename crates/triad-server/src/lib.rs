pub mod event_bridge;
pub mod handlers;
pub mod orchestrator;
pub mod server;

pub use orchestrator::{EngineOrchestrator, RunOrchestrator, RunSubmission, SubmitError};
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
