pub mod backend;
pub mod errors;
pub mod events;
pub mod ids;
pub mod messages;
pub mod phase;

pub use backend::{BackendId, CompletionBackend};
pub use errors::BackendError;
pub use events::RunEvent;
pub use ids::RunId;
pub use messages::{ConversationHistory, ConversationTurn, HistoryError, Role};
pub use phase::{PhaseSetError, PhaseSpec};
