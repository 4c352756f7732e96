use triad_core::messages::HistoryError;
use triad_core::phase::PhaseSetError;
use triad_store::StoreError;

use crate::protocol::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid phase set: {0}")]
    PhaseSet(#[from] PhaseSetError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
