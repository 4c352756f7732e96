use chrono::{DateTime, Utc};

use triad_core::ids::RunId;

use crate::database::Database;
use crate::error::StoreError;
use crate::messages::{MessageRepo, MessageRow};
use crate::sessions::{SessionRepo, SessionRow};

/// Write side used by runs. Each call is individually atomic.
pub trait RunStore: Send + Sync {
    fn record_session(
        &self,
        run_id: &RunId,
        problem: &str,
        dormant: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    fn record_message(
        &self,
        run_id: &RunId,
        phase_id: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Timestamp of the most recently recorded session.
    fn last_activity_time(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
}

/// Read side for browsing past runs. Never consulted by a run in progress.
pub trait RunArchive: Send + Sync {
    fn recent_sessions(&self, limit: u32) -> Result<Vec<SessionRow>, StoreError>;

    fn session_messages(&self, run_id: &RunId) -> Result<Vec<MessageRow>, StoreError>;
}

/// SQLite-backed store.
pub struct SqliteStore {
    sessions: SessionRepo,
    messages: MessageRepo,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self {
            sessions: SessionRepo::new(db.clone()),
            messages: MessageRepo::new(db),
        }
    }
}

impl RunStore for SqliteStore {
    fn record_session(
        &self,
        run_id: &RunId,
        problem: &str,
        dormant: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.sessions.record(run_id, problem, dormant, timestamp)
    }

    fn record_message(
        &self,
        run_id: &RunId,
        phase_id: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.messages
            .append(run_id, phase_id, content, timestamp)
            .map(|_| ())
    }

    fn last_activity_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.sessions.last_activity_time()
    }
}

impl RunArchive for SqliteStore {
    fn recent_sessions(&self, limit: u32) -> Result<Vec<SessionRow>, StoreError> {
        self.sessions.list_recent(limit)
    }

    fn session_messages(&self, run_id: &RunId) -> Result<Vec<MessageRow>, StoreError> {
        // Distinguish an unknown run from one with no messages yet.
        self.sessions.get(run_id)?;
        self.messages.list_for_session(run_id)
    }
}
