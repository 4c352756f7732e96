use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use triad_core::ids::RunId;

use crate::error::StoreError;
use crate::messages::MessageRow;
use crate::sessions::SessionRow;
use crate::store::{RunArchive, RunStore};

#[derive(Default)]
struct Inner {
    sessions: Vec<SessionRow>,
    messages: Vec<MessageRow>,
}

/// Process-local store for ephemeral runs and tests. Same contract as
/// the SQLite store, including rejecting messages for unknown runs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn message_count(&self) -> usize {
        self.inner.lock().messages.len()
    }
}

impl RunStore for MemoryStore {
    fn record_session(
        &self,
        run_id: &RunId,
        problem: &str,
        dormant: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.sessions.iter().any(|s| &s.id == run_id) {
            return Err(StoreError::Database(format!("session {run_id} already exists")));
        }
        inner.sessions.push(SessionRow {
            id: run_id.clone(),
            problem: problem.to_string(),
            dormant,
            timestamp,
        });
        Ok(())
    }

    fn record_message(
        &self,
        run_id: &RunId,
        phase_id: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.sessions.iter().any(|s| &s.id == run_id) {
            return Err(StoreError::NotFound(format!("session {run_id}")));
        }
        let id = inner.messages.len() as i64 + 1;
        inner.messages.push(MessageRow {
            id,
            session_id: run_id.clone(),
            phase_id: phase_id.to_string(),
            content: content.to_string(),
            timestamp,
        });
        Ok(())
    }

    fn last_activity_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self.inner.lock().sessions.iter().map(|s| s.timestamp).max())
    }
}

impl RunArchive for MemoryStore {
    fn recent_sessions(&self, limit: u32) -> Result<Vec<SessionRow>, StoreError> {
        let mut sessions = self.inner.lock().sessions.clone();
        sessions.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        sessions.truncate(limit as usize);
        Ok(sessions)
    }

    fn session_messages(&self, run_id: &RunId) -> Result<Vec<MessageRow>, StoreError> {
        let inner = self.inner.lock();
        if !inner.sessions.iter().any(|s| &s.id == run_id) {
            return Err(StoreError::NotFound(format!("session {run_id}")));
        }
        Ok(inner
            .messages
            .iter()
            .filter(|m| &m.session_id == run_id)
            .cloned()
            .collect())
    }
}
