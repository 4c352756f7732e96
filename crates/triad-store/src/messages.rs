use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use triad_core::ids::RunId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// One phase output belonging to a recorded run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageRow {
    pub id: i64,
    pub session_id: RunId,
    pub phase_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

pub struct MessageRepo {
    db: Database,
}

impl MessageRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Append a phase output. Returns the new row id.
    #[instrument(skip(self, content), fields(run_id = %session_id, phase_id))]
    pub fn append(
        &self,
        session_id: &RunId,
        phase_id: &str,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (session_id, phase_id, content, timestamp) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    session_id.as_str(),
                    phase_id,
                    content,
                    row_helpers::format_timestamp(&timestamp),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// All messages for a session in insertion order.
    #[instrument(skip(self), fields(run_id = %session_id))]
    pub fn list_for_session(&self, session_id: &RunId) -> Result<Vec<MessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, phase_id, content, timestamp
                 FROM messages WHERE session_id = ?1 ORDER BY id ASC",
            )?;
            let mut rows = stmt.query([session_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<MessageRow, StoreError> {
    let timestamp: String = row_helpers::get(row, 4, "messages", "timestamp")?;

    Ok(MessageRow {
        id: row_helpers::get(row, 0, "messages", "id")?,
        session_id: RunId::from_raw(row_helpers::get::<String>(row, 1, "messages", "session_id")?),
        phase_id: row_helpers::get(row, 2, "messages", "phase_id")?,
        content: row_helpers::get(row, 3, "messages", "content")?,
        timestamp: row_helpers::parse_timestamp(&timestamp, "messages", "timestamp")?,
    })
}
