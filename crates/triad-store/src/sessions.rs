use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use triad_core::ids::RunId;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// One recorded run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SessionRow {
    pub id: RunId,
    pub problem: String,
    pub dormant: bool,
    pub timestamp: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "SELECT id, problem, dormant, timestamp FROM sessions";

pub struct SessionRepo {
    db: Database,
}

impl SessionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, problem), fields(run_id = %id, dormant))]
    pub fn record(
        &self,
        id: &RunId,
        problem: &str,
        dormant: bool,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, problem, dormant, timestamp) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![
                    id.as_str(),
                    problem,
                    dormant,
                    row_helpers::format_timestamp(&timestamp),
                ],
            )?;
            Ok(())
        })
    }

    #[instrument(skip(self), fields(run_id = %id))]
    pub fn get(&self, id: &RunId) -> Result<SessionRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} WHERE id = ?1"))?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_session(row),
                None => Err(StoreError::NotFound(format!("session {id}"))),
            }
        })
    }

    /// Most recent sessions first.
    #[instrument(skip(self))]
    pub fn list_recent(&self, limit: u32) -> Result<Vec<SessionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} ORDER BY timestamp DESC, id DESC LIMIT ?1"
            ))?;
            let mut rows = stmt.query([limit])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_session(row)?);
            }
            Ok(results)
        })
    }

    /// Timestamp of the newest recorded session, if any.
    pub fn last_activity_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.db.with_conn(|conn| {
            let raw: Option<String> =
                conn.query_row("SELECT MAX(timestamp) FROM sessions", [], |row| row.get(0))?;
            raw.map(|r| row_helpers::parse_timestamp(&r, "sessions", "timestamp"))
                .transpose()
        })
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<SessionRow, StoreError> {
    let timestamp: String = row_helpers::get(row, 3, "sessions", "timestamp")?;

    Ok(SessionRow {
        id: RunId::from_raw(row_helpers::get::<String>(row, 0, "sessions", "id")?),
        problem: row_helpers::get(row, 1, "sessions", "problem")?,
        dormant: row_helpers::get(row, 2, "sessions", "dormant")?,
        timestamp: row_helpers::parse_timestamp(&timestamp, "sessions", "timestamp")?,
    })
}
