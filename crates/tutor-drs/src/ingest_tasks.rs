use std::str::FromStr;

use rusqlite::{params, OptionalExtension};
use tracing::instrument;

use crate::error::Result;
use crate::types::{IngestTaskRecord, IngestTaskState};
use crate::Drs;

impl Drs {
    /// Mirror a broker-issued task into the DRS for status polling
    /// (§6.2 `GET /tasks/{task_id}`); the broker remains the source of
    /// truth for delivery and visibility timeouts.
    #[instrument(skip(self))]
    pub fn record_task_seen(&self, task_id: &str, job_id: &str, priority: i64) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO ingest_tasks
             (task_id, job_id, priority, state, attempt_count, first_seen_at)
             VALUES (?1, ?2, ?3, ?4, 0, ?5)
             ON CONFLICT(task_id) DO NOTHING",
            params![task_id, job_id, priority, IngestTaskState::Pending.to_string(), now],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn update_task_state(
        &self,
        task_id: &str,
        state: IngestTaskState,
        attempt_count: i64,
        error_summary: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "UPDATE ingest_tasks
             SET state = ?1, attempt_count = ?2, error_summary = ?3, last_heartbeat_at = ?4
             WHERE task_id = ?5",
            params![state.to_string(), attempt_count, error_summary, now, task_id],
        )?;
        Ok(())
    }

    #[instrument(skip(self, progress_message))]
    pub fn update_task_progress(
        &self,
        task_id: &str,
        progress_percent: i64,
        progress_message: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "UPDATE ingest_tasks
             SET progress_percent = ?1, progress_message = ?2, last_heartbeat_at = ?3
             WHERE task_id = ?4",
            params![progress_percent, progress_message, now, task_id],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_task(&self, task_id: &str) -> Result<Option<IngestTaskRecord>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT task_id, job_id, priority, state, attempt_count, first_seen_at,
                    last_heartbeat_at, error_summary, progress_percent, progress_message
             FROM ingest_tasks WHERE task_id = ?1",
            params![task_id],
            row_to_task,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(crate::error::DrsError::Database(other)),
        })
    }

    /// External cancel API (§4.2): marks the task `cancel_requested`; the
    /// worker polls for this between pipeline phases.
    #[instrument(skip(self))]
    pub fn request_cancel(&self, task_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "UPDATE ingest_tasks SET state = ?1, last_heartbeat_at = ?2 WHERE task_id = ?3",
            params![IngestTaskState::CancelRequested.to_string(), now, task_id],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn is_cancel_requested(&self, task_id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let state_str: Option<String> = db
            .query_row("SELECT state FROM ingest_tasks WHERE task_id = ?1", params![task_id], |row| row.get(0))
            .optional()?;
        Ok(matches!(state_str.as_deref(), Some("cancel_requested")))
    }

    /// Dead-letter inspection, the natural counterpart to a job listing API
    /// for the broker's terminal-failure state (§4.1).
    #[instrument(skip(self))]
    pub fn list_dead_lettered_tasks(&self, limit: usize) -> Result<Vec<IngestTaskRecord>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT task_id, job_id, priority, state, attempt_count, first_seen_at,
                    last_heartbeat_at, error_summary, progress_percent, progress_message
             FROM ingest_tasks WHERE state = ?1
             ORDER BY first_seen_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(
            params![IngestTaskState::Failed.to_string(), limit as i64],
            row_to_task,
        )?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<IngestTaskRecord> {
    let state_str: String = row.get(3)?;
    Ok(IngestTaskRecord {
        task_id: row.get(0)?,
        job_id: row.get(1)?,
        priority: row.get(2)?,
        state: IngestTaskState::from_str(&state_str).unwrap_or(IngestTaskState::Pending),
        attempt_count: row.get(4)?,
        first_seen_at: row.get(5)?,
        last_heartbeat_at: row.get(6)?,
        error_summary: row.get(7)?,
        progress_percent: row.get(8)?,
        progress_message: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn drs() -> Drs {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        Drs::new(conn)
    }

    #[test]
    fn records_and_transitions_task_state() {
        let drs = drs();
        drs.record_task_seen("task-1", "job-1", 5).unwrap();
        drs.update_task_state("task-1", IngestTaskState::Running, 1, None).unwrap();
        let task = drs.get_task("task-1").unwrap().unwrap();
        assert_eq!(task.state, IngestTaskState::Running);
        assert_eq!(task.attempt_count, 1);
    }

    #[test]
    fn dead_letters_lists_failed_tasks_only() {
        let drs = drs();
        drs.record_task_seen("task-1", "job-1", 0).unwrap();
        drs.update_task_state("task-1", IngestTaskState::Failed, 3, Some("boom")).unwrap();
        drs.record_task_seen("task-2", "job-2", 0).unwrap();

        let dead = drs.list_dead_lettered_tasks(10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].task_id, "task-1");
    }
}
