use rusqlite::{params, OptionalExtension};
use tracing::instrument;

use crate::error::Result;
use crate::Drs;

impl Drs {
    /// Durable side of orchestrator checkpointing (§4.8): the hot cache copy
    /// is what the orchestrator reads on the happy path; this one is what a
    /// fresh process reads after a crash.
    #[instrument(skip(self, state_json))]
    pub fn save_checkpoint(&self, session_id: &str, state_json: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO orchestrator_checkpoints (session_id, state_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
            params![session_id, state_json, now],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn load_checkpoint(&self, session_id: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let state_json: Option<String> = db
            .query_row(
                "SELECT state_json FROM orchestrator_checkpoints WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(state_json)
    }

    #[instrument(skip(self))]
    pub fn delete_checkpoint(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM orchestrator_checkpoints WHERE session_id = ?1", params![session_id])?;
        Ok(())
    }
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
    fn saves_and_overwrites_checkpoint() {
        let drs = drs();
        drs.save_checkpoint("session-1", "{\"state\":\"teaching\"}").unwrap();
        assert_eq!(drs.load_checkpoint("session-1").unwrap().unwrap(), "{\"state\":\"teaching\"}");

        drs.save_checkpoint("session-1", "{\"state\":\"answering\"}").unwrap();
        assert_eq!(drs.load_checkpoint("session-1").unwrap().unwrap(), "{\"state\":\"answering\"}");
    }

    #[test]
    fn delete_checkpoint_clears_it() {
        let drs = drs();
        drs.save_checkpoint("session-1", "{}").unwrap();
        drs.delete_checkpoint("session-1").unwrap();
        assert!(drs.load_checkpoint("session-1").unwrap().is_none());
    }
}
