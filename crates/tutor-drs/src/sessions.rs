use rusqlite::{params, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{DrsError, Result};
use crate::types::Session;
use crate::Drs;

impl Drs {
    /// Start a new session for a user, atomically ending any previous active
    /// session first (§3 "a user has at most one active session at a time").
    #[instrument(skip(self, client_ip, client_user_agent, client_device_class))]
    pub fn create_session(
        &self,
        user_id: &str,
        client_ip: Option<&str>,
        client_user_agent: Option<&str>,
        client_device_class: Option<&str>,
        expires_at: Option<&str>,
    ) -> Result<Session> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let session_id = Uuid::now_v7().to_string();

        let tx = db.unchecked_transaction()?;
        tx.execute(
            "UPDATE sessions SET is_active = 0, ended_at = ?1
             WHERE user_id = ?2 AND is_active = 1",
            params![now, user_id],
        )?;
        tx.execute(
            "INSERT INTO sessions
             (session_id, user_id, current_course_id, client_ip, client_user_agent,
              client_device_class, message_count, started_at, last_activity_at,
              expires_at, ended_at, is_active)
             VALUES (?1, ?2, NULL, ?3, ?4, ?5, 0, ?6, ?6, ?7, NULL, 1)",
            params![session_id, user_id, client_ip, client_user_agent, client_device_class, now, expires_at],
        )?;
        tx.commit()?;

        Ok(Session {
            session_id,
            user_id: user_id.to_string(),
            current_course_id: None,
            client_ip: client_ip.map(str::to_string),
            client_user_agent: client_user_agent.map(str::to_string),
            client_device_class: client_device_class.map(str::to_string),
            message_count: 0,
            started_at: now.clone(),
            last_activity_at: now,
            expires_at: expires_at.map(str::to_string),
            ended_at: None,
            is_active: true,
        })
    }

    #[instrument(skip(self))]
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT session_id, user_id, current_course_id, client_ip, client_user_agent,
                    client_device_class, message_count, started_at, last_activity_at,
                    expires_at, ended_at, is_active
             FROM sessions WHERE session_id = ?1",
            params![session_id],
            row_to_session,
        )
        .optional()
        .map_err(DrsError::Database)
    }

    /// The caller's one active session, if any (§3's "at most one active"
    /// invariant means this is always at most a single row).
    #[instrument(skip(self))]
    pub fn get_active_session_for_user(&self, user_id: &str) -> Result<Option<Session>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT session_id, user_id, current_course_id, client_ip, client_user_agent,
                    client_device_class, message_count, started_at, last_activity_at,
                    expires_at, ended_at, is_active
             FROM sessions WHERE user_id = ?1 AND is_active = 1",
            params![user_id],
            row_to_session,
        )
        .optional()
        .map_err(DrsError::Database)
    }

    #[instrument(skip(self))]
    pub fn set_current_course(&self, session_id: &str, course_id: Option<&str>) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let changed = db.execute(
            "UPDATE sessions SET current_course_id = ?1, last_activity_at = ?2 WHERE session_id = ?3",
            params![course_id, now, session_id],
        )?;
        if changed == 0 {
            return Err(DrsError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn touch_session(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let changed = db.execute(
            "UPDATE sessions SET last_activity_at = ?1, message_count = message_count + 1
             WHERE session_id = ?2",
            params![now, session_id],
        )?;
        if changed == 0 {
            return Err(DrsError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn end_session(&self, session_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let changed = db.execute(
            "UPDATE sessions SET is_active = 0, ended_at = ?1 WHERE session_id = ?2 AND is_active = 1",
            params![now, session_id],
        )?;
        if changed == 0 {
            return Err(DrsError::NotFound(format!("active session {session_id}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn list_sessions_for_user(&self, user_id: &str, limit: usize) -> Result<Vec<Session>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT session_id, user_id, current_course_id, client_ip, client_user_agent,
                    client_device_class, message_count, started_at, last_activity_at,
                    expires_at, ended_at, is_active
             FROM sessions WHERE user_id = ?1 ORDER BY started_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], row_to_session)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        session_id: row.get(0)?,
        user_id: row.get(1)?,
        current_course_id: row.get(2)?,
        client_ip: row.get(3)?,
        client_user_agent: row.get(4)?,
        client_device_class: row.get(5)?,
        message_count: row.get(6)?,
        started_at: row.get(7)?,
        last_activity_at: row.get(8)?,
        expires_at: row.get(9)?,
        ended_at: row.get(10)?,
        is_active: row.get::<_, i64>(11)? != 0,
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
    fn creating_session_ends_previous_active_one() {
        let drs = drs();
        let first = drs.create_session("user-1", None, None, None, None).unwrap();
        let second = drs.create_session("user-1", None, None, None, None).unwrap();

        let refreshed_first = drs.get_session(&first.session_id).unwrap().unwrap();
        assert!(!refreshed_first.is_active);
        assert!(refreshed_first.ended_at.is_some());

        let active = drs.get_active_session_for_user("user-1").unwrap().unwrap();
        assert_eq!(active.session_id, second.session_id);
    }

    #[test]
    fn end_session_is_idempotent_failure_on_already_ended() {
        let drs = drs();
        let session = drs.create_session("user-1", None, None, None, None).unwrap();
        drs.end_session(&session.session_id).unwrap();
        assert!(drs.end_session(&session.session_id).is_err());
    }

    #[test]
    fn set_current_course_persists_and_clears() {
        let drs = drs();
        let session = drs.create_session("user-1", None, None, None, None).unwrap();
        assert!(session.current_course_id.is_none());

        drs.set_current_course(&session.session_id, Some("course-1")).unwrap();
        let refreshed = drs.get_session(&session.session_id).unwrap().unwrap();
        assert_eq!(refreshed.current_course_id.as_deref(), Some("course-1"));

        drs.set_current_course(&session.session_id, None).unwrap();
        let cleared = drs.get_session(&session.session_id).unwrap().unwrap();
        assert!(cleared.current_course_id.is_none());
    }
}
