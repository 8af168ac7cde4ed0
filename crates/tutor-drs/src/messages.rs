use std::collections::HashMap;
use std::str::FromStr;

use rusqlite::params;
use tracing::instrument;

use crate::error::Result;
use crate::types::{Message, MessageRole, MessageType};
use crate::Drs;

impl Drs {
    /// Append a message. `(created_at, id)` is the total order within a
    /// session (§3); `id` is auto-increment so ties on `created_at` still
    /// sort deterministically.
    #[instrument(skip(self, content, metadata), fields(session_id, role = %role))]
    #[allow(clippy::too_many_arguments)]
    pub fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        role: MessageRole,
        content: &str,
        message_type: MessageType,
        course_id: Option<&str>,
        module_id: Option<&str>,
        topic_id: Option<&str>,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Message> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| crate::error::DrsError::InvalidInput(e.to_string()))?;

        db.execute(
            "INSERT INTO messages
             (session_id, user_id, role, content, message_type, course_id, module_id,
              topic_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                session_id,
                user_id,
                role.to_string(),
                content,
                message_type.to_string(),
                course_id,
                module_id,
                topic_id,
                metadata_json,
                now,
            ],
        )?;
        let id = db.last_insert_rowid();

        Ok(Message {
            id,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            message_type,
            course_id: course_id.map(str::to_string),
            module_id: module_id.map(str::to_string),
            topic_id: topic_id.map(str::to_string),
            metadata: metadata.clone(),
            created_at: now,
        })
    }

    /// Messages for a session, oldest first, for chat history (§4.7's
    /// `CHAT_HISTORY_TURNS` window is applied by the caller via `limit`).
    #[instrument(skip(self))]
    pub fn history_for_session(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, session_id, user_id, role, content, message_type, course_id,
                    module_id, topic_id, metadata, created_at
             FROM messages WHERE session_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![session_id, limit as i64], row_to_message)?;
        let mut messages: Vec<Message> = rows.filter_map(|r| r.ok()).collect();
        messages.reverse();
        Ok(messages)
    }

    /// Cascade-delete every message owned by a session (§3 "exclusively
    /// owns its messages").
    #[instrument(skip(self))]
    pub fn delete_messages_for_session(&self, session_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let changed = db.execute("DELETE FROM messages WHERE session_id = ?1", params![session_id])?;
        Ok(changed)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(3)?;
    let type_str: String = row.get(5)?;
    let metadata_json: String = row.get(9)?;
    Ok(Message {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        role: MessageRole::from_str(&role_str).unwrap_or(MessageRole::User),
        content: row.get(4)?,
        message_type: MessageType::from_str(&type_str).unwrap_or(MessageType::Text),
        course_id: row.get(6)?,
        module_id: row.get(7)?,
        topic_id: row.get(8)?,
        metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
        created_at: row.get(10)?,
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
    fn history_is_returned_in_insertion_order() {
        let drs = drs();
        let session = drs.create_session("user-1", None, None, None, None).unwrap();
        for i in 0..3 {
            drs.append_message(
                &session.session_id,
                "user-1",
                MessageRole::User,
                &format!("message {i}"),
                MessageType::Text,
                None,
                None,
                None,
                &HashMap::new(),
            )
            .unwrap();
        }
        let history = drs.history_for_session(&session.session_id, 10).unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "message 0");
        assert_eq!(history[2].content, "message 2");
    }

    #[test]
    fn delete_messages_for_session_removes_all() {
        let drs = drs();
        let session = drs.create_session("user-1", None, None, None, None).unwrap();
        drs.append_message(
            &session.session_id,
            "user-1",
            MessageRole::User,
            "hi",
            MessageType::Text,
            None,
            None,
            None,
            &HashMap::new(),
        )
        .unwrap();
        let removed = drs.delete_messages_for_session(&session.session_id).unwrap();
        assert_eq!(removed, 1);
        assert!(drs.history_for_session(&session.session_id, 10).unwrap().is_empty());
    }
}
