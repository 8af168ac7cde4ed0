use rusqlite::{params, OptionalExtension};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{DrsError, Result};
use crate::types::{Course, Module, Topic};
use crate::Drs;

impl Drs {
    /// Insert a new course, assigning `course_number` atomically from the
    /// persisted counter (§3 "Unique course_number").
    #[instrument(skip(self, title, description), fields(title))]
    pub fn create_course(
        &self,
        title: &str,
        description: &str,
        language: &str,
        country: &str,
        owner_id: &str,
    ) -> Result<Course> {
        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let course_id = Uuid::now_v7().to_string();

        let tx = db.unchecked_transaction()?;
        let course_number: i64 = tx.query_row(
            "UPDATE course_number_counter SET next_number = next_number + 1
             WHERE id = 1 RETURNING next_number - 1",
            [],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO courses
             (course_id, course_number, title, description, language, country, owner_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![course_id, course_number, title, description, language, country, owner_id, now],
        )?;
        tx.commit()?;

        Ok(Course {
            course_id,
            course_number,
            title: title.to_string(),
            description: description.to_string(),
            language: language.to_string(),
            country: country.to_string(),
            owner_id: owner_id.to_string(),
            created_at: now.clone(),
            updated_at: now,
        })
    }

    #[instrument(skip(self))]
    pub fn get_course(&self, course_id: &str) -> Result<Option<Course>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT course_id, course_number, title, description, language, country,
                    owner_id, created_at, updated_at
             FROM courses WHERE course_id = ?1",
            params![course_id],
            row_to_course,
        )
        .optional()
        .map_err(DrsError::Database)
    }

    /// Looks up a course by its numeric, human-facing `course_number` rather
    /// than its opaque id (§6.2 `GET /courses/{id_or_number}`).
    #[instrument(skip(self))]
    pub fn get_course_by_number(&self, course_number: i64) -> Result<Option<Course>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT course_id, course_number, title, description, language, country,
                    owner_id, created_at, updated_at
             FROM courses WHERE course_number = ?1",
            params![course_number],
            row_to_course,
        )
        .optional()
        .map_err(DrsError::Database)
    }

    #[instrument(skip(self))]
    pub fn list_courses(&self, limit: usize) -> Result<Vec<Course>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT course_id, course_number, title, description, language, country,
                    owner_id, created_at, updated_at
             FROM courses ORDER BY course_number DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], row_to_course)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Insert a module. Callers are responsible for assigning a gapless
    /// `week` sequence across a course's ingest (§3 "gapless sequence 1..N").
    #[instrument(skip(self, title, description, objectives))]
    pub fn create_module(
        &self,
        course_id: &str,
        week: i64,
        title: &str,
        description: &str,
        objectives: &[String],
    ) -> Result<Module> {
        let db = self.db.lock().unwrap();
        let module_id = Uuid::now_v7().to_string();
        let objectives_json = serde_json::to_string(objectives)
            .map_err(|e| DrsError::InvalidInput(e.to_string()))?;
        db.execute(
            "INSERT INTO modules (module_id, course_id, week, title, description, objectives)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![module_id, course_id, week, title, description, objectives_json],
        )?;
        Ok(Module {
            module_id,
            course_id: course_id.to_string(),
            week,
            title: title.to_string(),
            description: description.to_string(),
            objectives: objectives.to_vec(),
        })
    }

    #[instrument(skip(self))]
    pub fn list_modules(&self, course_id: &str) -> Result<Vec<Module>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT module_id, course_id, week, title, description, objectives
             FROM modules WHERE course_id = ?1 ORDER BY week ASC",
        )?;
        let rows = stmt.query_map(params![course_id], row_to_module)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Insert a topic. Callers assign a gapless `order_index` per module.
    #[instrument(skip(self, title, content))]
    pub fn create_topic(
        &self,
        module_id: &str,
        order_index: i64,
        title: &str,
        content: &str,
        estimated_duration_minutes: Option<i64>,
    ) -> Result<Topic> {
        let db = self.db.lock().unwrap();
        let topic_id = Uuid::now_v7().to_string();
        db.execute(
            "INSERT INTO topics (topic_id, module_id, order_index, title, content, estimated_duration_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![topic_id, module_id, order_index, title, content, estimated_duration_minutes],
        )?;
        Ok(Topic {
            topic_id,
            module_id: module_id.to_string(),
            order_index,
            title: title.to_string(),
            content: content.to_string(),
            estimated_duration_minutes,
        })
    }

    #[instrument(skip(self))]
    pub fn list_topics(&self, module_id: &str) -> Result<Vec<Topic>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT topic_id, module_id, order_index, title, content, estimated_duration_minutes
             FROM topics WHERE module_id = ?1 ORDER BY order_index ASC",
        )?;
        let rows = stmt.query_map(params![module_id], row_to_topic)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Admin-only cascading delete (§3 "cascading delete only on explicit
    /// admin action"): removes the course's topics, modules, chunks, and the
    /// course row itself. Sessions/messages merely lose their
    /// `current_course_id`/`course_id` reference and are left intact.
    #[instrument(skip(self))]
    pub fn delete_course_cascade(&self, course_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let tx = db.unchecked_transaction()?;
        tx.execute(
            "DELETE FROM topics WHERE module_id IN (SELECT module_id FROM modules WHERE course_id = ?1)",
            params![course_id],
        )?;
        tx.execute("DELETE FROM modules WHERE course_id = ?1", params![course_id])?;
        tx.execute(
            "DELETE FROM document_chunks_fts WHERE rowid IN (SELECT rowid FROM document_chunks WHERE course_id = ?1)",
            params![course_id],
        )?;
        tx.execute("DELETE FROM document_chunks WHERE course_id = ?1", params![course_id])?;
        let changed = tx.execute("DELETE FROM courses WHERE course_id = ?1", params![course_id])?;
        tx.commit()?;
        if changed == 0 {
            return Err(DrsError::NotFound(format!("course {course_id}")));
        }
        Ok(())
    }
}

fn row_to_course(row: &rusqlite::Row<'_>) -> rusqlite::Result<Course> {
    Ok(Course {
        course_id: row.get(0)?,
        course_number: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        language: row.get(4)?,
        country: row.get(5)?,
        owner_id: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn row_to_module(row: &rusqlite::Row<'_>) -> rusqlite::Result<Module> {
    let objectives_json: String = row.get(5)?;
    Ok(Module {
        module_id: row.get(0)?,
        course_id: row.get(1)?,
        week: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        objectives: serde_json::from_str(&objectives_json).unwrap_or_default(),
    })
}

fn row_to_topic(row: &rusqlite::Row<'_>) -> rusqlite::Result<Topic> {
    Ok(Topic {
        topic_id: row.get(0)?,
        module_id: row.get(1)?,
        order_index: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        estimated_duration_minutes: row.get(5)?,
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
    fn course_numbers_are_monotonic_and_unique() {
        let drs = drs();
        let a = drs.create_course("A", "", "en", "US", "owner").unwrap();
        let b = drs.create_course("B", "", "en", "US", "owner").unwrap();
        assert_eq!(b.course_number, a.course_number + 1);
    }

    #[test]
    fn get_course_by_number_finds_the_matching_course() {
        let drs = drs();
        drs.create_course("A", "", "en", "US", "owner").unwrap();
        let b = drs.create_course("B", "", "en", "US", "owner").unwrap();

        let found = drs.get_course_by_number(b.course_number).unwrap().unwrap();
        assert_eq!(found.course_id, b.course_id);
    }

    #[test]
    fn get_course_by_number_is_none_for_unknown_number() {
        let drs = drs();
        assert!(drs.get_course_by_number(999).unwrap().is_none());
    }

    #[test]
    fn modules_and_topics_round_trip() {
        let drs = drs();
        let course = drs.create_course("A", "", "en", "US", "owner").unwrap();
        let module = drs
            .create_module(&course.course_id, 1, "Week 1", "", &["obj1".into()])
            .unwrap();
        drs.create_topic(&module.module_id, 1, "Intro", "content", None)
            .unwrap();
        let topics = drs.list_topics(&module.module_id).unwrap();
        assert_eq!(topics.len(), 1);
        assert_eq!(topics[0].order_index, 1);
    }

    #[test]
    fn delete_course_cascade_removes_descendants() {
        let drs = drs();
        let course = drs.create_course("A", "", "en", "US", "owner").unwrap();
        let module = drs
            .create_module(&course.course_id, 1, "Week 1", "", &[])
            .unwrap();
        drs.create_topic(&module.module_id, 1, "Intro", "content", None)
            .unwrap();

        drs.delete_course_cascade(&course.course_id).unwrap();

        assert!(drs.get_course(&course.course_id).unwrap().is_none());
        assert!(drs.list_modules(&course.course_id).unwrap().is_empty());
    }
}
