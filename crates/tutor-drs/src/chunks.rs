use rusqlite::params;
use tracing::instrument;

use crate::error::Result;
use crate::types::DocumentChunk;
use crate::Drs;

impl Drs {
    /// Upsert a chunk and sync the FTS5 index. Re-ingesting the same
    /// document with the same `chunk_id` overwrites in place, which is what
    /// keeps re-ingest idempotent (testable property 3).
    #[instrument(skip(self, chunk), fields(chunk_id = %chunk.chunk_id))]
    pub fn upsert_chunk(&self, chunk: &DocumentChunk) -> Result<()> {
        let db = self.db.lock().unwrap();
        let existing_rowid: Option<i64> = db
            .query_row(
                "SELECT rowid FROM document_chunks WHERE chunk_id = ?1",
                params![chunk.chunk_id],
                |row| row.get(0),
            )
            .ok();

        if let Some(rowid) = existing_rowid {
            db.execute(
                "INSERT INTO document_chunks_fts(document_chunks_fts, rowid, text)
                 VALUES('delete', ?1, (SELECT text FROM document_chunks WHERE rowid = ?1))",
                params![rowid],
            )?;
            db.execute(
                "UPDATE document_chunks SET document_id = ?2, course_id = ?3, module_id = ?4,
                    topic_id = ?5, page = ?6, char_start = ?7, char_end = ?8, text = ?9, language = ?10
                 WHERE rowid = ?1",
                params![
                    rowid,
                    chunk.document_id,
                    chunk.course_id,
                    chunk.module_id,
                    chunk.topic_id,
                    chunk.page,
                    chunk.char_start,
                    chunk.char_end,
                    chunk.text,
                    chunk.language,
                ],
            )?;
            db.execute(
                "INSERT INTO document_chunks_fts(rowid, text) VALUES(?1, ?2)",
                params![rowid, chunk.text],
            )?;
        } else {
            db.execute(
                "INSERT INTO document_chunks
                 (chunk_id, document_id, course_id, module_id, topic_id, page,
                  char_start, char_end, text, language)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    chunk.chunk_id,
                    chunk.document_id,
                    chunk.course_id,
                    chunk.module_id,
                    chunk.topic_id,
                    chunk.page,
                    chunk.char_start,
                    chunk.char_end,
                    chunk.text,
                    chunk.language,
                ],
            )?;
            let rowid = db.last_insert_rowid();
            db.execute(
                "INSERT INTO document_chunks_fts(rowid, text) VALUES(?1, ?2)",
                params![rowid, chunk.text],
            )?;
        }
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn get_chunk(&self, chunk_id: &str) -> Result<Option<DocumentChunk>> {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT chunk_id, document_id, course_id, module_id, topic_id, page,
                    char_start, char_end, text, language
             FROM document_chunks WHERE chunk_id = ?1",
            params![chunk_id],
            row_to_chunk,
        )
        .map(Some)
        .or_else(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Ok(None),
            other => Err(crate::error::DrsError::Database(other)),
        })
    }

    /// BM25 lexical search over chunk text, optionally scoped to a course
    /// (component F's sparse leg).
    #[instrument(skip(self, query))]
    pub fn search_chunks(
        &self,
        query: &str,
        course_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        let db = self.db.lock().unwrap();
        let chunks = if let Some(course_id) = course_id {
            let mut stmt = db.prepare(
                "SELECT c.chunk_id, c.document_id, c.course_id, c.module_id, c.topic_id, c.page,
                        c.char_start, c.char_end, c.text, c.language
                 FROM document_chunks c
                 JOIN document_chunks_fts f ON c.rowid = f.rowid
                 WHERE document_chunks_fts MATCH ?1 AND c.course_id = ?2
                 ORDER BY rank LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![query, course_id, limit as i64], row_to_chunk)?;
            rows.filter_map(|r| r.ok()).collect()
        } else {
            let mut stmt = db.prepare(
                "SELECT c.chunk_id, c.document_id, c.course_id, c.module_id, c.topic_id, c.page,
                        c.char_start, c.char_end, c.text, c.language
                 FROM document_chunks c
                 JOIN document_chunks_fts f ON c.rowid = f.rowid
                 WHERE document_chunks_fts MATCH ?1
                 ORDER BY rank LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![query, limit as i64], row_to_chunk)?;
            rows.filter_map(|r| r.ok()).collect()
        };
        Ok(chunks)
    }

    /// Chunk ids for a document, used by the ingest pipeline to detect which
    /// previously-indexed chunks a re-ingest no longer produces.
    #[instrument(skip(self))]
    pub fn list_chunk_ids_for_document(&self, document_id: &str) -> Result<Vec<String>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT chunk_id FROM document_chunks WHERE document_id = ?1")?;
        let rows = stmt.query_map(params![document_id], |row| row.get::<_, String>(0))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    #[instrument(skip(self))]
    pub fn delete_chunk(&self, chunk_id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let rowid: Option<i64> = db
            .query_row(
                "SELECT rowid FROM document_chunks WHERE chunk_id = ?1",
                params![chunk_id],
                |row| row.get(0),
            )
            .ok();
        if let Some(rowid) = rowid {
            db.execute(
                "INSERT INTO document_chunks_fts(document_chunks_fts, rowid, text)
                 VALUES('delete', ?1, (SELECT text FROM document_chunks WHERE rowid = ?1))",
                params![rowid],
            )?;
            db.execute("DELETE FROM document_chunks WHERE rowid = ?1", params![rowid])?;
        }
        Ok(())
    }
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<DocumentChunk> {
    Ok(DocumentChunk {
        chunk_id: row.get(0)?,
        document_id: row.get(1)?,
        course_id: row.get(2)?,
        module_id: row.get(3)?,
        topic_id: row.get(4)?,
        page: row.get(5)?,
        char_start: row.get(6)?,
        char_end: row.get(7)?,
        text: row.get(8)?,
        language: row.get(9)?,
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

    fn chunk(id: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            chunk_id: id.to_string(),
            document_id: "doc-1".to_string(),
            course_id: "course-1".to_string(),
            module_id: None,
            topic_id: None,
            page: Some(1),
            char_start: 0,
            char_end: text.len() as i64,
            text: text.to_string(),
            language: "en".to_string(),
        }
    }

    #[test]
    fn upsert_then_search_matches_text() {
        let drs = drs();
        drs.upsert_chunk(&chunk("c1", "mitochondria is the powerhouse of the cell"))
            .unwrap();
        let results = drs.search_chunks("mitochondria", Some("course-1"), 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, "c1");
    }

    #[test]
    fn upsert_is_idempotent_on_chunk_id() {
        let drs = drs();
        drs.upsert_chunk(&chunk("c1", "first version")).unwrap();
        drs.upsert_chunk(&chunk("c1", "second version")).unwrap();
        let fetched = drs.get_chunk("c1").unwrap().unwrap();
        assert_eq!(fetched.text, "second version");
        assert_eq!(drs.list_chunk_ids_for_document("doc-1").unwrap().len(), 1);
    }

    #[test]
    fn delete_chunk_removes_from_fts() {
        let drs = drs();
        drs.upsert_chunk(&chunk("c1", "ephemeral content")).unwrap();
        drs.delete_chunk("c1").unwrap();
        assert!(drs.get_chunk("c1").unwrap().is_none());
        assert!(drs.search_chunks("ephemeral", None, 10).unwrap().is_empty());
    }
}
