use rusqlite::Connection;

use crate::error::Result;

/// Initialise every DRS table. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_courses_tables(conn)?;
    create_chunks_table(conn)?;
    create_sessions_table(conn)?;
    create_messages_table(conn)?;
    create_quiz_tables(conn)?;
    create_ingest_tasks_table(conn)?;
    create_orchestrator_checkpoints_table(conn)?;
    Ok(())
}

fn create_courses_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS course_number_counter (
            id      INTEGER PRIMARY KEY CHECK (id = 1),
            next_number INTEGER NOT NULL
        );
        INSERT OR IGNORE INTO course_number_counter (id, next_number) VALUES (1, 1);

        CREATE TABLE IF NOT EXISTS courses (
            course_id     TEXT PRIMARY KEY,
            course_number INTEGER NOT NULL UNIQUE,
            title         TEXT NOT NULL,
            description   TEXT NOT NULL DEFAULT '',
            language      TEXT NOT NULL,
            country       TEXT NOT NULL,
            owner_id      TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            updated_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS modules (
            module_id   TEXT PRIMARY KEY,
            course_id   TEXT NOT NULL REFERENCES courses(course_id),
            week        INTEGER NOT NULL,
            title       TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            objectives  TEXT NOT NULL DEFAULT '[]',
            UNIQUE(course_id, week)
        );
        CREATE INDEX IF NOT EXISTS idx_modules_course ON modules(course_id, week);

        CREATE TABLE IF NOT EXISTS topics (
            topic_id   TEXT PRIMARY KEY,
            module_id  TEXT NOT NULL REFERENCES modules(module_id),
            order_index INTEGER NOT NULL,
            title      TEXT NOT NULL,
            content    TEXT NOT NULL DEFAULT '',
            estimated_duration_minutes INTEGER,
            UNIQUE(module_id, order_index)
        );
        CREATE INDEX IF NOT EXISTS idx_topics_module ON topics(module_id, order_index);",
    )?;
    Ok(())
}

/// Chunk text lives here so BM25 lexical search (component F) and idempotent
/// re-ingest checks (testable property 3) don't depend on the vector index.
fn create_chunks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS document_chunks (
            chunk_id    TEXT PRIMARY KEY,
            document_id TEXT NOT NULL,
            course_id   TEXT NOT NULL,
            module_id   TEXT,
            topic_id    TEXT,
            page        INTEGER,
            char_start  INTEGER NOT NULL,
            char_end    INTEGER NOT NULL,
            text        TEXT NOT NULL,
            language    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunks_document ON document_chunks(document_id);
        CREATE INDEX IF NOT EXISTS idx_chunks_course ON document_chunks(course_id);

        CREATE VIRTUAL TABLE IF NOT EXISTS document_chunks_fts
            USING fts5(text, content='document_chunks', content_rowid='rowid');",
    )?;
    Ok(())
}

fn create_sessions_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS sessions (
            session_id       TEXT PRIMARY KEY,
            user_id          TEXT NOT NULL,
            current_course_id TEXT,
            client_ip        TEXT,
            client_user_agent TEXT,
            client_device_class TEXT,
            message_count    INTEGER NOT NULL DEFAULT 0,
            started_at       TEXT NOT NULL,
            last_activity_at TEXT NOT NULL,
            expires_at       TEXT,
            ended_at         TEXT,
            is_active        INTEGER NOT NULL DEFAULT 1
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user_active
            ON sessions(user_id, is_active);",
    )?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id   TEXT NOT NULL REFERENCES sessions(session_id),
            user_id      TEXT NOT NULL,
            role         TEXT NOT NULL,
            content      TEXT NOT NULL,
            message_type TEXT NOT NULL,
            course_id    TEXT,
            module_id    TEXT,
            topic_id     TEXT,
            metadata     TEXT NOT NULL DEFAULT '{}',
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_session
            ON messages(session_id, created_at, id);",
    )?;
    Ok(())
}

fn create_quiz_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS quizzes (
            quiz_id           TEXT PRIMARY KEY,
            course_id         TEXT NOT NULL,
            module_id         TEXT,
            title             TEXT NOT NULL,
            quiz_type         TEXT NOT NULL,
            passing_score     INTEGER NOT NULL,
            time_limit_minutes INTEGER
        );

        CREATE TABLE IF NOT EXISTS quiz_questions (
            quiz_id         TEXT NOT NULL REFERENCES quizzes(quiz_id),
            question_number INTEGER NOT NULL,
            question_text   TEXT NOT NULL,
            options         TEXT NOT NULL DEFAULT '[]',
            correct_answer  TEXT NOT NULL,
            explanation     TEXT,
            difficulty      TEXT,
            PRIMARY KEY (quiz_id, question_number)
        );

        CREATE TABLE IF NOT EXISTS quiz_responses (
            quiz_id             TEXT NOT NULL REFERENCES quizzes(quiz_id),
            user_id             TEXT NOT NULL,
            answers             TEXT NOT NULL DEFAULT '{}',
            score               INTEGER NOT NULL,
            total_questions     INTEGER NOT NULL,
            time_taken_seconds  INTEGER,
            submitted_at        TEXT NOT NULL,
            PRIMARY KEY (quiz_id, user_id, submitted_at)
        );",
    )?;
    Ok(())
}

fn create_ingest_tasks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS ingest_tasks (
            task_id            TEXT PRIMARY KEY,
            job_id             TEXT NOT NULL,
            priority            INTEGER NOT NULL DEFAULT 0,
            state              TEXT NOT NULL,
            attempt_count      INTEGER NOT NULL DEFAULT 0,
            first_seen_at      TEXT NOT NULL,
            last_heartbeat_at  TEXT,
            error_summary      TEXT,
            progress_percent   INTEGER,
            progress_message   TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_ingest_tasks_state ON ingest_tasks(state);",
    )?;
    Ok(())
}

/// Async-durable side of orchestrator checkpointing (§4.8); the hot cache
/// copy is authoritative for latency, this one is authoritative for restart.
fn create_orchestrator_checkpoints_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS orchestrator_checkpoints (
            session_id TEXT PRIMARY KEY,
            state_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
    )?;
    Ok(())
}
