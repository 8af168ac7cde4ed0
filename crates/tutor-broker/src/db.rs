use rusqlite::Connection;

use crate::error::Result;

/// Initialise the `tasks` table. Idempotent; safe on every startup.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            task_id            TEXT NOT NULL PRIMARY KEY,
            queue              TEXT NOT NULL,
            payload            TEXT NOT NULL,
            priority           INTEGER NOT NULL DEFAULT 0,
            status             TEXT NOT NULL DEFAULT 'ready',
            attempt_count      INTEGER NOT NULL DEFAULT 0,
            owner_worker_id    TEXT,
            visible_at         TEXT NOT NULL,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL,
            dead_letter_reason TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_claimable
            ON tasks(queue, status, priority DESC, visible_at, created_at);",
    )?;
    Ok(())
}
