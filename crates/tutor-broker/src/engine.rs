use std::sync::{Arc, Mutex};

use chrono::Utc;
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{BrokerError, Result};
use crate::types::{ClaimedTask, Task, TaskStatus};

/// Durable multi-priority FIFO broker (§4.1). One connection shared by the
/// API surface (enqueue) and every worker process (claim/heartbeat/ack/nack),
/// mirroring the teacher's `SchedulerHandle` over `Arc<Mutex<Connection>>`.
pub struct BrokerHandle {
    conn: Arc<Mutex<Connection>>,
}

impl BrokerHandle {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Durable enqueue; returns once the insert is committed.
    pub fn enqueue(&self, queue: &str, payload: serde_json::Value, priority: i64) -> Result<String> {
        let conn = self.conn.lock().unwrap();
        let task_id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let payload_str = payload.to_string();
        conn.execute(
            "INSERT INTO tasks
             (task_id, queue, payload, priority, status, attempt_count, visible_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'ready', 0, ?5, ?5, ?5)",
            params![task_id, queue, payload_str, priority, now],
        )?;
        info!(task_id = %task_id, queue, priority, "task enqueued");
        Ok(task_id)
    }

    /// Claim the highest-priority ready task, marking it invisible for
    /// `visibility_timeout_secs`. Per-priority FIFO among ready tasks (§4.1,
    /// §5 ordering guarantees).
    pub fn claim(
        &self,
        queue: &str,
        worker_id: &str,
        visibility_timeout_secs: u64,
    ) -> Result<Option<ClaimedTask>> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let now_str = now.to_rfc3339();

        let candidate: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT task_id, payload, attempt_count FROM tasks
                 WHERE queue = ?1 AND status = 'ready' AND visible_at <= ?2
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1",
                params![queue, now_str],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((task_id, payload_str, attempt_count)) = candidate else {
            return Ok(None);
        };

        let visible_at = (now + chrono::Duration::seconds(visibility_timeout_secs as i64)).to_rfc3339();
        let changed = conn.execute(
            "UPDATE tasks SET status = 'claimed', owner_worker_id = ?1, visible_at = ?2,
                attempt_count = attempt_count + 1, updated_at = ?3
             WHERE task_id = ?4 AND status = 'ready'",
            params![worker_id, visible_at, now_str, task_id],
        )?;
        if changed == 0 {
            // Lost the race to another claimant polling concurrently.
            return Ok(None);
        }

        let payload: serde_json::Value = serde_json::from_str(&payload_str)
            .map_err(|e| BrokerError::BrokerUnavailable(format!("corrupt payload: {e}")))?;
        Ok(Some(ClaimedTask {
            task_id,
            payload,
            attempt_count: attempt_count + 1,
        }))
    }

    /// Extend a claimed task's visibility. Fails with [`BrokerError::NotOwner`]
    /// if another worker now owns the lease.
    pub fn heartbeat(&self, task_id: &str, worker_id: &str, visibility_timeout_secs: u64) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let visible_at = (now + chrono::Duration::seconds(visibility_timeout_secs as i64)).to_rfc3339();
        let changed = conn.execute(
            "UPDATE tasks SET visible_at = ?1, updated_at = ?2
             WHERE task_id = ?3 AND owner_worker_id = ?4 AND status = 'claimed'",
            params![visible_at, now.to_rfc3339(), task_id, worker_id],
        )?;
        if changed == 0 {
            return Err(self.ownership_error(&conn, task_id, worker_id)?);
        }
        Ok(())
    }

    /// Mark a task permanently done.
    pub fn ack(&self, task_id: &str, worker_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "UPDATE tasks SET status = 'acked', updated_at = ?1
             WHERE task_id = ?2 AND owner_worker_id = ?3 AND status = 'claimed'",
            params![Utc::now().to_rfc3339(), task_id, worker_id],
        )?;
        if changed == 0 {
            return Err(self.ownership_error(&conn, task_id, worker_id)?);
        }
        Ok(())
    }

    /// Fail a claimed task. Retryable failures go back to `ready` with
    /// exponential backoff (base 1s, factor 2, cap 60s, jitter ±25%) unless
    /// `max_attempts` has been reached, in which case — like a non-retryable
    /// failure — the task is dead-lettered (§4.1).
    pub fn nack(&self, task_id: &str, worker_id: &str, retryable: bool, max_attempts: i64, reason: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let attempt_count: i64 = conn
            .query_row(
                "SELECT attempt_count FROM tasks WHERE task_id = ?1 AND owner_worker_id = ?2 AND status = 'claimed'",
                params![task_id, worker_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| BrokerError::NotOwner {
                task_id: task_id.to_string(),
                worker_id: worker_id.to_string(),
            })?;

        let now = Utc::now();
        if retryable && attempt_count < max_attempts {
            let visible_at = now + chrono::Duration::milliseconds(backoff_ms(attempt_count) as i64);
            conn.execute(
                "UPDATE tasks SET status = 'ready', owner_worker_id = NULL, visible_at = ?1, updated_at = ?2
                 WHERE task_id = ?3",
                params![visible_at.to_rfc3339(), now.to_rfc3339(), task_id],
            )?;
            warn!(task_id, attempt_count, reason, "task nacked, will retry");
        } else {
            conn.execute(
                "UPDATE tasks SET status = 'dead_lettered', dead_letter_reason = ?1, updated_at = ?2
                 WHERE task_id = ?3",
                params![reason, now.to_rfc3339(), task_id],
            )?;
            warn!(task_id, attempt_count, reason, "task dead-lettered");
        }
        Ok(())
    }

    pub fn get_task(&self, task_id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT task_id, queue, payload, priority, status, attempt_count,
                    owner_worker_id, visible_at, created_at, updated_at, dead_letter_reason
             FROM tasks WHERE task_id = ?1",
            params![task_id],
            row_to_task,
        )
        .optional()
        .map_err(BrokerError::Database)
    }

    /// Dead-letter inspection (SPEC_FULL §C.3), the broker counterpart to
    /// the teacher's `SchedulerHandle::list_jobs`.
    pub fn list_dead_letters(&self, queue: &str, limit: usize) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT task_id, queue, payload, priority, status, attempt_count,
                    owner_worker_id, visible_at, created_at, updated_at, dead_letter_reason
             FROM tasks WHERE queue = ?1 AND status = 'dead_lettered'
             ORDER BY updated_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![queue, limit as i64], row_to_task)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    fn ownership_error(&self, conn: &Connection, task_id: &str, worker_id: &str) -> Result<BrokerError> {
        let exists: bool = conn
            .query_row("SELECT 1 FROM tasks WHERE task_id = ?1", params![task_id], |_| Ok(()))
            .optional()?
            .is_some();
        if exists {
            Ok(BrokerError::NotOwner {
                task_id: task_id.to_string(),
                worker_id: worker_id.to_string(),
            })
        } else {
            Ok(BrokerError::TaskNotFound {
                task_id: task_id.to_string(),
            })
        }
    }
}

/// Exponential backoff with ±25% jitter: base 1s, factor 2, cap 60s (§4.1).
fn backoff_ms(attempt_count: i64) -> u64 {
    use tutor_core::config::{BROKER_BACKOFF_BASE_MS, BROKER_BACKOFF_CAP_MS, BROKER_BACKOFF_FACTOR, BROKER_BACKOFF_JITTER_PCT};

    let exp = attempt_count.max(0) as u32;
    let raw = (BROKER_BACKOFF_BASE_MS as f64) * (BROKER_BACKOFF_FACTOR as f64).powi(exp as i32);
    let capped = raw.min(BROKER_BACKOFF_CAP_MS as f64);
    let jitter_span = capped * BROKER_BACKOFF_JITTER_PCT;
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    (capped + jitter).max(0.0) as u64
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let payload_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    Ok(Task {
        task_id: row.get(0)?,
        queue: row.get(1)?,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::Value::Null),
        priority: row.get(3)?,
        status: status_str.parse().unwrap_or(TaskStatus::Ready),
        attempt_count: row.get(5)?,
        owner_worker_id: row.get(6)?,
        visible_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        dead_letter_reason: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn broker() -> BrokerHandle {
        let conn = Connection::open_in_memory().unwrap();
        BrokerHandle::new(conn).unwrap()
    }

    #[test]
    fn claim_returns_highest_priority_first() {
        let broker = broker();
        broker.enqueue("ingest", json!({"n": 1}), 0).unwrap();
        broker.enqueue("ingest", json!({"n": 2}), 10).unwrap();

        let claimed = broker.claim("ingest", "worker-1", 30).unwrap().unwrap();
        assert_eq!(claimed.payload, json!({"n": 2}));
    }

    #[test]
    fn claim_is_invisible_until_ack_or_nack() {
        let broker = broker();
        broker.enqueue("ingest", json!({}), 0).unwrap();
        broker.claim("ingest", "worker-1", 30).unwrap().unwrap();
        assert!(broker.claim("ingest", "worker-2", 30).unwrap().is_none());
    }

    #[test]
    fn ack_requires_ownership() {
        let broker = broker();
        let task_id = broker.enqueue("ingest", json!({}), 0).unwrap();
        broker.claim("ingest", "worker-1", 30).unwrap();
        assert!(broker.ack(&task_id, "worker-2").is_err());
        assert!(broker.ack(&task_id, "worker-1").is_ok());
    }

    #[test]
    fn nack_retryable_reenqueues_until_max_attempts_then_dead_letters() {
        let broker = broker();
        let task_id = broker.enqueue("ingest", json!({}), 0).unwrap();

        for _ in 0..3 {
            let claimed = broker.claim("ingest", "worker-1", 30).unwrap().unwrap();
            broker.nack(&claimed.task_id, "worker-1", true, 3, "timeout").unwrap();
        }

        let task = broker.get_task(&task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::DeadLettered);
    }

    #[test]
    fn nack_non_retryable_dead_letters_immediately() {
        let broker = broker();
        let task_id = broker.enqueue("ingest", json!({}), 0).unwrap();
        let claimed = broker.claim("ingest", "worker-1", 30).unwrap().unwrap();
        broker.nack(&claimed.task_id, "worker-1", false, 3, "malformed input").unwrap();

        let task = broker.get_task(&task_id).unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::DeadLettered);
    }

    #[test]
    fn list_dead_letters_scopes_by_queue() {
        let broker = broker();
        let task_id = broker.enqueue("ingest", json!({}), 0).unwrap();
        let claimed = broker.claim("ingest", "worker-1", 30).unwrap().unwrap();
        broker.nack(&claimed.task_id, "worker-1", false, 3, "bad").unwrap();

        let dead = broker.list_dead_letters("ingest", 10).unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].task_id, task_id);
        assert!(broker.list_dead_letters("other", 10).unwrap().is_empty());
    }
}
