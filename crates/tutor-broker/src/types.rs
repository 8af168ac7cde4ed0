use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued task (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Enqueued, not currently claimed, `claim_at <= now`.
    Ready,
    /// Claimed by a worker; invisible until `visible_at`.
    Claimed,
    /// Terminal success.
    Acked,
    /// Terminal failure after `max_attempts` or a non-retryable `nack`.
    DeadLettered,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Claimed => "claimed",
            TaskStatus::Acked => "acked",
            TaskStatus::DeadLettered => "dead_lettered",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ready" => Ok(TaskStatus::Ready),
            "claimed" => Ok(TaskStatus::Claimed),
            "acked" => Ok(TaskStatus::Acked),
            "dead_lettered" => Ok(TaskStatus::DeadLettered),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A durable queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub queue: String,
    pub payload: serde_json::Value,
    pub priority: i64,
    pub status: TaskStatus,
    pub attempt_count: i64,
    pub owner_worker_id: Option<String>,
    pub visible_at: String,
    pub created_at: String,
    pub updated_at: String,
    pub dead_letter_reason: Option<String>,
}

/// Result of a successful `claim` (§4.1).
#[derive(Debug, Clone)]
pub struct ClaimedTask {
    pub task_id: String,
    pub payload: serde_json::Value,
    pub attempt_count: i64,
}
