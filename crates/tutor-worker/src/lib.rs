//! Worker pool (component H, §4.2): one ingest task in flight per process,
//! bounded task count, soft RSS cap, heartbeats, and cancellation.

pub mod error;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sysinfo::{Pid, System};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use tutor_broker::BrokerHandle;
use tutor_core::config::{BROKER_DEFAULT_MAX_ATTEMPTS, WORKER_HEARTBEAT_INTERVAL_SECS, WORKER_MAX_TASKS_DEFAULT, WORKER_RSS_SOFT_CAP_BYTES};
use tutor_drs::types::IngestTaskState;
use tutor_drs::Drs;
use tutor_ingest::{IngestOutcome, IngestPipeline, IngestRequest, IngestStage};

pub use error::WorkerError;

/// Wire payload enqueued by the gateway for an ingest task (§6.2 "ingest
/// upload"). `IngestRequest` itself carries raw file bytes that don't
/// round-trip through JSON as cleanly, so the broker payload only carries
/// enough to look the real request up — in this single-process posture the
/// caller hands the worker the already-built `IngestRequest` directly via
/// `submit`, and this struct documents the wire shape a networked deployment
/// would use instead.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestTaskPayload {
    pub task_id: String,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue: String,
    pub worker_id: String,
    pub visibility_timeout_secs: u64,
    pub max_tasks_per_process: u32,
    pub rss_soft_cap_bytes: u64,
    pub max_attempts: i64,
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue: "ingest".to_string(),
            worker_id: uuid::Uuid::now_v7().to_string(),
            visibility_timeout_secs: WORKER_HEARTBEAT_INTERVAL_SECS * 3,
            max_tasks_per_process: WORKER_MAX_TASKS_DEFAULT,
            rss_soft_cap_bytes: WORKER_RSS_SOFT_CAP_BYTES,
            max_attempts: BROKER_DEFAULT_MAX_ATTEMPTS as i64,
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Source of the `IngestRequest` for a claimed task id — in this
/// single-node posture the caller (gateway or CLI) keeps the request body
/// around and hands it back by task id rather than round-tripping file
/// bytes through the broker's JSON payload.
pub trait IngestRequestSource: Send + Sync {
    fn take(&self, task_id: &str) -> Option<IngestRequest>;
}

pub struct Worker {
    broker: Arc<BrokerHandle>,
    drs: Arc<Drs>,
    pipeline: Arc<IngestPipeline>,
    requests: Arc<dyn IngestRequestSource>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(broker: Arc<BrokerHandle>, drs: Arc<Drs>, pipeline: Arc<IngestPipeline>, requests: Arc<dyn IngestRequestSource>, config: WorkerConfig) -> Self {
        Self {
            broker,
            drs,
            pipeline,
            requests,
            config,
        }
    }

    /// Drive the claim/run/ack loop until `max_tasks_per_process` tasks
    /// have been completed, then self-terminate (§4.2 "process self-
    /// terminates and is restarted by the supervising runner").
    pub async fn run(&self) {
        let mut tasks_completed: u32 = 0;

        loop {
            if tasks_completed >= self.config.max_tasks_per_process {
                info!(worker_id = %self.config.worker_id, tasks_completed, "self-terminating after max tasks reached");
                return;
            }

            if let Some(rss) = current_rss_bytes() {
                if rss > self.config.rss_soft_cap_bytes {
                    warn!(worker_id = %self.config.worker_id, rss, cap = self.config.rss_soft_cap_bytes, "soft RSS cap exceeded, exiting before next claim");
                    return;
                }
            }

            let claimed = match self.broker.claim(&self.config.queue, &self.config.worker_id, self.config.visibility_timeout_secs) {
                Ok(Some(task)) => task,
                Ok(None) => {
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
                Err(e) => {
                    error!(worker_id = %self.config.worker_id, error = %e, "claim failed, backing off");
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
            };

            self.process_task(&claimed.task_id, claimed.attempt_count).await;
            tasks_completed += 1;
        }
    }

    async fn process_task(&self, task_id: &str, attempt_count: i64) {
        let Some(request) = self.requests.take(task_id) else {
            warn!(task_id, "claimed task has no matching ingest request, dead-lettering");
            let _ = self.broker.nack(task_id, &self.config.worker_id, false, self.config.max_attempts, "no matching ingest request body");
            return;
        };

        if let Err(e) = self.drs.update_task_state(task_id, IngestTaskState::Running, attempt_count, None) {
            warn!(task_id, error = %e, "failed to persist running state, continuing anyway");
        }

        let cancel = CancellationToken::new();
        let cancel_watcher = spawn_cancel_watcher(self.drs.clone(), task_id.to_string(), cancel.clone());
        let heartbeat_task = spawn_heartbeat(self.broker.clone(), task_id.to_string(), self.config.worker_id.clone(), self.config.visibility_timeout_secs);

        let drs_for_progress = self.drs.clone();
        let task_id_for_progress = task_id.to_string();
        let progress: tutor_ingest::ProgressFn = Arc::new(move |stage: IngestStage, percent: u8, message: &str| {
            if let Err(e) = drs_for_progress.update_task_progress(&task_id_for_progress, percent as i64, Some(message)) {
                warn!(task_id = %task_id_for_progress, stage = ?stage, error = %e, "failed to persist ingest progress");
            }
        });

        let outcome = self.pipeline.run(request, progress, cancel.clone()).await;
        cancel_watcher.abort();
        heartbeat_task.abort();

        self.finish(task_id, attempt_count, outcome).await;
    }

    async fn finish(&self, task_id: &str, attempt_count: i64, outcome: Result<IngestOutcome, tutor_ingest::IngestError>) {
        match outcome {
            Ok(result) => {
                info!(task_id, course_id = %result.course_id, chunk_count = result.chunk_count, partial_failures = result.partial_failures.len(), "ingest task succeeded");
                let _ = self.drs.update_task_state(task_id, IngestTaskState::Succeeded, attempt_count, None);
                let _ = self.broker.ack(task_id, &self.config.worker_id);
            }
            Err(e) => {
                let retryable = e.is_retryable();
                warn!(task_id, error = %e, retryable, "ingest task failed");
                let state = if retryable { IngestTaskState::Retrying } else { IngestTaskState::Failed };
                let _ = self.drs.update_task_state(task_id, state, attempt_count, Some(&e.to_string()));
                let _ = self.broker.nack(task_id, &self.config.worker_id, retryable, self.config.max_attempts, &e.to_string());
            }
        }
    }
}

fn spawn_heartbeat(broker: Arc<BrokerHandle>, task_id: String, worker_id: String, visibility_timeout_secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let interval = Duration::from_secs(WORKER_HEARTBEAT_INTERVAL_SECS.min(visibility_timeout_secs.saturating_sub(1).max(1)));
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = broker.heartbeat(&task_id, &worker_id, visibility_timeout_secs) {
                warn!(task_id = %task_id, error = %e, "heartbeat failed, lease may have been lost");
            }
        }
    })
}

fn spawn_cancel_watcher(drs: Arc<Drs>, task_id: String, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(2)).await;
            match drs.is_cancel_requested(&task_id) {
                Ok(true) => {
                    cancel.cancel();
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!(task_id = %task_id, error = %e, "cancel check failed"),
            }
        }
    })
}

/// Current process RSS via `/proc`-backed `sysinfo`, grounded the same way
/// the pack's agent-runtime crates read their own memory footprint.
fn current_rss_bytes() -> Option<u64> {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(sysinfo::ProcessesToUpdate::Some(&[pid]), true);
    system.process(pid).map(|p| p.memory())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_rss_bytes_returns_a_positive_reading() {
        let rss = current_rss_bytes();
        assert!(rss.is_some());
        assert!(rss.unwrap() > 0);
    }
}
