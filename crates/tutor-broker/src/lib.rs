//! `tutor-broker` — durable multi-priority FIFO job queue broker (component
//! E, §4.1).
//!
//! Tasks are persisted to a SQLite `tasks` table. `enqueue`/`claim` are
//! called by the API surface and every worker process respectively, all
//! sharing one [`BrokerHandle`] over `Arc<Mutex<Connection>>`.

pub mod db;
pub mod engine;
pub mod error;
pub mod types;

pub use engine::BrokerHandle;
pub use error::{BrokerError, Result};
pub use types::{ClaimedTask, Task, TaskStatus};
