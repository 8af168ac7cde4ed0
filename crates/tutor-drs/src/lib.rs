//! Durable record store (component C, §3, §6.3): courses, modules, topics,
//! document chunks, sessions, messages, quizzes, and ingest task mirrors.
//!
//! One SQLite connection behind a `Mutex`, matching the teacher's
//! single-node Phase-2 posture. Methods are split across files by entity
//! (`courses`, `chunks`, `sessions`, `messages`, `quizzes`, `ingest_tasks`)
//! but all hang off the single [`Drs`] facade.

pub mod checkpoints;
pub mod chunks;
pub mod courses;
pub mod db;
pub mod error;
pub mod ingest_tasks;
pub mod messages;
pub mod quizzes;
pub mod sessions;
pub mod types;

use std::sync::Mutex;

use rusqlite::Connection;

pub use error::DrsError;

/// Facade over the durable record store. Construct with an already-open,
/// `db::init_db`-initialised connection.
pub struct Drs {
    db: Mutex<Connection>,
}

impl Drs {
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }
}
