//! Document ingest pipeline (component G, §4.3): extract, chunk, embed,
//! index-upsert, curriculum-synthesis, content-expansion, persist.
//!
//! This crate is pure pipeline logic — no broker, no process lifecycle.
//! `tutor-worker` claims tasks off the broker and drives [`IngestPipeline`]
//! for each one, translating stage progress into heartbeats.

pub mod chunk;
pub mod curriculum;
pub mod error;
pub mod expand;
pub mod extract;
pub mod pipeline;
pub mod types;

pub use error::IngestError;
pub use pipeline::{IngestOutcome, IngestPipeline, ProgressFn};
pub use types::{IngestFile, IngestRequest, IngestStage};
