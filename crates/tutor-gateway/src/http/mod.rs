pub mod chat;
pub mod courses;
pub mod health;
pub mod ingest;
pub mod quiz;
pub mod sessions;
