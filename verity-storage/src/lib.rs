//! SQLite-backed storage for threads, sources, chunks, citations, claims,
//! the ingest queue, and search audit events.

pub mod chunks;
pub mod claims;
pub mod db;
pub mod fts;
pub mod queue;
pub mod schema;
pub mod search_events;
pub mod sources;
pub mod threads;
pub mod types;

pub use db::Db;
pub use fts::FtsHit;
