//! RocksDB-backed storage implementation.
//!
//! `RocksStorage` is the persistent implementation of `Storage`: orders, issuers,
//! credentials, the signing request outbox and the vote queue.
//!
//! See `engine.rs` for lock semantics and the main implementation.

pub mod engine;
pub mod migration;
pub mod schema;
pub mod util;

pub use engine::RocksStorage;
