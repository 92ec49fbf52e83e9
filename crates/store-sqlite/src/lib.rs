//! # Register SQLite Store
//!
//! SQLite adapter implementing every storage-facing port of `register-core`: the person
//! store, the national-ID cross-reference, the idempotency records, the identifier sequence
//! and the review task queue.

mod config;
mod error;
mod schema;
mod store;

pub use config::{SqliteJournalMode, SqliteStoreConfig, DEFAULT_BUSY_TIMEOUT_MS};
pub use error::{SqliteResult, SqliteStoreError};
pub use schema::SCHEMA_VERSION;
pub use store::SqliteRegister;
