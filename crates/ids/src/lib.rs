//! Identifier types for the teacher register.
//!
//! Two families of identifier live here:
//!
//! - [`RecordUuid`]: the aggregate key for rows the register owns (persons, unresolved
//!   registrations, review tasks). Canonical form is **32 lowercase hexadecimal characters**
//!   with no hyphens, the same value as `Uuid::new_v4().simple().to_string()`.
//! - [`Trn`]: the teacher reference number minted by the identifier generation service. This
//!   is the identifier that is issued exactly once per real-world person and handed back to
//!   callers.
//!
//! Externally supplied values must already be canonical; nothing here silently normalises a
//! hyphenated or uppercase UUID.

mod service;

pub use service::{RecordUuid, Trn, Uuid};

/// Error type for identifier parsing.
#[derive(Debug, thiserror::Error)]
pub enum IdError {
    /// Invalid input provided
    #[error("invalid identifier: {0}")]
    InvalidInput(String),
}

/// Result type for identifier operations.
pub type IdResult<T> = Result<T, IdError>;
