//! Constants used throughout the register core crate.

/// Default number of days a review task has before it falls due.
pub const DEFAULT_REVIEW_DUE_DAYS: i64 = 5;

/// Upper bound accepted for the review due offset.
pub const MAX_REVIEW_DUE_DAYS: i64 = 365;

/// Default lifetime of the cached synonym table, in seconds.
pub const DEFAULT_SYNONYM_CACHE_TTL_SECS: u64 = 60 * 60;

/// Default SQLite database file used by the binaries.
pub const DEFAULT_DATABASE_PATH: &str = "register.sqlite3";

/// Query-string names for [`crate::lookup::PersonInclude`] values.
pub const INCLUDE_INDUCTION: &str = "induction";
pub const INCLUDE_QUALIFYING_EVENTS: &str = "qualifying_events";
pub const INCLUDE_STATED_NAMES: &str = "stated_names";
