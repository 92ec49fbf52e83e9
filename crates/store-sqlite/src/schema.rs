//! Connection setup and schema.

use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::Path;

use crate::config::SqliteStoreConfig;
use crate::error::{SqliteResult, SqliteStoreError};

/// Schema version recorded in `store_meta`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS persons (
    person_id TEXT PRIMARY KEY,
    trn TEXT NOT NULL,
    first_name TEXT NOT NULL,
    middle_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL,
    first_name_folded TEXT NOT NULL,
    last_name_folded TEXT NOT NULL,
    stated_first_name TEXT,
    stated_middle_name TEXT,
    stated_last_name TEXT,
    date_of_birth TEXT,
    national_id TEXT,
    national_id_normalized TEXT,
    email TEXT,
    qualification_date TEXT,
    induction_status TEXT NOT NULL,
    status_before_exemption TEXT,
    status_date TEXT,
    considered_candidates TEXT NOT NULL DEFAULT '[]',
    version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_persons_trn ON persons (trn);
CREATE INDEX IF NOT EXISTS ix_persons_name_dob
    ON persons (last_name_folded, date_of_birth);
CREATE INDEX IF NOT EXISTS ix_persons_email ON persons (email);
CREATE INDEX IF NOT EXISTS ix_persons_national_id ON persons (national_id_normalized);

CREATE TABLE IF NOT EXISTS qualifying_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL REFERENCES persons (person_id) ON DELETE CASCADE,
    awarded TEXT NOT NULL,
    description TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ix_qualifying_events_person ON qualifying_events (person_id);

CREATE TABLE IF NOT EXISTS appropriate_body_periods (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    person_id TEXT NOT NULL REFERENCES persons (person_id) ON DELETE CASCADE,
    body_name TEXT NOT NULL,
    started TEXT NOT NULL,
    ended TEXT
);
CREATE INDEX IF NOT EXISTS ix_appropriate_body_periods_person
    ON appropriate_body_periods (person_id);

CREATE TABLE IF NOT EXISTS national_id_xref (
    national_id TEXT NOT NULL,
    person_id TEXT NOT NULL,
    PRIMARY KEY (national_id, person_id)
);

CREATE TABLE IF NOT EXISTS unresolved_registrations (
    record_id TEXT PRIMARY KEY,
    caller_id TEXT NOT NULL,
    request_id TEXT NOT NULL,
    request_json TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS unresolved_candidates (
    record_id TEXT NOT NULL REFERENCES unresolved_registrations (record_id) ON DELETE CASCADE,
    person_id TEXT NOT NULL,
    matched_json TEXT NOT NULL,
    PRIMARY KEY (record_id, person_id)
);

CREATE TABLE IF NOT EXISTS idempotency_records (
    caller_id TEXT NOT NULL,
    request_id TEXT NOT NULL,
    outcome_json TEXT NOT NULL,
    resolved_at TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS ux_idempotency_key
    ON idempotency_records (caller_id, request_id);

CREATE TABLE IF NOT EXISTS trn_sequence (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    issued_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS review_tasks (
    task_id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    reason TEXT NOT NULL,
    subject_kind TEXT NOT NULL,
    subject_id TEXT NOT NULL,
    due TEXT NOT NULL
);
";

/// Opens a connection and applies pragmas.
pub fn open_connection(config: &SqliteStoreConfig) -> SqliteResult<Connection> {
    ensure_parent_dir(&config.path)?;
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(SqliteStoreError::db)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

fn ensure_parent_dir(path: &Path) -> SqliteResult<()> {
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
        }
        _ => Ok(()),
    }
}

fn apply_pragmas(connection: &Connection, config: &SqliteStoreConfig) -> SqliteResult<()> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(SqliteStoreError::db)?;
    connection
        .execute_batch(&format!(
            "PRAGMA journal_mode = {};",
            config.journal_mode.pragma_value()
        ))
        .map_err(SqliteStoreError::db)?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(SqliteStoreError::db)?;
    Ok(())
}

/// Creates the schema on a fresh database, or checks the recorded version.
pub fn initialize_schema(connection: &mut Connection) -> SqliteResult<()> {
    let tx = connection.transaction().map_err(SqliteStoreError::db)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(SqliteStoreError::db)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
            row.get(0)
        })
        .optional()
        .map_err(SqliteStoreError::db)?;
    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )
            .map_err(SqliteStoreError::db)?;
            tx.execute_batch(SCHEMA).map_err(SqliteStoreError::db)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(SqliteStoreError::db)?;
    Ok(())
}
