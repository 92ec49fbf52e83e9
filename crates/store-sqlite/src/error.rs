use register_core::RegisterError;

#[derive(Debug, thiserror::Error)]
pub enum SqliteStoreError {
    #[error("sqlite store io error: {0}")]
    Io(String),

    #[error("sqlite store db error: {0}")]
    Db(String),

    /// A stored row no longer parses into its domain type.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),

    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),

    #[error("sqlite store invalid data: {0}")]
    Invalid(String),

    /// A constraint rejected the write; carries the domain error to hand back unchanged.
    #[error("{0}")]
    Rejected(Box<RegisterError>),
}

impl SqliteStoreError {
    pub(crate) fn db(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<SqliteStoreError> for RegisterError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Rejected(inner) => *inner,
            other => RegisterError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl From<RegisterError> for SqliteStoreError {
    fn from(error: RegisterError) -> Self {
        Self::Rejected(Box::new(error))
    }
}

pub type SqliteResult<T> = Result<T, SqliteStoreError>;
