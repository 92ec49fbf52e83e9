use crate::model::IdempotencyRecord;
use register_ids::{IdError, RecordUuid, Trn};
use register_types::TextError;

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("not found: {0}")]
    NotFound(String),

    /// The idempotency key was already processed. Carries the recorded outcome unchanged.
    #[error("duplicate submission: {0}")]
    DuplicateSubmission(Box<IdempotencyRecord>),

    /// A collaborator could not be reached. Nothing was committed; retry with the same key.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("person {0} has no qualification date")]
    PrerequisiteMissing(RecordUuid),

    #[error("person {0} was modified by another operation; reload and retry")]
    ConcurrentModification(RecordUuid),

    /// The issued identifier is already held by another person. The identifier is discarded.
    #[error("identifier {0} is already assigned to another person")]
    IdentifierCollision(Trn),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid text: {0}")]
    Text(#[from] TextError),

    #[error("invalid identifier: {0}")]
    Id(#[from] IdError),
}

impl RegisterError {
    /// True when retrying the same request (same idempotency key) is safe and may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RegisterError::UpstreamUnavailable(_)
                | RegisterError::ConcurrentModification(_)
                | RegisterError::IdentifierCollision(_)
        )
    }
}

pub type RegisterResult<T> = std::result::Result<T, RegisterError>;
