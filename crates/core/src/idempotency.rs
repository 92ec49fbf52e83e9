//! Idempotency guard for registration intake.
//!
//! The read side lives here; the write side is part of
//! [`PersonStore::commit_registration`](crate::store::PersonStore::commit_registration) so the
//! idempotency record lands in the same transaction as whatever the intake created. The
//! uniqueness of `(caller_id, request_id)` is enforced by the store, never by this process:
//! two instances racing on one key both pass [`IdempotencyGuard::ensure_unprocessed`], and the
//! loser's commit fails with `DuplicateSubmission`.

use async_trait::async_trait;
use std::sync::Arc;

use crate::model::{IdempotencyKey, IdempotencyRecord};
use crate::{RegisterError, RegisterResult};

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn get_record(&self, key: &IdempotencyKey) -> RegisterResult<Option<IdempotencyRecord>>;
}

#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self { store }
    }

    /// The recorded outcome for `key`, if the key was already processed.
    pub async fn get_or_null(
        &self,
        key: &IdempotencyKey,
    ) -> RegisterResult<Option<IdempotencyRecord>> {
        self.store.get_record(key).await
    }

    /// Fails with `DuplicateSubmission` (carrying the stored record) when `key` was already
    /// processed.
    pub async fn ensure_unprocessed(&self, key: &IdempotencyKey) -> RegisterResult<()> {
        match self.store.get_record(key).await? {
            Some(record) => {
                tracing::info!(key = %key, "duplicate submission; returning recorded outcome");
                Err(RegisterError::DuplicateSubmission(Box::new(record)))
            }
            None => Ok(()),
        }
    }
}
