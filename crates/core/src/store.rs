//! Storage-facing ports: the system of record and the national-ID cross-reference.
//!
//! Adapters implement these; the engines only ever see the traits. No transaction spanning
//! more than one aggregate is assumed, with one exception: [`PersonStore::commit_registration`]
//! must write the intake's record and its idempotency record atomically.

use async_trait::async_trait;
use chrono::NaiveDate;
use register_ids::{RecordUuid, Trn};
use register_types::EmailAddress;
use std::collections::BTreeSet;

use crate::model::{
    AppropriateBodyPeriod, PersonIdentity, QualifyingEvent, RegistrationCommit, StatusUpdate,
};
use crate::RegisterResult;

/// Attributes the system of record is queried with.
///
/// Names are lowercased; the store compares case-insensitively. The middle name is carried for
/// adapters that log or audit queries but takes no part in candidate selection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateQuery {
    pub first_names: BTreeSet<String>,
    pub middle_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub emails: Vec<EmailAddress>,
    pub national_id: Option<String>,
}

/// The system of record holding person aggregates.
#[async_trait]
pub trait PersonStore: Send + Sync {
    /// Persons satisfying (any first name AND last name AND date of birth) OR (any email) OR
    /// (national ID). May over-return; the matcher decides what actually matched.
    async fn find_candidates(&self, query: &CandidateQuery) -> RegisterResult<Vec<PersonIdentity>>;

    /// Fetches persons by id. Unknown ids are skipped.
    async fn get_persons(&self, ids: &[RecordUuid]) -> RegisterResult<Vec<PersonIdentity>>;

    async fn get_person(&self, person_id: RecordUuid) -> RegisterResult<Option<PersonIdentity>>;

    async fn get_person_by_trn(&self, trn: &Trn) -> RegisterResult<Option<PersonIdentity>>;

    async fn qualifying_events(&self, person_id: RecordUuid) -> RegisterResult<Vec<QualifyingEvent>>;

    async fn appropriate_body_periods(
        &self,
        person_id: RecordUuid,
    ) -> RegisterResult<Vec<AppropriateBodyPeriod>>;

    /// Compare-and-set write of the status fields.
    ///
    /// # Errors
    ///
    /// `ConcurrentModification` when the stored version differs from `expected_version`,
    /// `NotFound` when the person no longer exists.
    async fn update_status(&self, update: StatusUpdate) -> RegisterResult<()>;

    /// Writes the intake's record and its idempotency record in one unit.
    ///
    /// # Errors
    ///
    /// `DuplicateSubmission` carrying the stored record when the idempotency key already
    /// exists (nothing else is written), `IdentifierCollision` when a new person's TRN is
    /// already taken.
    async fn commit_registration(&self, commit: RegistrationCommit) -> RegisterResult<()>;
}

/// Flat national-ID → person table populated by an unrelated ingestion pipeline.
#[async_trait]
pub trait CrossReferenceStore: Send + Sync {
    /// `national_id` is already normalised.
    async fn person_ids_for_national_id(
        &self,
        national_id: &str,
    ) -> RegisterResult<BTreeSet<RecordUuid>>;
}
