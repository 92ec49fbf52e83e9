//! Registration intake.
//!
//! Normalise, expand synonyms, match, resolve, then commit exactly one outcome together with
//! its idempotency record. Nothing is committed until the outcome is final, so any failure
//! before the commit leaves the request safe to retry with the same key.

use chrono::Utc;
use register_ids::RecordUuid;
use std::sync::Arc;

use super::RegisterPorts;
use crate::adapter::SerializedAdapter;
use crate::idempotency::IdempotencyGuard;
use crate::issuer::IssuerClient;
use crate::matching::CandidateMatcher;
use crate::model::{
    IdempotencyKey, IdempotencyRecord, NewPerson, PersonName, RegistrationCommit,
    RegistrationOutcome, RegistrationRequest, ResolvedIdentity, StatedName,
    UnresolvedRegistration,
};
use crate::normalize::{collapse_whitespace, normalize, NormalizedAttributes};
use crate::resolution::{resolve, resolved_identity, Resolution};
use crate::review::{enqueue_quietly, ReviewCategory, ReviewSubject, ReviewTask, ReviewTaskSink};
use crate::store::{CandidateQuery, PersonStore};
use crate::synonyms::SynonymExpander;
use crate::{CoreConfig, RegisterResult};

#[derive(Clone)]
pub struct RegistrationService {
    cfg: Arc<CoreConfig>,
    persons: Arc<SerializedAdapter<dyn PersonStore>>,
    matcher: CandidateMatcher,
    synonyms: Arc<SynonymExpander>,
    guard: IdempotencyGuard,
    issuer: IssuerClient,
    reviews: Arc<dyn ReviewTaskSink>,
}

impl RegistrationService {
    pub fn new(
        cfg: Arc<CoreConfig>,
        persons: Arc<SerializedAdapter<dyn PersonStore>>,
        ports: &RegisterPorts,
    ) -> Self {
        Self {
            matcher: CandidateMatcher::new(persons.clone(), ports.cross_reference.clone()),
            synonyms: Arc::new(SynonymExpander::new(
                ports.synonyms.clone(),
                cfg.synonym_cache_ttl(),
            )),
            guard: IdempotencyGuard::new(ports.idempotency.clone()),
            issuer: IssuerClient::new(ports.issuer.clone()),
            reviews: ports.reviews.clone(),
            persons,
            cfg,
        }
    }

    /// Resolves a registration request to an existing person, a pending review or a new
    /// person.
    ///
    /// # Errors
    ///
    /// - `DuplicateSubmission` carrying the first outcome when the key was already processed.
    /// - `UpstreamUnavailable` when a collaborator fails; nothing was committed.
    /// - `IdentifierCollision` when the freshly issued identifier is already taken. The
    ///   identifier is discarded.
    pub async fn submit(&self, request: RegistrationRequest) -> RegisterResult<RegistrationOutcome> {
        self.guard.ensure_unprocessed(&request.key).await?;

        let attrs = normalize(&request);
        let query = CandidateQuery {
            first_names: self.synonyms.expand(&attrs.first_name).await?,
            middle_name: attrs.middle_name.to_lowercase(),
            last_name: attrs.last_name.to_lowercase(),
            date_of_birth: request.date_of_birth,
            emails: attrs.emails.clone(),
            national_id: attrs.national_id.clone(),
        };
        let candidates = self.matcher.find_candidates(&query).await?;

        match resolve(&candidates) {
            Resolution::Completed(candidate) => {
                let outcome = RegistrationOutcome::Completed {
                    identity: resolved_identity(candidate),
                };
                let record = record_for(&request.key, &outcome);
                self.commit(RegistrationCommit::Existing { record }).await?;
                tracing::info!(
                    key = %request.key,
                    person_id = %candidate.person_id(),
                    "registration matched existing person"
                );
                Ok(outcome)
            }
            Resolution::Pending(candidates) => {
                let record_id = RecordUuid::new();
                let outcome = RegistrationOutcome::Pending {
                    record_id,
                    candidate_count: candidates.len(),
                };
                let record = record_for(&request.key, &outcome);
                let key = request.key.clone();
                self.commit(RegistrationCommit::Unresolved {
                    registration: UnresolvedRegistration {
                        record_id,
                        request,
                        candidates: candidates.to_vec(),
                    },
                    record,
                })
                .await?;
                tracing::warn!(
                    key = %key,
                    %record_id,
                    candidates = candidates.len(),
                    "registration needs review"
                );

                let task = ReviewTask::new(
                    ReviewCategory::PotentialDuplicate,
                    format!(
                        "registration {key} partially matches {} existing person(s)",
                        candidates.len()
                    ),
                    ReviewSubject::UnresolvedRegistration(record_id),
                    self.cfg.review_due_after(),
                );
                enqueue_quietly(self.reviews.as_ref(), task).await;
                Ok(outcome)
            }
            Resolution::New => self.register_new(request, attrs).await,
        }
    }

    /// The recorded outcome for `key`, if any.
    pub async fn outcome(&self, key: &IdempotencyKey) -> RegisterResult<Option<IdempotencyRecord>> {
        self.guard.get_or_null(key).await
    }

    async fn register_new(
        &self,
        request: RegistrationRequest,
        attrs: NormalizedAttributes,
    ) -> RegisterResult<RegistrationOutcome> {
        let trn = self.issuer.issue().await?;
        let person_id = RecordUuid::new();

        let name = PersonName {
            first: attrs.first_name,
            middle: attrs.middle_name,
            last: attrs.last_name,
        };
        let stated_name = StatedName {
            first: non_empty(collapse_whitespace(&request.first_name)),
            middle: non_empty(collapse_whitespace(&request.middle_name)),
            last: non_empty(collapse_whitespace(&request.last_name)),
        };
        let email = attrs.emails.first().cloned();

        let outcome = RegistrationOutcome::Completed {
            identity: ResolvedIdentity {
                person_id,
                trn: trn.clone(),
                first_name: name.first.clone(),
                middle_name: name.middle.clone(),
                last_name: name.last.clone(),
                date_of_birth: Some(request.date_of_birth),
                national_id: attrs.national_id.clone(),
                email: email.clone(),
            },
        };
        let record = record_for(&request.key, &outcome);
        let commit = RegistrationCommit::NewPerson {
            person: NewPerson {
                person_id,
                trn: trn.clone(),
                name,
                stated_name,
                date_of_birth: request.date_of_birth,
                national_id: attrs.national_id,
                email,
                considered_candidates: Vec::new(),
            },
            record,
        };

        if let Err(e) = self.commit(commit).await {
            tracing::warn!(key = %request.key, %trn, error = %e, "discarding issued identifier");
            return Err(e);
        }
        tracing::info!(key = %request.key, %person_id, %trn, "registered new person");
        Ok(outcome)
    }

    async fn commit(&self, commit: RegistrationCommit) -> RegisterResult<()> {
        let session = self.persons.session().await;
        session.commit_registration(commit).await
    }
}

fn record_for(key: &IdempotencyKey, outcome: &RegistrationOutcome) -> IdempotencyRecord {
    IdempotencyRecord {
        key: key.clone(),
        outcome: outcome.clone(),
        resolved_at: Utc::now(),
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
