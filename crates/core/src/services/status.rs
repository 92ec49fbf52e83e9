//! Setting or clearing the status-defining date on an existing person.

use chrono::NaiveDate;
use register_ids::RecordUuid;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::adapter::SerializedAdapter;
use crate::model::{InductionStatus, StatusUpdate};
use crate::review::{enqueue_quietly, ReviewCategory, ReviewSubject, ReviewTask, ReviewTaskSink};
use crate::status::{decide, resulting_date, DateChange, StatusTransitionInput, TransitionDecision};
use crate::store::PersonStore;
use crate::{CoreConfig, RegisterError, RegisterResult};

/// What happened to the incoming date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusDateOutcome {
    Applied {
        status: InductionStatus,
        status_date: Option<NaiveDate>,
    },
    /// Not committed; a review task was raised. Not an error.
    ReviewQueued {
        status: InductionStatus,
        reason: String,
    },
}

#[derive(Clone)]
pub struct StatusDateService {
    cfg: Arc<CoreConfig>,
    persons: Arc<SerializedAdapter<dyn PersonStore>>,
    reviews: Arc<dyn ReviewTaskSink>,
}

impl StatusDateService {
    pub fn new(
        cfg: Arc<CoreConfig>,
        persons: Arc<SerializedAdapter<dyn PersonStore>>,
        reviews: Arc<dyn ReviewTaskSink>,
    ) -> Self {
        Self {
            cfg,
            persons,
            reviews,
        }
    }

    /// Applies `change` to the person's status-defining date, or routes it to review.
    ///
    /// All reads and the write happen inside one adapter session. The write is
    /// compare-and-set on the version read at the start.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the person does not exist.
    /// - `PrerequisiteMissing` if a date is set on a person with no qualification date.
    /// - `ConcurrentModification` if the person changed between the read and the write.
    pub async fn apply_status_date(
        &self,
        person_id: RecordUuid,
        change: DateChange,
    ) -> RegisterResult<StatusDateOutcome> {
        let session = self.persons.session().await;

        let person = session
            .get_person(person_id)
            .await?
            .ok_or_else(|| RegisterError::NotFound(format!("person {person_id}")))?;
        let periods = session.appropriate_body_periods(person_id).await?;
        let events = session.qualifying_events(person_id).await?;

        let input = StatusTransitionInput {
            person_id,
            existing_status: person.induction_status,
            status_before_exemption: person.status_before_exemption,
            has_prerequisite: person.qualification_date.is_some(),
            open_appropriate_body_period: periods.iter().any(|p| p.is_open()),
            existing_date: person.status_date,
            incoming: change,
        };

        match decide(&input)? {
            TransitionDecision::Apply { forced_status } => {
                let status = forced_status.unwrap_or(person.induction_status);
                let status_before_exemption = match forced_status {
                    Some(_) => Some(person.induction_status),
                    None => person.status_before_exemption,
                };
                let status_date = resulting_date(change, person.status_date, &events);

                session
                    .update_status(StatusUpdate {
                        person_id,
                        expected_version: person.version,
                        induction_status: status,
                        status_before_exemption,
                        status_date,
                    })
                    .await?;
                drop(session);

                tracing::info!(%person_id, %status, ?status_date, "status date applied");
                Ok(StatusDateOutcome::Applied {
                    status,
                    status_date,
                })
            }
            TransitionDecision::Review { reason } => {
                drop(session);
                tracing::warn!(%person_id, %reason, "status date change routed to review");

                let task = ReviewTask::new(
                    ReviewCategory::StatusDateChange,
                    reason.clone(),
                    ReviewSubject::Person(person_id),
                    self.cfg.review_due_after(),
                );
                enqueue_quietly(self.reviews.as_ref(), task).await;
                Ok(StatusDateOutcome::ReviewQueued {
                    status: person.induction_status,
                    reason,
                })
            }
        }
    }
}
