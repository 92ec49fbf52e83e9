//! Wire types for the REST surface.
//!
//! Dates travel as `YYYY-MM-DD` strings and identifiers as their canonical text forms.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use register_core::lookup::{InductionView, PersonView};
use register_core::model::{AppropriateBodyPeriod, QualifyingEvent, ResolvedIdentity, StatedName};
use register_core::{IdempotencyRecord, RegistrationOutcome, StatusDateOutcome};

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Registration intake body. The caller id comes from the `x-caller-id` header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegistrationReq {
    pub request_id: String,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub last_name: String,
    /// `YYYY-MM-DD`
    pub date_of_birth: String,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub national_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct IdentityRes {
    pub person_id: String,
    pub trn: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub national_id: Option<String>,
    pub email: Option<String>,
}

impl From<&ResolvedIdentity> for IdentityRes {
    fn from(identity: &ResolvedIdentity) -> Self {
        Self {
            person_id: identity.person_id.to_string(),
            trn: identity.trn.to_string(),
            first_name: identity.first_name.clone(),
            middle_name: identity.middle_name.clone(),
            last_name: identity.last_name.clone(),
            date_of_birth: identity.date_of_birth.map(fmt_date),
            national_id: identity.national_id.clone(),
            email: identity.email.as_ref().map(ToString::to_string),
        }
    }
}

/// `completed` carries `identity`; `pending` carries `record_id` and `candidate_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RegistrationRes {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<IdentityRes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate_count: Option<usize>,
}

impl From<&RegistrationOutcome> for RegistrationRes {
    fn from(outcome: &RegistrationOutcome) -> Self {
        match outcome {
            RegistrationOutcome::Completed { identity } => Self {
                status: "completed".into(),
                identity: Some(identity.into()),
                record_id: None,
                candidate_count: None,
            },
            RegistrationOutcome::Pending {
                record_id,
                candidate_count,
            } => Self {
                status: "pending".into(),
                identity: None,
                record_id: Some(record_id.to_string()),
                candidate_count: Some(*candidate_count),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct OutcomeRecordRes {
    pub caller_id: String,
    pub request_id: String,
    pub resolved_at: String,
    pub outcome: RegistrationRes,
}

impl From<&IdempotencyRecord> for OutcomeRecordRes {
    fn from(record: &IdempotencyRecord) -> Self {
        Self {
            caller_id: record.key.caller_id.to_string(),
            request_id: record.key.request_id.to_string(),
            resolved_at: record.resolved_at.to_rfc3339(),
            outcome: (&record.outcome).into(),
        }
    }
}

/// `null` (or an absent `date`) clears the status-defining date.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct StatusDateReq {
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct StatusDateRes {
    /// `applied` or `review_queued`
    pub outcome: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&StatusDateOutcome> for StatusDateRes {
    fn from(outcome: &StatusDateOutcome) -> Self {
        match outcome {
            StatusDateOutcome::Applied {
                status,
                status_date,
            } => Self {
                outcome: "applied".into(),
                status: status.as_str().into(),
                status_date: status_date.map(fmt_date),
                reason: None,
            },
            StatusDateOutcome::ReviewQueued { status, reason } => Self {
                outcome: "review_queued".into(),
                status: status.as_str().into(),
                status_date: None,
                reason: Some(reason.clone()),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AppropriateBodyPeriodRes {
    pub body_name: String,
    pub started: String,
    pub ended: Option<String>,
}

impl From<&AppropriateBodyPeriod> for AppropriateBodyPeriodRes {
    fn from(period: &AppropriateBodyPeriod) -> Self {
        Self {
            body_name: period.body_name.clone(),
            started: fmt_date(period.started),
            ended: period.ended.map(fmt_date),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InductionRes {
    pub status: String,
    pub status_date: Option<String>,
    pub status_before_exemption: Option<String>,
    pub qualification_date: Option<String>,
    pub appropriate_body_periods: Vec<AppropriateBodyPeriodRes>,
}

impl From<&InductionView> for InductionRes {
    fn from(view: &InductionView) -> Self {
        Self {
            status: view.status.as_str().into(),
            status_date: view.status_date.map(fmt_date),
            status_before_exemption: view.status_before_exemption.map(|s| s.as_str().into()),
            qualification_date: view.qualification_date.map(fmt_date),
            appropriate_body_periods: view.appropriate_body_periods.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QualifyingEventRes {
    pub awarded: String,
    pub description: String,
}

impl From<&QualifyingEvent> for QualifyingEventRes {
    fn from(event: &QualifyingEvent) -> Self {
        Self {
            awarded: fmt_date(event.awarded),
            description: event.description.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatedNameRes {
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
}

impl From<&StatedName> for StatedNameRes {
    fn from(name: &StatedName) -> Self {
        Self {
            first_name: name.first.clone(),
            middle_name: name.middle.clone(),
            last_name: name.last.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PersonRes {
    pub person_id: String,
    pub trn: String,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub date_of_birth: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub induction: Option<InductionRes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifying_events: Option<Vec<QualifyingEventRes>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stated_name: Option<StatedNameRes>,
}

impl From<&PersonView> for PersonRes {
    fn from(view: &PersonView) -> Self {
        Self {
            person_id: view.person_id.to_string(),
            trn: view.trn.to_string(),
            first_name: view.first_name.clone(),
            middle_name: view.middle_name.clone(),
            last_name: view.last_name.clone(),
            date_of_birth: view.date_of_birth.map(fmt_date),
            email: view.email.as_ref().map(ToString::to_string),
            induction: view.induction.as_ref().map(Into::into),
            qualifying_events: view
                .qualifying_events
                .as_ref()
                .map(|events| events.iter().map(Into::into).collect()),
            stated_name: view.stated_name.as_ref().map(Into::into),
        }
    }
}

/// Error body. `prior` is set on a duplicate submission.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prior: Option<OutcomeRecordRes>,
}

pub(crate) fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field} must be a YYYY-MM-DD date, got '{raw}'"))
}
