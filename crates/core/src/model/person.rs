//! The person aggregate and its induction-related parts.

use chrono::NaiveDate;
use register_ids::{RecordUuid, Trn};
use register_types::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::RegisterError;

/// Professional induction status. Exactly one applies to a person at a time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InductionStatus {
    InProgress,
    Extended,
    Fail,
    FailedInWales,
    Exempt,
    NotYetCompleted,
    Pass,
    PassedInWales,
    RequiredToComplete,
}

impl InductionStatus {
    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            InductionStatus::InProgress => "in_progress",
            InductionStatus::Extended => "extended",
            InductionStatus::Fail => "fail",
            InductionStatus::FailedInWales => "failed_in_wales",
            InductionStatus::Exempt => "exempt",
            InductionStatus::NotYetCompleted => "not_yet_completed",
            InductionStatus::Pass => "pass",
            InductionStatus::PassedInWales => "passed_in_wales",
            InductionStatus::RequiredToComplete => "required_to_complete",
        }
    }

    /// Name used in review-task reasons.
    pub fn title(self) -> &'static str {
        match self {
            InductionStatus::InProgress => "In Progress",
            InductionStatus::Extended => "Extended",
            InductionStatus::Fail => "Fail",
            InductionStatus::FailedInWales => "Failed in Wales",
            InductionStatus::Exempt => "Exempt",
            InductionStatus::NotYetCompleted => "Not Yet Completed",
            InductionStatus::Pass => "Pass",
            InductionStatus::PassedInWales => "Passed in Wales",
            InductionStatus::RequiredToComplete => "Required to Complete",
        }
    }
}

impl fmt::Display for InductionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

impl FromStr for InductionStatus {
    type Err = RegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "in_progress" => InductionStatus::InProgress,
            "extended" => InductionStatus::Extended,
            "fail" => InductionStatus::Fail,
            "failed_in_wales" => InductionStatus::FailedInWales,
            "exempt" => InductionStatus::Exempt,
            "not_yet_completed" => InductionStatus::NotYetCompleted,
            "pass" => InductionStatus::Pass,
            "passed_in_wales" => InductionStatus::PassedInWales,
            "required_to_complete" => InductionStatus::RequiredToComplete,
            other => {
                return Err(RegisterError::InvalidInput(format!(
                    "unknown induction status '{other}'"
                )))
            }
        };
        Ok(status)
    }
}

/// A person's canonical name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonName {
    pub first: String,
    pub middle: String,
    pub last: String,
}

/// Name values as a caller originally stated them, when recorded.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatedName {
    pub first: Option<String>,
    pub middle: Option<String>,
    pub last: Option<String>,
}

impl StatedName {
    /// The stated name is only usable when both first and last were recorded.
    pub fn usable(&self) -> Option<PersonName> {
        match (&self.first, &self.last) {
            (Some(first), Some(last)) if !first.is_empty() && !last.is_empty() => {
                Some(PersonName {
                    first: first.clone(),
                    middle: self.middle.clone().unwrap_or_default(),
                    last: last.clone(),
                })
            }
            _ => None,
        }
    }
}

/// The person aggregate as held by the system of record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonIdentity {
    pub person_id: RecordUuid,
    pub trn: Trn,
    pub name: PersonName,
    pub stated_name: StatedName,
    pub date_of_birth: Option<NaiveDate>,
    pub national_id: Option<String>,
    pub email: Option<EmailAddress>,
    /// The prerequisite qualifying date. Without it no status-defining date may be set.
    pub qualification_date: Option<NaiveDate>,
    pub induction_status: InductionStatus,
    /// The status held immediately before the person was last forced to `Exempt`.
    pub status_before_exemption: Option<InductionStatus>,
    /// The governing status-defining date.
    pub status_date: Option<NaiveDate>,
    /// Optimistic concurrency token, bumped on every status write.
    pub version: u64,
}

/// A qualification event recorded against a person by another workflow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualifyingEvent {
    pub awarded: NaiveDate,
    pub description: String,
}

/// A period during which an appropriate body supervises the person's induction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppropriateBodyPeriod {
    pub body_name: String,
    pub started: NaiveDate,
    pub ended: Option<NaiveDate>,
}

impl AppropriateBodyPeriod {
    /// Open means no end date has been recorded.
    pub fn is_open(&self) -> bool {
        self.ended.is_none()
    }
}

/// A compare-and-set write of the status fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub person_id: RecordUuid,
    pub expected_version: u64,
    pub induction_status: InductionStatus,
    pub status_before_exemption: Option<InductionStatus>,
    pub status_date: Option<NaiveDate>,
}
