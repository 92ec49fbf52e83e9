//! Induction status transitions driven by the status-defining date.
//!
//! A pure decision table. Given what is stored for a person and the incoming set or clear of
//! the date, it either applies the change (possibly forcing `Exempt`) or sends it to review.
//! The rules are an ordered list; the first matching rule decides.

use chrono::NaiveDate;
use register_ids::RecordUuid;

use crate::model::{InductionStatus, QualifyingEvent};
use crate::{RegisterError, RegisterResult};

/// The incoming operation on the status-defining date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DateChange {
    Set(NaiveDate),
    Clear,
}

impl DateChange {
    pub fn from_option(date: Option<NaiveDate>) -> Self {
        match date {
            Some(date) => DateChange::Set(date),
            None => DateChange::Clear,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusTransitionInput {
    pub person_id: RecordUuid,
    pub existing_status: InductionStatus,
    /// What the status was before an earlier forced exemption, if any.
    pub status_before_exemption: Option<InductionStatus>,
    pub has_prerequisite: bool,
    pub open_appropriate_body_period: bool,
    pub existing_date: Option<NaiveDate>,
    pub incoming: DateChange,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionDecision {
    /// Commit the date; `forced_status` replaces the stored status when present.
    Apply {
        forced_status: Option<InductionStatus>,
    },
    /// Do not commit; a person has to decide.
    Review { reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Apply,
    ForceExempt,
    Review(&'static str),
}

type Predicate = fn(&StatusTransitionInput) -> bool;

/// `(name, predicate, outcome)` in precedence order.
const RULES: &[(&str, Predicate, Outcome)] = &[
    (
        "unchanged_date",
        unchanged_date,
        Outcome::Review("the submitted date is already recorded; no change was made"),
    ),
    (
        "set_while_in_progress",
        set_while_in_progress,
        Outcome::Review("induction is currently In Progress"),
    ),
    (
        "set_while_extended_with_open_body",
        set_while_extended_with_open_body,
        Outcome::Review("induction is Extended and an appropriate body period is still open"),
    ),
    (
        "set_while_extended",
        set_while_extended,
        Outcome::ForceExempt,
    ),
    (
        "set_after_failure",
        set_after_failure,
        Outcome::Review("induction has been failed"),
    ),
    (
        "clear_exemption_after_failed_in_wales",
        clear_exemption_after_failed_in_wales,
        Outcome::Review("exemption was granted after induction was failed in Wales"),
    ),
    ("default", always, Outcome::Apply),
];

// Clearing a date that is not there counts as unchanged.
fn unchanged_date(input: &StatusTransitionInput) -> bool {
    match input.incoming {
        DateChange::Set(date) => input.existing_date == Some(date),
        DateChange::Clear => input.existing_date.is_none(),
    }
}

fn set_while_in_progress(input: &StatusTransitionInput) -> bool {
    matches!(input.incoming, DateChange::Set(_))
        && input.existing_status == InductionStatus::InProgress
        && input.existing_date.is_none()
}

fn set_while_extended_with_open_body(input: &StatusTransitionInput) -> bool {
    matches!(input.incoming, DateChange::Set(_))
        && input.existing_status == InductionStatus::Extended
        && input.open_appropriate_body_period
}

fn set_while_extended(input: &StatusTransitionInput) -> bool {
    matches!(input.incoming, DateChange::Set(_))
        && input.existing_status == InductionStatus::Extended
}

fn set_after_failure(input: &StatusTransitionInput) -> bool {
    matches!(input.incoming, DateChange::Set(_))
        && matches!(
            input.existing_status,
            InductionStatus::Fail | InductionStatus::FailedInWales
        )
}

fn clear_exemption_after_failed_in_wales(input: &StatusTransitionInput) -> bool {
    input.incoming == DateChange::Clear
        && input.existing_status == InductionStatus::Exempt
        && input.status_before_exemption == Some(InductionStatus::FailedInWales)
}

fn always(_: &StatusTransitionInput) -> bool {
    true
}

/// Runs the decision table.
///
/// # Errors
///
/// `PrerequisiteMissing` when a date is being set on a person with no qualification date.
pub fn decide(input: &StatusTransitionInput) -> RegisterResult<TransitionDecision> {
    if matches!(input.incoming, DateChange::Set(_)) && !input.has_prerequisite {
        return Err(RegisterError::PrerequisiteMissing(input.person_id));
    }

    let (rule, outcome) = RULES
        .iter()
        .find(|(_, predicate, _)| predicate(input))
        .map(|(name, _, outcome)| (*name, *outcome))
        .unwrap_or(("default", Outcome::Apply));

    tracing::debug!(person_id = %input.person_id, rule, "status rule fired");

    Ok(match outcome {
        Outcome::Apply => TransitionDecision::Apply {
            forced_status: None,
        },
        Outcome::ForceExempt => TransitionDecision::Apply {
            forced_status: Some(InductionStatus::Exempt),
        },
        Outcome::Review(reason) => TransitionDecision::Review {
            reason: reason.to_string(),
        },
    })
}

/// The date stored once `change` is applied.
///
/// Clearing falls back to the earliest qualifying event other than the one that set the date
/// being cleared, or nothing if none remain. A date that is cleared never comes straight back.
pub fn resulting_date(
    change: DateChange,
    existing_date: Option<NaiveDate>,
    events: &[QualifyingEvent],
) -> Option<NaiveDate> {
    match change {
        DateChange::Set(date) => Some(date),
        DateChange::Clear => events
            .iter()
            .map(|event| event.awarded)
            .filter(|awarded| Some(*awarded) != existing_date)
            .min(),
    }
}
