//! Duplicate resolution over the matcher's candidates.
//!
//! The rules form an ordered list evaluated top-down; the first rule whose predicate holds
//! decides. National ID together with date of birth is the only pair that auto-merges. Anything
//! weaker goes to a human.

use crate::model::{Candidate, MatchedAttribute, ResolvedIdentity};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionKind {
    Completed,
    Pending,
    New,
}

/// The decision for one intake.
#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// The request is this existing person.
    Completed(&'a Candidate),
    /// Partial matches only; the whole list goes to review.
    Pending(&'a [Candidate]),
    /// Nobody matched.
    New,
}

impl Resolution<'_> {
    pub fn kind(&self) -> ResolutionKind {
        match self {
            Resolution::Completed(_) => ResolutionKind::Completed,
            Resolution::Pending(_) => ResolutionKind::Pending,
            Resolution::New => ResolutionKind::New,
        }
    }
}

type Predicate = fn(&[Candidate]) -> bool;

/// `(name, predicate, outcome)` in precedence order.
pub const RULES: &[(&str, Predicate, ResolutionKind)] = &[
    (
        "national_id_and_date_of_birth",
        any_definitive,
        ResolutionKind::Completed,
    ),
    ("any_candidate", any_candidate, ResolutionKind::Pending),
    ("no_candidates", always, ResolutionKind::New),
];

fn is_definitive(candidate: &Candidate) -> bool {
    candidate
        .matched
        .contains_all(&[MatchedAttribute::NationalId, MatchedAttribute::DateOfBirth])
}

fn any_definitive(candidates: &[Candidate]) -> bool {
    candidates.iter().any(is_definitive)
}

fn any_candidate(candidates: &[Candidate]) -> bool {
    !candidates.is_empty()
}

fn always(_: &[Candidate]) -> bool {
    true
}

/// Applies the rules to `candidates`.
///
/// When several candidates match definitively the first in the given order wins; the matcher
/// orders by person id, so the choice is stable.
pub fn resolve(candidates: &[Candidate]) -> Resolution<'_> {
    let (rule, kind) = RULES
        .iter()
        .find(|(_, predicate, _)| predicate(candidates))
        .map(|(name, _, kind)| (*name, *kind))
        .unwrap_or(("no_candidates", ResolutionKind::New));

    tracing::debug!(rule, candidates = candidates.len(), "resolution rule fired");

    match kind {
        ResolutionKind::Completed => match candidates.iter().find(|c| is_definitive(c)) {
            Some(candidate) => Resolution::Completed(candidate),
            None => Resolution::Pending(candidates),
        },
        ResolutionKind::Pending => Resolution::Pending(candidates),
        ResolutionKind::New => Resolution::New,
    }
}

/// The identity returned to the caller for a completed match.
///
/// Stated names win over canonical ones only when both stated first and last are present.
pub fn resolved_identity(candidate: &Candidate) -> ResolvedIdentity {
    let person = &candidate.person;
    let name = person
        .stated_name
        .usable()
        .unwrap_or_else(|| person.name.clone());

    ResolvedIdentity {
        person_id: person.person_id,
        trn: person.trn.clone(),
        first_name: name.first,
        middle_name: name.middle,
        last_name: name.last,
        date_of_birth: person.date_of_birth,
        national_id: person.national_id.clone(),
        email: person.email.clone(),
    }
}
