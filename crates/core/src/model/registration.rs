//! Registration intake types: the request, candidates, outcomes and the records committed for
//! them.

use chrono::{DateTime, NaiveDate, Utc};
use register_ids::{RecordUuid, Trn};
use register_types::{CallerId, EmailAddress, RequestId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::person::{PersonIdentity, PersonName, StatedName};

/// The (caller, request id) pair guaranteeing exactly-once processing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdempotencyKey {
    pub caller_id: CallerId,
    pub request_id: RequestId,
}

impl IdempotencyKey {
    pub fn new(caller_id: CallerId, request_id: RequestId) -> Self {
        Self {
            caller_id,
            request_id,
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.caller_id, self.request_id)
    }
}

/// A request to register a person, exactly as the caller stated it.
///
/// Never mutated after intake; normalisation produces a separate value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    pub key: IdempotencyKey,
    pub first_name: String,
    #[serde(default)]
    pub middle_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    #[serde(default)]
    pub emails: Vec<EmailAddress>,
    #[serde(default)]
    pub national_id: Option<String>,
}

/// Attribute categories a candidate can match on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchedAttribute {
    NationalId,
    DateOfBirth,
    Name,
    Email,
}

/// The set of categories a candidate matched on.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchedAttributes(BTreeSet<MatchedAttribute>);

impl MatchedAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: MatchedAttribute) {
        self.0.insert(attribute);
    }

    pub fn contains(&self, attribute: MatchedAttribute) -> bool {
        self.0.contains(&attribute)
    }

    pub fn contains_all(&self, attributes: &[MatchedAttribute]) -> bool {
        attributes.iter().all(|a| self.0.contains(a))
    }

    pub fn union_with(&mut self, other: &MatchedAttributes) {
        self.0.extend(other.0.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MatchedAttribute> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<MatchedAttribute> for MatchedAttributes {
    fn from_iter<I: IntoIterator<Item = MatchedAttribute>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// An existing person that plausibly corresponds to a request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub person: PersonIdentity,
    pub matched: MatchedAttributes,
}

impl Candidate {
    pub fn person_id(&self) -> RecordUuid {
        self.person.person_id
    }
}

/// The identity handed back on a completed registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIdentity {
    pub person_id: RecordUuid,
    pub trn: Trn,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub national_id: Option<String>,
    pub email: Option<EmailAddress>,
}

/// Final outcome of a registration request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// The request resolved to a single identity, either existing or newly issued.
    Completed { identity: ResolvedIdentity },
    /// Potential duplicates were found; a reviewer must disambiguate.
    Pending {
        record_id: RecordUuid,
        candidate_count: usize,
    },
}

/// The permanent record of how an idempotency key was resolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: IdempotencyKey,
    pub outcome: RegistrationOutcome,
    pub resolved_at: DateTime<Utc>,
}

impl fmt::Display for IdempotencyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "request {} was already resolved at {}",
            self.key,
            self.resolved_at.to_rfc3339()
        )
    }
}

/// A freshly issued person, written on the no-match path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewPerson {
    pub person_id: RecordUuid,
    pub trn: Trn,
    pub name: PersonName,
    pub stated_name: StatedName,
    pub date_of_birth: NaiveDate,
    pub national_id: Option<String>,
    pub email: Option<EmailAddress>,
    /// Candidates considered when the identifier was issued. Always empty today; kept for audit.
    pub considered_candidates: Vec<RecordUuid>,
}

/// An intake that could not be resolved automatically. Holds no identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedRegistration {
    pub record_id: RecordUuid,
    pub request: RegistrationRequest,
    pub candidates: Vec<Candidate>,
}

/// Everything written for one intake. The store commits each variant atomically together
/// with its [`IdempotencyRecord`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationCommit {
    /// Resolved to an existing person; only the idempotency record is written.
    Existing { record: IdempotencyRecord },
    NewPerson {
        person: NewPerson,
        record: IdempotencyRecord,
    },
    Unresolved {
        registration: UnresolvedRegistration,
        record: IdempotencyRecord,
    },
}

impl RegistrationCommit {
    pub fn record(&self) -> &IdempotencyRecord {
        match self {
            RegistrationCommit::Existing { record }
            | RegistrationCommit::NewPerson { record, .. }
            | RegistrationCommit::Unresolved { record, .. } => record,
        }
    }
}
