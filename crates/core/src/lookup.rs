//! Person lookup by TRN with opt-in includes.
//!
//! Each [`PersonInclude`] maps to exactly one optional fetch; a view built without it leaves
//! the corresponding field `None`.

use chrono::NaiveDate;
use register_ids::{RecordUuid, Trn};
use register_types::EmailAddress;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::adapter::SerializedAdapter;
use crate::constants::{INCLUDE_INDUCTION, INCLUDE_QUALIFYING_EVENTS, INCLUDE_STATED_NAMES};
use crate::model::{AppropriateBodyPeriod, InductionStatus, QualifyingEvent, StatedName};
use crate::store::PersonStore;
use crate::{RegisterError, RegisterResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonInclude {
    Induction,
    QualifyingEvents,
    StatedNames,
}

impl PersonInclude {
    pub fn as_str(self) -> &'static str {
        match self {
            PersonInclude::Induction => INCLUDE_INDUCTION,
            PersonInclude::QualifyingEvents => INCLUDE_QUALIFYING_EVENTS,
            PersonInclude::StatedNames => INCLUDE_STATED_NAMES,
        }
    }

    /// Parses a comma-separated include list. Blank entries are ignored.
    pub fn parse_list(input: &str) -> RegisterResult<Vec<PersonInclude>> {
        let includes: BTreeSet<PersonInclude> = input
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PersonInclude::from_str)
            .collect::<RegisterResult<_>>()?;
        Ok(includes.into_iter().collect())
    }
}

impl fmt::Display for PersonInclude {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PersonInclude {
    type Err = RegisterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            INCLUDE_INDUCTION => Ok(PersonInclude::Induction),
            INCLUDE_QUALIFYING_EVENTS => Ok(PersonInclude::QualifyingEvents),
            INCLUDE_STATED_NAMES => Ok(PersonInclude::StatedNames),
            other => Err(RegisterError::InvalidInput(format!(
                "unknown include '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InductionView {
    pub status: InductionStatus,
    pub status_date: Option<NaiveDate>,
    pub status_before_exemption: Option<InductionStatus>,
    pub qualification_date: Option<NaiveDate>,
    pub appropriate_body_periods: Vec<AppropriateBodyPeriod>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonView {
    pub person_id: RecordUuid,
    pub trn: Trn,
    pub first_name: String,
    pub middle_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub email: Option<EmailAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub induction: Option<InductionView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualifying_events: Option<Vec<QualifyingEvent>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stated_name: Option<StatedName>,
}

#[derive(Clone)]
pub struct PersonLookup {
    persons: Arc<SerializedAdapter<dyn PersonStore>>,
}

impl PersonLookup {
    pub fn new(persons: Arc<SerializedAdapter<dyn PersonStore>>) -> Self {
        Self { persons }
    }

    /// # Errors
    ///
    /// `NotFound` when no person holds `trn`.
    pub async fn get(&self, trn: &Trn, includes: &[PersonInclude]) -> RegisterResult<PersonView> {
        let session = self.persons.session().await;
        let person = session
            .get_person_by_trn(trn)
            .await?
            .ok_or_else(|| RegisterError::NotFound(format!("person with TRN {trn}")))?;

        let mut view = PersonView {
            person_id: person.person_id,
            trn: person.trn.clone(),
            first_name: person.name.first.clone(),
            middle_name: person.name.middle.clone(),
            last_name: person.name.last.clone(),
            date_of_birth: person.date_of_birth,
            email: person.email.clone(),
            induction: None,
            qualifying_events: None,
            stated_name: None,
        };

        for include in includes {
            match include {
                PersonInclude::Induction => {
                    let periods = session.appropriate_body_periods(person.person_id).await?;
                    view.induction = Some(InductionView {
                        status: person.induction_status,
                        status_date: person.status_date,
                        status_before_exemption: person.status_before_exemption,
                        qualification_date: person.qualification_date,
                        appropriate_body_periods: periods,
                    });
                }
                PersonInclude::QualifyingEvents => {
                    view.qualifying_events =
                        Some(session.qualifying_events(person.person_id).await?);
                }
                PersonInclude::StatedNames => {
                    view.stated_name = Some(person.stated_name.clone());
                }
            }
        }
        Ok(view)
    }
}
