//! Candidate matching against the system of record.
//!
//! Matching is disjunctive across attribute categories: a person is a candidate when it matches
//! on (any expanded first name AND last name AND date of birth) OR any submitted email OR the
//! national ID, either the person's own field or the cross-reference table. There is no score.
//! The store may over-return; the categories recorded on each candidate are computed here.

use register_ids::RecordUuid;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::adapter::SerializedAdapter;
use crate::model::{Candidate, MatchedAttribute, MatchedAttributes, PersonIdentity};
use crate::normalize::normalize_national_id;
use crate::store::{CandidateQuery, CrossReferenceStore, PersonStore};
use crate::RegisterResult;

#[derive(Clone)]
pub struct CandidateMatcher {
    persons: Arc<SerializedAdapter<dyn PersonStore>>,
    cross_reference: Arc<dyn CrossReferenceStore>,
}

impl CandidateMatcher {
    pub fn new(
        persons: Arc<SerializedAdapter<dyn PersonStore>>,
        cross_reference: Arc<dyn CrossReferenceStore>,
    ) -> Self {
        Self {
            persons,
            cross_reference,
        }
    }

    /// Returns one candidate per matching person, ordered by person id.
    ///
    /// The record-store query and the cross-reference lookup run concurrently. Persons found
    /// only through the cross-reference are then fetched within the same adapter session.
    ///
    /// # Errors
    ///
    /// Whatever either store reports; a partial result is never returned.
    pub async fn find_candidates(&self, query: &CandidateQuery) -> RegisterResult<Vec<Candidate>> {
        let session = self.persons.session().await;

        let xref_lookup = async {
            match query.national_id.as_deref() {
                Some(national_id) => {
                    self.cross_reference
                        .person_ids_for_national_id(national_id)
                        .await
                }
                None => Ok(BTreeSet::new()),
            }
        };
        let (direct, xref_ids) = tokio::join!(session.find_candidates(query), xref_lookup);
        let direct = direct?;
        let xref_ids = xref_ids?;

        let mut persons: BTreeMap<RecordUuid, PersonIdentity> = direct
            .into_iter()
            .map(|person| (person.person_id, person))
            .collect();

        let missing: Vec<RecordUuid> = xref_ids
            .iter()
            .filter(|id| !persons.contains_key(id))
            .copied()
            .collect();
        if !missing.is_empty() {
            for person in session.get_persons(&missing).await? {
                persons.entry(person.person_id).or_insert(person);
            }
        }
        drop(session);

        let candidates: Vec<Candidate> = persons
            .into_values()
            .filter_map(|person| {
                let matched = matched_attributes(&person, query, &xref_ids);
                if matched.is_empty() {
                    None
                } else {
                    Some(Candidate { person, matched })
                }
            })
            .collect();

        tracing::debug!(
            candidates = candidates.len(),
            cross_referenced = xref_ids.len(),
            "candidate search complete"
        );
        Ok(candidates)
    }
}

/// Every attribute category on which `person` matches `query`.
pub fn matched_attributes(
    person: &PersonIdentity,
    query: &CandidateQuery,
    cross_referenced: &BTreeSet<RecordUuid>,
) -> MatchedAttributes {
    let mut matched = MatchedAttributes::new();

    if let Some(national_id) = query.national_id.as_deref() {
        let direct = person
            .national_id
            .as_deref()
            .map(normalize_national_id)
            .is_some_and(|id| id == national_id);
        if direct || cross_referenced.contains(&person.person_id) {
            matched.insert(MatchedAttribute::NationalId);
        }
    }

    let same_dob = person.date_of_birth == Some(query.date_of_birth);
    if same_dob {
        matched.insert(MatchedAttribute::DateOfBirth);
    }

    let first = person.name.first.trim().to_lowercase();
    let same_name = !first.is_empty()
        && query.first_names.contains(&first)
        && !query.last_name.is_empty()
        && person.name.last.trim().to_lowercase() == query.last_name;
    if same_name && same_dob {
        matched.insert(MatchedAttribute::Name);
    }

    if person
        .email
        .as_ref()
        .is_some_and(|email| query.emails.contains(email))
    {
        matched.insert(MatchedAttribute::Email);
    }

    // A date of birth on its own selects nobody.
    if matched.iter().all(|a| a == MatchedAttribute::DateOfBirth) {
        return MatchedAttributes::new();
    }
    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{person, MemoryRegister};
    use chrono::NaiveDate;
    use register_types::EmailAddress;

    fn dob() -> NaiveDate {
        NaiveDate::from_ymd_opt(1990, 5, 23).unwrap()
    }

    fn query() -> CandidateQuery {
        CandidateQuery {
            first_names: ["minnie".to_string(), "min".to_string()].into_iter().collect(),
            middle_name: String::new(),
            last_name: "driver".into(),
            date_of_birth: dob(),
            emails: vec![],
            national_id: Some("AB123456C".into()),
        }
    }

    fn matcher(register: &Arc<MemoryRegister>) -> CandidateMatcher {
        let store: Arc<dyn PersonStore> = register.clone();
        CandidateMatcher::new(Arc::new(SerializedAdapter::new(store)), register.clone())
    }

    #[test]
    fn test_matched_attributes_name_requires_dob() {
        let mut p = person("Min", "Driver", Some(dob()));
        let q = query();
        let got = matched_attributes(&p, &q, &BTreeSet::new());
        assert!(got.contains_all(&[MatchedAttribute::Name, MatchedAttribute::DateOfBirth]));

        p.date_of_birth = NaiveDate::from_ymd_opt(1991, 1, 1);
        assert!(matched_attributes(&p, &q, &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_matched_attributes_dob_alone_is_not_a_match() {
        let p = person("Alice", "Smith", Some(dob()));
        assert!(matched_attributes(&p, &query(), &BTreeSet::new()).is_empty());
    }

    #[test]
    fn test_matched_attributes_national_id_is_normalised_on_the_person_side() {
        let mut p = person("Alice", "Smith", Some(dob()));
        p.national_id = Some("ab 12 34 56 c".into());
        let got = matched_attributes(&p, &query(), &BTreeSet::new());
        assert!(got.contains_all(&[MatchedAttribute::NationalId, MatchedAttribute::DateOfBirth]));
        assert!(!got.contains(MatchedAttribute::Name));
    }

    #[test]
    fn test_matched_attributes_email() {
        let mut p = person("Alice", "Smith", None);
        p.email = Some(EmailAddress::parse("alice@example.com").unwrap());
        let mut q = query();
        q.emails = vec![EmailAddress::parse("Alice@Example.com").unwrap()];
        let got = matched_attributes(&p, &q, &BTreeSet::new());
        assert_eq!(got.iter().collect::<Vec<_>>(), vec![MatchedAttribute::Email]);
    }

    #[tokio::test]
    async fn test_cross_reference_and_name_match_union_onto_one_candidate() {
        let register = Arc::new(MemoryRegister::new());
        let p = person("Minnie", "Driver", Some(dob()));
        let id = p.person_id;
        register.seed_person(p);
        register.link_national_id("AB123456C", id);

        let candidates = matcher(&register).find_candidates(&query()).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].matched.contains_all(&[
            MatchedAttribute::NationalId,
            MatchedAttribute::DateOfBirth,
            MatchedAttribute::Name,
        ]));
    }

    #[tokio::test]
    async fn test_cross_reference_only_person_is_fetched() {
        let register = Arc::new(MemoryRegister::new());
        let p = person("Someone", "Else", Some(dob()));
        let id = p.person_id;
        register.seed_person(p);
        register.link_national_id("AB123456C", id);

        let candidates = matcher(&register).find_candidates(&query()).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].person_id(), id);
        assert!(candidates[0].matched.contains(MatchedAttribute::NationalId));
        assert!(!candidates[0].matched.contains(MatchedAttribute::Name));
    }

    #[tokio::test]
    async fn test_store_failure_fails_the_search() {
        let register = Arc::new(MemoryRegister::new());
        register.seed_person(person("Minnie", "Driver", Some(dob())));
        register.set_unavailable(true);

        let err = matcher(&register).find_candidates(&query()).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
