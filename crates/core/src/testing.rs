//! In-memory doubles of every port, for tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use register_ids::{RecordUuid, Trn};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::idempotency::IdempotencyStore;
use crate::issuer::IdentifierIssuer;
use crate::model::{
    AppropriateBodyPeriod, IdempotencyKey, IdempotencyRecord, InductionStatus, PersonIdentity,
    PersonName, QualifyingEvent, RegistrationCommit, StatedName, StatusUpdate,
    UnresolvedRegistration,
};
use crate::normalize::normalize_national_id;
use crate::review::{ReviewTask, ReviewTaskSink};
use crate::store::{CandidateQuery, CrossReferenceStore, PersonStore};
use crate::{RegisterError, RegisterResult};

/// A person with a fresh id and TRN and status `RequiredToComplete`.
pub fn person(first: &str, last: &str, date_of_birth: Option<NaiveDate>) -> PersonIdentity {
    static NEXT: AtomicU64 = AtomicU64::new(9_000_000);
    let trn = Trn::from_sequence(NEXT.fetch_add(1, Ordering::SeqCst))
        .unwrap_or_else(|e| panic!("test TRN out of range: {e}"));
    PersonIdentity {
        person_id: RecordUuid::new(),
        trn,
        name: PersonName {
            first: first.into(),
            middle: String::new(),
            last: last.into(),
        },
        stated_name: StatedName::default(),
        date_of_birth,
        national_id: None,
        email: None,
        qualification_date: None,
        induction_status: InductionStatus::RequiredToComplete,
        status_before_exemption: None,
        status_date: None,
        version: 0,
    }
}

#[derive(Default)]
struct State {
    persons: BTreeMap<RecordUuid, PersonIdentity>,
    events: HashMap<RecordUuid, Vec<QualifyingEvent>>,
    periods: HashMap<RecordUuid, Vec<AppropriateBodyPeriod>>,
    xref: HashMap<String, BTreeSet<RecordUuid>>,
    records: HashMap<IdempotencyKey, IdempotencyRecord>,
    unresolved: Vec<UnresolvedRegistration>,
    considered: HashMap<RecordUuid, Vec<RecordUuid>>,
    reviews: Vec<ReviewTask>,
}

pub struct MemoryRegister {
    state: Mutex<State>,
    issued: AtomicU64,
    unavailable: AtomicBool,
    fail_commits: AtomicU64,
    fail_reviews: AtomicBool,
}

impl Default for MemoryRegister {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRegister {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            issued: AtomicU64::new(0),
            unavailable: AtomicBool::new(false),
            fail_commits: AtomicU64::new(0),
            fail_reviews: AtomicBool::new(false),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> RegisterResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegisterError::UpstreamUnavailable(
                "memory register is offline".into(),
            ));
        }
        Ok(())
    }

    pub fn seed_person(&self, person: PersonIdentity) {
        self.state().persons.insert(person.person_id, person);
    }

    pub fn add_qualifying_event(&self, person_id: RecordUuid, event: QualifyingEvent) {
        self.state().events.entry(person_id).or_default().push(event);
    }

    pub fn add_appropriate_body_period(&self, person_id: RecordUuid, period: AppropriateBodyPeriod) {
        self.state().periods.entry(person_id).or_default().push(period);
    }

    pub fn link_national_id(&self, national_id: &str, person_id: RecordUuid) {
        self.state()
            .xref
            .entry(normalize_national_id(national_id))
            .or_default()
            .insert(person_id);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// The next `count` registration commits fail as if the store went away.
    pub fn fail_next_commits(&self, count: u64) {
        self.fail_commits.store(count, Ordering::SeqCst);
    }

    pub fn set_review_sink_failing(&self, failing: bool) {
        self.fail_reviews.store(failing, Ordering::SeqCst);
    }

    pub fn issued_count(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub fn person_count(&self) -> usize {
        self.state().persons.len()
    }

    pub fn person(&self, person_id: RecordUuid) -> Option<PersonIdentity> {
        self.state().persons.get(&person_id).cloned()
    }

    pub fn persons_by_trn(&self, trn: &Trn) -> Vec<PersonIdentity> {
        self.state()
            .persons
            .values()
            .filter(|p| &p.trn == trn)
            .cloned()
            .collect()
    }

    pub fn unresolved(&self) -> Vec<UnresolvedRegistration> {
        self.state().unresolved.clone()
    }

    pub fn considered_candidates(&self, person_id: RecordUuid) -> Option<Vec<RecordUuid>> {
        self.state().considered.get(&person_id).cloned()
    }

    pub fn review_tasks(&self) -> Vec<ReviewTask> {
        self.state().reviews.clone()
    }
}

#[async_trait]
impl PersonStore for MemoryRegister {
    async fn find_candidates(&self, query: &CandidateQuery) -> RegisterResult<Vec<PersonIdentity>> {
        self.check_available()?;
        let state = self.state();
        Ok(state
            .persons
            .values()
            .filter(|p| {
                let by_name = query.first_names.contains(&p.name.first.to_lowercase())
                    && p.name.last.to_lowercase() == query.last_name
                    && p.date_of_birth == Some(query.date_of_birth);
                let by_email = p
                    .email
                    .as_ref()
                    .is_some_and(|e| query.emails.contains(e));
                let by_id = match (&query.national_id, &p.national_id) {
                    (Some(q), Some(id)) => &normalize_national_id(id) == q,
                    _ => false,
                };
                by_name || by_email || by_id
            })
            .cloned()
            .collect())
    }

    async fn get_persons(&self, ids: &[RecordUuid]) -> RegisterResult<Vec<PersonIdentity>> {
        self.check_available()?;
        let state = self.state();
        Ok(ids
            .iter()
            .filter_map(|id| state.persons.get(id).cloned())
            .collect())
    }

    async fn get_person(&self, person_id: RecordUuid) -> RegisterResult<Option<PersonIdentity>> {
        self.check_available()?;
        Ok(self.state().persons.get(&person_id).cloned())
    }

    async fn get_person_by_trn(&self, trn: &Trn) -> RegisterResult<Option<PersonIdentity>> {
        self.check_available()?;
        Ok(self.persons_by_trn(trn).into_iter().next())
    }

    async fn qualifying_events(&self, person_id: RecordUuid) -> RegisterResult<Vec<QualifyingEvent>> {
        self.check_available()?;
        Ok(self.state().events.get(&person_id).cloned().unwrap_or_default())
    }

    async fn appropriate_body_periods(
        &self,
        person_id: RecordUuid,
    ) -> RegisterResult<Vec<AppropriateBodyPeriod>> {
        self.check_available()?;
        Ok(self.state().periods.get(&person_id).cloned().unwrap_or_default())
    }

    async fn update_status(&self, update: StatusUpdate) -> RegisterResult<()> {
        self.check_available()?;
        let mut state = self.state();
        let person = state
            .persons
            .get_mut(&update.person_id)
            .ok_or_else(|| RegisterError::NotFound(format!("person {}", update.person_id)))?;
        if person.version != update.expected_version {
            return Err(RegisterError::ConcurrentModification(update.person_id));
        }
        person.induction_status = update.induction_status;
        person.status_before_exemption = update.status_before_exemption;
        person.status_date = update.status_date;
        person.version += 1;
        Ok(())
    }

    async fn commit_registration(&self, commit: RegistrationCommit) -> RegisterResult<()> {
        self.check_available()?;
        if self
            .fail_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(RegisterError::UpstreamUnavailable(
                "memory register dropped the write".into(),
            ));
        }

        let mut state = self.state();
        if let Some(existing) = state.records.get(&commit.record().key) {
            return Err(RegisterError::DuplicateSubmission(Box::new(existing.clone())));
        }

        match commit {
            RegistrationCommit::Existing { record } => {
                state.records.insert(record.key.clone(), record);
            }
            RegistrationCommit::NewPerson { person, record } => {
                if state.persons.values().any(|p| p.trn == person.trn) {
                    return Err(RegisterError::IdentifierCollision(person.trn));
                }
                state
                    .considered
                    .insert(person.person_id, person.considered_candidates.clone());
                state.persons.insert(
                    person.person_id,
                    PersonIdentity {
                        person_id: person.person_id,
                        trn: person.trn,
                        name: person.name,
                        stated_name: person.stated_name,
                        date_of_birth: Some(person.date_of_birth),
                        national_id: person.national_id,
                        email: person.email,
                        qualification_date: None,
                        induction_status: InductionStatus::RequiredToComplete,
                        status_before_exemption: None,
                        status_date: None,
                        version: 0,
                    },
                );
                state.records.insert(record.key.clone(), record);
            }
            RegistrationCommit::Unresolved {
                registration,
                record,
            } => {
                state.unresolved.push(registration);
                state.records.insert(record.key.clone(), record);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CrossReferenceStore for MemoryRegister {
    async fn person_ids_for_national_id(
        &self,
        national_id: &str,
    ) -> RegisterResult<BTreeSet<RecordUuid>> {
        self.check_available()?;
        Ok(self.state().xref.get(national_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl IdempotencyStore for MemoryRegister {
    async fn get_record(&self, key: &IdempotencyKey) -> RegisterResult<Option<IdempotencyRecord>> {
        self.check_available()?;
        Ok(self.state().records.get(key).cloned())
    }
}

#[async_trait]
impl IdentifierIssuer for MemoryRegister {
    async fn issue(&self) -> RegisterResult<String> {
        self.check_available()?;
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}", 1_000_000 + n))
    }
}

#[async_trait]
impl ReviewTaskSink for MemoryRegister {
    async fn enqueue(&self, task: ReviewTask) -> RegisterResult<()> {
        if self.fail_reviews.load(Ordering::SeqCst) {
            return Err(RegisterError::UpstreamUnavailable(
                "review queue is offline".into(),
            ));
        }
        self.state().reviews.push(task);
        Ok(())
    }
}
