//! SQLite-backed register.
//!
//! One connection behind a mutex; every port call runs its SQL on the blocking pool. The
//! idempotency record and whatever the intake created are written in one immediate
//! transaction, with the unique index on `(caller_id, request_id)` as the final arbiter
//! between racing instances.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use register_core::idempotency::IdempotencyStore;
use register_core::issuer::IdentifierIssuer;
use register_core::model::{
    AppropriateBodyPeriod, IdempotencyKey, IdempotencyRecord, InductionStatus, MatchedAttributes,
    NewPerson, PersonIdentity, PersonName, QualifyingEvent, RegistrationCommit,
    RegistrationOutcome, StatedName, StatusUpdate, UnresolvedRegistration,
};
use register_core::normalize::normalize_national_id;
use register_core::review::{ReviewCategory, ReviewSubject, ReviewTask, ReviewTaskSink};
use register_core::store::{CandidateQuery, CrossReferenceStore, PersonStore};
use register_core::synonyms::SynonymProvider;
use register_core::{RegisterError, RegisterPorts, RegisterResult};
use register_ids::{RecordUuid, Trn};
use register_types::EmailAddress;

use crate::config::SqliteStoreConfig;
use crate::error::{SqliteResult, SqliteStoreError};
use crate::schema::{initialize_schema, open_connection};

/// First value handed out by the identifier sequence is `TRN_OFFSET + 1`.
const TRN_OFFSET: u64 = 1_000_000;

const PERSON_COLUMNS: &str = "person_id, trn, first_name, middle_name, last_name, \
    stated_first_name, stated_middle_name, stated_last_name, date_of_birth, national_id, email, \
    qualification_date, induction_status, status_before_exemption, status_date, version";

#[derive(Clone)]
pub struct SqliteRegister {
    config: SqliteStoreConfig,
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRegister {
    /// Opens (creating if needed) the database at `config.path`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or its schema version
    /// is not the one this build understands.
    pub fn open(config: SqliteStoreConfig) -> SqliteResult<Self> {
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        tracing::info!(path = %config.path.display(), "sqlite register opened");
        Ok(Self {
            config,
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    pub fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Wires this store into every storage-facing port; synonyms come from elsewhere.
    pub fn ports(&self, synonyms: Arc<dyn SynonymProvider>) -> RegisterPorts {
        let store = Arc::new(self.clone());
        RegisterPorts {
            persons: store.clone(),
            cross_reference: store.clone(),
            idempotency: store.clone(),
            issuer: store.clone(),
            synonyms,
            reviews: store,
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> SqliteResult<T>) -> SqliteResult<T> {
        let mut guard = self
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
        f(&mut *guard)
    }

    async fn run<T, F>(&self, f: F) -> RegisterResult<T>
    where
        F: FnOnce(&mut Connection) -> SqliteResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))?;
            f(&mut *guard)
        })
        .await
        .map_err(|err| SqliteStoreError::Io(format!("blocking task failed: {err}")))?;
        result.map_err(RegisterError::from)
    }

    // Seeding, for the workflows that own person data outside intake.

    /// Inserts a person exactly as given, including status fields and version.
    pub fn insert_person(&self, person: &PersonIdentity) -> SqliteResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO persons (person_id, trn, first_name, middle_name, last_name, \
                 first_name_folded, last_name_folded, stated_first_name, stated_middle_name, \
                 stated_last_name, date_of_birth, national_id, national_id_normalized, email, \
                 qualification_date, induction_status, status_before_exemption, status_date, \
                 version, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                 ?17, ?18, ?19, ?20)",
                params![
                    person.person_id.to_string(),
                    person.trn.as_str(),
                    person.name.first,
                    person.name.middle,
                    person.name.last,
                    fold_name(&person.name.first),
                    fold_name(&person.name.last),
                    person.stated_name.first,
                    person.stated_name.middle,
                    person.stated_name.last,
                    fmt_date(person.date_of_birth),
                    person.national_id,
                    person.national_id.as_deref().map(normalize_national_id),
                    person.email.as_ref().map(EmailAddress::as_str),
                    fmt_date(person.qualification_date),
                    person.induction_status.as_str(),
                    person.status_before_exemption.map(InductionStatus::as_str),
                    fmt_date(person.status_date),
                    to_i64(person.version)?,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|err| {
                if is_trn_collision(&err) {
                    RegisterError::IdentifierCollision(person.trn.clone()).into()
                } else {
                    SqliteStoreError::db(err)
                }
            })?;
            Ok(())
        })
    }

    pub fn add_qualifying_event(
        &self,
        person_id: RecordUuid,
        event: &QualifyingEvent,
    ) -> SqliteResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO qualifying_events (person_id, awarded, description) \
                 VALUES (?1, ?2, ?3)",
                params![
                    person_id.to_string(),
                    fmt_date(Some(event.awarded)),
                    event.description
                ],
            )
            .map_err(SqliteStoreError::db)?;
            Ok(())
        })
    }

    pub fn open_appropriate_body_period(
        &self,
        person_id: RecordUuid,
        period: &AppropriateBodyPeriod,
    ) -> SqliteResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO appropriate_body_periods (person_id, body_name, started, ended) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    person_id.to_string(),
                    period.body_name,
                    fmt_date(Some(period.started)),
                    fmt_date(period.ended)
                ],
            )
            .map_err(SqliteStoreError::db)?;
            Ok(())
        })
    }

    pub fn link_national_id(&self, national_id: &str, person_id: RecordUuid) -> SqliteResult<()> {
        let national_id = normalize_national_id(national_id);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO national_id_xref (national_id, person_id) VALUES (?1, ?2)",
                params![national_id, person_id.to_string()],
            )
            .map_err(SqliteStoreError::db)?;
            Ok(())
        })
    }

    /// Review tasks ordered by due time.
    pub fn review_tasks(&self) -> SqliteResult<Vec<ReviewTask>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT task_id, category, reason, subject_kind, subject_id, due \
                     FROM review_tasks ORDER BY due, task_id",
                )
                .map_err(SqliteStoreError::db)?;
            let rows = stmt
                .query_map(params![], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })
                .map_err(SqliteStoreError::db)?;

            let mut tasks = Vec::new();
            for row in rows {
                let (task_id, category, reason, kind, subject_id, due) =
                    row.map_err(SqliteStoreError::db)?;
                let subject_id = parse_uuid("review_tasks.subject_id", &subject_id)?;
                let subject = match kind.as_str() {
                    "person" => ReviewSubject::Person(subject_id),
                    "unresolved_registration" => ReviewSubject::UnresolvedRegistration(subject_id),
                    other => {
                        return Err(SqliteStoreError::Corrupt(format!(
                            "unknown review subject kind '{other}'"
                        )))
                    }
                };
                tasks.push(ReviewTask {
                    task_id: parse_uuid("review_tasks.task_id", &task_id)?,
                    category: parse_category(&category)?,
                    reason,
                    subject,
                    due: parse_timestamp("review_tasks.due", &due)?,
                });
            }
            Ok(tasks)
        })
    }

    /// Ids of the persons an unresolved registration was matched against.
    pub fn unresolved_candidates(&self, record_id: RecordUuid) -> SqliteResult<Vec<RecordUuid>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT person_id FROM unresolved_candidates WHERE record_id = ?1 \
                     ORDER BY person_id",
                )
                .map_err(SqliteStoreError::db)?;
            let rows = stmt
                .query_map(params![record_id.to_string()], |row| row.get::<_, String>(0))
                .map_err(SqliteStoreError::db)?;
            let mut ids = Vec::new();
            for row in rows {
                ids.push(parse_uuid(
                    "unresolved_candidates.person_id",
                    &row.map_err(SqliteStoreError::db)?,
                )?);
            }
            Ok(ids)
        })
    }

    pub fn person_count(&self) -> SqliteResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM persons", params![], |row| row.get(0))
                .map_err(SqliteStoreError::db)?;
            u64::try_from(count).map_err(|_| SqliteStoreError::Corrupt("negative count".into()))
        })
    }
}

#[async_trait]
impl PersonStore for SqliteRegister {
    async fn find_candidates(&self, query: &CandidateQuery) -> RegisterResult<Vec<PersonIdentity>> {
        let last_name = fold_name(&query.last_name);
        let date_of_birth = fmt_date(Some(query.date_of_birth));
        let first_names = to_json(&query.first_names)?;
        let emails = to_json(
            &query
                .emails
                .iter()
                .map(EmailAddress::as_str)
                .collect::<Vec<_>>(),
        )?;
        let national_id = query.national_id.clone();

        self.run(move |conn| {
            let sql = format!(
                "SELECT {PERSON_COLUMNS} FROM persons \
                 WHERE (last_name_folded = ?1 AND date_of_birth = ?2 \
                        AND first_name_folded IN (SELECT value FROM json_each(?3))) \
                    OR (email IS NOT NULL AND email IN (SELECT value FROM json_each(?4))) \
                    OR (?5 IS NOT NULL AND national_id_normalized = ?5) \
                 ORDER BY person_id"
            );
            query_persons(
                conn,
                &sql,
                params![last_name, date_of_birth, first_names, emails, national_id],
            )
        })
        .await
    }

    async fn get_persons(&self, ids: &[RecordUuid]) -> RegisterResult<Vec<PersonIdentity>> {
        let ids = ids.to_vec();
        self.run(move |conn| {
            let sql = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE person_id = ?1");
            let mut persons = Vec::with_capacity(ids.len());
            for id in ids {
                persons.extend(query_persons(conn, &sql, params![id.to_string()])?);
            }
            Ok(persons)
        })
        .await
    }

    async fn get_person(&self, person_id: RecordUuid) -> RegisterResult<Option<PersonIdentity>> {
        self.run(move |conn| {
            let sql = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE person_id = ?1");
            Ok(query_persons(conn, &sql, params![person_id.to_string()])?
                .into_iter()
                .next())
        })
        .await
    }

    async fn get_person_by_trn(&self, trn: &Trn) -> RegisterResult<Option<PersonIdentity>> {
        let trn = trn.as_str().to_string();
        self.run(move |conn| {
            let sql = format!("SELECT {PERSON_COLUMNS} FROM persons WHERE trn = ?1");
            Ok(query_persons(conn, &sql, params![trn])?.into_iter().next())
        })
        .await
    }

    async fn qualifying_events(&self, person_id: RecordUuid) -> RegisterResult<Vec<QualifyingEvent>> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT awarded, description FROM qualifying_events WHERE person_id = ?1 \
                     ORDER BY awarded, id",
                )
                .map_err(SqliteStoreError::db)?;
            let rows = stmt
                .query_map(params![person_id.to_string()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(SqliteStoreError::db)?;
            let mut events = Vec::new();
            for row in rows {
                let (awarded, description) = row.map_err(SqliteStoreError::db)?;
                events.push(QualifyingEvent {
                    awarded: parse_date("qualifying_events.awarded", &awarded)?,
                    description,
                });
            }
            Ok(events)
        })
        .await
    }

    async fn appropriate_body_periods(
        &self,
        person_id: RecordUuid,
    ) -> RegisterResult<Vec<AppropriateBodyPeriod>> {
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT body_name, started, ended FROM appropriate_body_periods \
                     WHERE person_id = ?1 ORDER BY started, id",
                )
                .map_err(SqliteStoreError::db)?;
            let rows = stmt
                .query_map(params![person_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })
                .map_err(SqliteStoreError::db)?;
            let mut periods = Vec::new();
            for row in rows {
                let (body_name, started, ended) = row.map_err(SqliteStoreError::db)?;
                periods.push(AppropriateBodyPeriod {
                    body_name,
                    started: parse_date("appropriate_body_periods.started", &started)?,
                    ended: parse_opt_date("appropriate_body_periods.ended", ended)?,
                });
            }
            Ok(periods)
        })
        .await
    }

    async fn update_status(&self, update: StatusUpdate) -> RegisterResult<()> {
        self.run(move |conn| {
            let person_id = update.person_id.to_string();
            let changed = conn
                .execute(
                    "UPDATE persons SET induction_status = ?1, status_before_exemption = ?2, \
                     status_date = ?3, version = version + 1 \
                     WHERE person_id = ?4 AND version = ?5",
                    params![
                        update.induction_status.as_str(),
                        update.status_before_exemption.map(InductionStatus::as_str),
                        fmt_date(update.status_date),
                        person_id,
                        to_i64(update.expected_version)?,
                    ],
                )
                .map_err(SqliteStoreError::db)?;
            if changed == 1 {
                return Ok(());
            }

            let exists: Option<i64> = conn
                .query_row(
                    "SELECT version FROM persons WHERE person_id = ?1",
                    params![person_id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(SqliteStoreError::db)?;
            Err(match exists {
                Some(_) => RegisterError::ConcurrentModification(update.person_id),
                None => RegisterError::NotFound(format!("person {}", update.person_id)),
            }
            .into())
        })
        .await
    }

    async fn commit_registration(&self, commit: RegistrationCommit) -> RegisterResult<()> {
        self.run(move |conn| {
            let tx = conn
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(SqliteStoreError::db)?;
            let record = commit.record();

            if let Some(existing) = read_record(&tx, &record.key)? {
                return Err(RegisterError::DuplicateSubmission(Box::new(existing)).into());
            }
            match &commit {
                RegistrationCommit::Existing { .. } => {}
                RegistrationCommit::NewPerson { person, .. } => insert_new_person(&tx, person)?,
                RegistrationCommit::Unresolved { registration, .. } => {
                    insert_unresolved(&tx, registration)?
                }
            }
            insert_record(&tx, record)?;
            tx.commit().map_err(SqliteStoreError::db)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl CrossReferenceStore for SqliteRegister {
    async fn person_ids_for_national_id(
        &self,
        national_id: &str,
    ) -> RegisterResult<BTreeSet<RecordUuid>> {
        let national_id = national_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare("SELECT person_id FROM national_id_xref WHERE national_id = ?1")
                .map_err(SqliteStoreError::db)?;
            let rows = stmt
                .query_map(params![national_id], |row| row.get::<_, String>(0))
                .map_err(SqliteStoreError::db)?;
            let mut ids = BTreeSet::new();
            for row in rows {
                ids.insert(parse_uuid(
                    "national_id_xref.person_id",
                    &row.map_err(SqliteStoreError::db)?,
                )?);
            }
            Ok(ids)
        })
        .await
    }
}

#[async_trait]
impl IdempotencyStore for SqliteRegister {
    async fn get_record(&self, key: &IdempotencyKey) -> RegisterResult<Option<IdempotencyRecord>> {
        let key = key.clone();
        self.run(move |conn| read_record(conn, &key)).await
    }
}

#[async_trait]
impl IdentifierIssuer for SqliteRegister {
    async fn issue(&self) -> RegisterResult<String> {
        self.run(|conn| {
            conn.execute(
                "INSERT INTO trn_sequence (issued_at) VALUES (?1)",
                params![Utc::now().to_rfc3339()],
            )
            .map_err(SqliteStoreError::db)?;
            let sequence = u64::try_from(conn.last_insert_rowid())
                .map_err(|_| SqliteStoreError::Corrupt("negative identifier sequence".into()))?;
            let trn = Trn::from_sequence(TRN_OFFSET + sequence).map_err(|err| {
                SqliteStoreError::Invalid(format!("identifier sequence exhausted: {err}"))
            })?;
            Ok(trn.as_str().to_owned())
        })
        .await
    }
}

#[async_trait]
impl ReviewTaskSink for SqliteRegister {
    async fn enqueue(&self, task: ReviewTask) -> RegisterResult<()> {
        self.run(move |conn| {
            let (kind, subject_id) = match task.subject {
                ReviewSubject::Person(id) => ("person", id),
                ReviewSubject::UnresolvedRegistration(id) => ("unresolved_registration", id),
            };
            conn.execute(
                "INSERT INTO review_tasks (task_id, category, reason, subject_kind, subject_id, \
                 due) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task.task_id.to_string(),
                    task.category.as_str(),
                    task.reason,
                    kind,
                    subject_id.to_string(),
                    task.due.to_rfc3339(),
                ],
            )
            .map_err(SqliteStoreError::db)?;
            Ok(())
        })
        .await
    }
}

struct PersonRow {
    person_id: String,
    trn: String,
    first_name: String,
    middle_name: String,
    last_name: String,
    stated_first_name: Option<String>,
    stated_middle_name: Option<String>,
    stated_last_name: Option<String>,
    date_of_birth: Option<String>,
    national_id: Option<String>,
    email: Option<String>,
    qualification_date: Option<String>,
    induction_status: String,
    status_before_exemption: Option<String>,
    status_date: Option<String>,
    version: i64,
}

impl PersonRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            person_id: row.get(0)?,
            trn: row.get(1)?,
            first_name: row.get(2)?,
            middle_name: row.get(3)?,
            last_name: row.get(4)?,
            stated_first_name: row.get(5)?,
            stated_middle_name: row.get(6)?,
            stated_last_name: row.get(7)?,
            date_of_birth: row.get(8)?,
            national_id: row.get(9)?,
            email: row.get(10)?,
            qualification_date: row.get(11)?,
            induction_status: row.get(12)?,
            status_before_exemption: row.get(13)?,
            status_date: row.get(14)?,
            version: row.get(15)?,
        })
    }

    fn into_identity(self) -> SqliteResult<PersonIdentity> {
        let corrupt = |column: &str, err: &dyn std::fmt::Display| {
            SqliteStoreError::Corrupt(format!("persons.{column}: {err}"))
        };
        Ok(PersonIdentity {
            person_id: parse_uuid("persons.person_id", &self.person_id)?,
            trn: Trn::parse(&self.trn).map_err(|e| corrupt("trn", &e))?,
            name: PersonName {
                first: self.first_name,
                middle: self.middle_name,
                last: self.last_name,
            },
            stated_name: StatedName {
                first: self.stated_first_name,
                middle: self.stated_middle_name,
                last: self.stated_last_name,
            },
            date_of_birth: parse_opt_date("persons.date_of_birth", self.date_of_birth)?,
            national_id: self.national_id,
            email: self
                .email
                .map(EmailAddress::parse)
                .transpose()
                .map_err(|e| corrupt("email", &e))?,
            qualification_date: parse_opt_date(
                "persons.qualification_date",
                self.qualification_date,
            )?,
            induction_status: self
                .induction_status
                .parse()
                .map_err(|e| corrupt("induction_status", &e))?,
            status_before_exemption: self
                .status_before_exemption
                .map(|s| s.parse::<InductionStatus>())
                .transpose()
                .map_err(|e| corrupt("status_before_exemption", &e))?,
            status_date: parse_opt_date("persons.status_date", self.status_date)?,
            version: u64::try_from(self.version)
                .map_err(|e| corrupt("version", &e))?,
        })
    }
}

fn query_persons<P: rusqlite::Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> SqliteResult<Vec<PersonIdentity>> {
    let mut stmt = conn.prepare(sql).map_err(SqliteStoreError::db)?;
    let rows = stmt
        .query_map(params, PersonRow::from_row)
        .map_err(SqliteStoreError::db)?;
    let mut persons = Vec::new();
    for row in rows {
        persons.push(row.map_err(SqliteStoreError::db)?.into_identity()?);
    }
    Ok(persons)
}

fn read_record(conn: &Connection, key: &IdempotencyKey) -> SqliteResult<Option<IdempotencyRecord>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT outcome_json, resolved_at FROM idempotency_records \
             WHERE caller_id = ?1 AND request_id = ?2",
            params![key.caller_id.as_str(), key.request_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(SqliteStoreError::db)?;
    let Some((outcome_json, resolved_at)) = row else {
        return Ok(None);
    };
    let outcome: RegistrationOutcome = serde_json::from_str(&outcome_json)
        .map_err(|err| SqliteStoreError::Corrupt(format!("idempotency outcome: {err}")))?;
    Ok(Some(IdempotencyRecord {
        key: key.clone(),
        outcome,
        resolved_at: parse_timestamp("idempotency_records.resolved_at", &resolved_at)?,
    }))
}

fn insert_record(conn: &Connection, record: &IdempotencyRecord) -> SqliteResult<()> {
    let outcome_json = to_json(&record.outcome)?;
    let inserted = conn.execute(
        "INSERT INTO idempotency_records (caller_id, request_id, outcome_json, resolved_at) \
         VALUES (?1, ?2, ?3, ?4)",
        params![
            record.key.caller_id.as_str(),
            record.key.request_id.as_str(),
            outcome_json,
            record.resolved_at.to_rfc3339(),
        ],
    );
    match inserted {
        Ok(_) => Ok(()),
        Err(err) if is_constraint_violation(&err) => match read_record(conn, &record.key)? {
            Some(existing) => Err(RegisterError::DuplicateSubmission(Box::new(existing)).into()),
            None => Err(SqliteStoreError::db(err)),
        },
        Err(err) => Err(SqliteStoreError::db(err)),
    }
}

fn insert_new_person(conn: &Connection, person: &NewPerson) -> SqliteResult<()> {
    let considered = to_json(&person.considered_candidates)?;
    conn.execute(
        "INSERT INTO persons (person_id, trn, first_name, middle_name, last_name, \
         first_name_folded, last_name_folded, stated_first_name, stated_middle_name, \
         stated_last_name, date_of_birth, national_id, national_id_normalized, email, \
         induction_status, considered_candidates, version, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 0, ?17)",
        params![
            person.person_id.to_string(),
            person.trn.as_str(),
            person.name.first,
            person.name.middle,
            person.name.last,
            fold_name(&person.name.first),
            fold_name(&person.name.last),
            person.stated_name.first,
            person.stated_name.middle,
            person.stated_name.last,
            fmt_date(Some(person.date_of_birth)),
            person.national_id,
            person.national_id.as_deref().map(normalize_national_id),
            person.email.as_ref().map(EmailAddress::as_str),
            InductionStatus::RequiredToComplete.as_str(),
            considered,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(|err| {
        if is_trn_collision(&err) {
            RegisterError::IdentifierCollision(person.trn.clone()).into()
        } else {
            SqliteStoreError::db(err)
        }
    })?;
    Ok(())
}

fn insert_unresolved(conn: &Connection, registration: &UnresolvedRegistration) -> SqliteResult<()> {
    let record_id = registration.record_id.to_string();
    conn.execute(
        "INSERT INTO unresolved_registrations (record_id, caller_id, request_id, request_json, \
         created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            record_id,
            registration.request.key.caller_id.as_str(),
            registration.request.key.request_id.as_str(),
            to_json(&registration.request)?,
            Utc::now().to_rfc3339(),
        ],
    )
    .map_err(SqliteStoreError::db)?;
    for candidate in &registration.candidates {
        conn.execute(
            "INSERT INTO unresolved_candidates (record_id, person_id, matched_json) \
             VALUES (?1, ?2, ?3)",
            params![
                record_id,
                candidate.person_id().to_string(),
                to_json::<MatchedAttributes>(&candidate.matched)?,
            ],
        )
        .map_err(SqliteStoreError::db)?;
    }
    Ok(())
}

// Unicode case folding for name matching. SQLite's lower() only folds ASCII.
fn fold_name(name: &str) -> String {
    name.trim().to_lowercase()
}

fn is_trn_collision(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(message))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && message.contains("persons.trn")
    )
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> SqliteResult<String> {
    serde_json::to_string(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

fn to_i64(value: u64) -> SqliteResult<i64> {
    i64::try_from(value).map_err(|_| SqliteStoreError::Invalid(format!("{value} exceeds i64")))
}

fn fmt_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

fn parse_date(column: &str, raw: &str) -> SqliteResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|err| SqliteStoreError::Corrupt(format!("{column}: {err}")))
}

fn parse_opt_date(column: &str, raw: Option<String>) -> SqliteResult<Option<NaiveDate>> {
    raw.map(|raw| parse_date(column, &raw)).transpose()
}

fn parse_timestamp(column: &str, raw: &str) -> SqliteResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|err| SqliteStoreError::Corrupt(format!("{column}: {err}")))
}

fn parse_uuid(column: &str, raw: &str) -> SqliteResult<RecordUuid> {
    RecordUuid::parse(raw).map_err(|err| SqliteStoreError::Corrupt(format!("{column}: {err}")))
}

fn parse_category(raw: &str) -> SqliteResult<ReviewCategory> {
    match raw {
        "potential_duplicate" => Ok(ReviewCategory::PotentialDuplicate),
        "status_date_change" => Ok(ReviewCategory::StatusDateChange),
        other => Err(SqliteStoreError::Corrupt(format!(
            "unknown review category '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use register_core::model::{MatchedAttribute, RegistrationRequest, ResolvedIdentity};
    use register_types::{CallerId, RequestId};
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SqliteRegister {
        SqliteRegister::open(SqliteStoreConfig::new(dir.path().join("register.sqlite3"))).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn key(request_id: &str) -> IdempotencyKey {
        IdempotencyKey::new(
            CallerId::new("portal").unwrap(),
            RequestId::new(request_id).unwrap(),
        )
    }

    fn seeded(trn: &str, first: &str, last: &str) -> PersonIdentity {
        PersonIdentity {
            person_id: RecordUuid::new(),
            trn: Trn::parse(trn).unwrap(),
            name: PersonName {
                first: first.into(),
                middle: String::new(),
                last: last.into(),
            },
            stated_name: StatedName::default(),
            date_of_birth: Some(date(1990, 5, 23)),
            national_id: Some("AB 12 34 56 C".into()),
            email: Some(EmailAddress::parse("minnie@example.com").unwrap()),
            qualification_date: Some(date(2012, 6, 30)),
            induction_status: InductionStatus::InProgress,
            status_before_exemption: None,
            status_date: None,
            version: 0,
        }
    }

    fn new_person(trn: &str) -> NewPerson {
        NewPerson {
            person_id: RecordUuid::new(),
            trn: Trn::parse(trn).unwrap(),
            name: PersonName {
                first: "Minnie".into(),
                middle: "Van".into(),
                last: "Driver".into(),
            },
            stated_name: StatedName {
                first: Some("Minnie Van".into()),
                middle: Some("Van".into()),
                last: Some("Driver".into()),
            },
            date_of_birth: date(1990, 5, 23),
            national_id: None,
            email: None,
            considered_candidates: Vec::new(),
        }
    }

    fn completed(person: &NewPerson) -> RegistrationOutcome {
        RegistrationOutcome::Completed {
            identity: ResolvedIdentity {
                person_id: person.person_id,
                trn: person.trn.clone(),
                first_name: person.name.first.clone(),
                middle_name: person.name.middle.clone(),
                last_name: person.name.last.clone(),
                date_of_birth: Some(person.date_of_birth),
                national_id: None,
                email: None,
            },
        }
    }

    fn record(key: IdempotencyKey, outcome: RegistrationOutcome) -> IdempotencyRecord {
        IdempotencyRecord {
            key,
            outcome,
            resolved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_seeded_person_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let person = seeded("1234567", "Minnie", "Driver");
        store.insert_person(&person).unwrap();

        let loaded = store.get_person(person.person_id).await.unwrap().unwrap();
        assert_eq!(loaded, person);
        let by_trn = store.get_person_by_trn(&person.trn).await.unwrap().unwrap();
        assert_eq!(by_trn.person_id, person.person_id);
    }

    #[tokio::test]
    async fn test_find_candidates_is_disjunctive() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let person = seeded("1234567", "Minnie", "Driver");
        store.insert_person(&person).unwrap();
        store
            .insert_person(&PersonIdentity {
                person_id: RecordUuid::new(),
                trn: Trn::parse("7654321").unwrap(),
                national_id: None,
                email: None,
                ..seeded("7654321", "Other", "Person")
            })
            .unwrap();

        let base = CandidateQuery {
            first_names: BTreeSet::from(["minnie".to_string()]),
            middle_name: String::new(),
            last_name: "driver".into(),
            date_of_birth: date(1990, 5, 23),
            emails: Vec::new(),
            national_id: None,
        };
        assert_eq!(store.find_candidates(&base).await.unwrap().len(), 1);

        let by_email = CandidateQuery {
            first_names: BTreeSet::from(["nobody".to_string()]),
            emails: vec![EmailAddress::parse("MINNIE@example.com").unwrap()],
            ..base.clone()
        };
        assert_eq!(store.find_candidates(&by_email).await.unwrap().len(), 1);

        let by_national_id = CandidateQuery {
            first_names: BTreeSet::new(),
            last_name: "nobody".into(),
            national_id: Some("AB123456C".into()),
            ..base.clone()
        };
        let found = store.find_candidates(&by_national_id).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].person_id, person.person_id);

        let nothing = CandidateQuery {
            first_names: BTreeSet::from(["nobody".to_string()]),
            ..base
        };
        assert!(store.find_candidates(&nothing).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_find_candidates_folds_non_ascii_names() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let person = PersonIdentity {
            national_id: None,
            email: None,
            ..seeded("1234567", "Élodie", "Öztürk")
        };
        store.insert_person(&person).unwrap();

        let query = CandidateQuery {
            first_names: BTreeSet::from(["élodie".to_string()]),
            middle_name: String::new(),
            last_name: "ÖZTÜRK".into(),
            date_of_birth: date(1990, 5, 23),
            emails: Vec::new(),
            national_id: None,
        };
        let found = store.find_candidates(&query).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].person_id, person.person_id);
        assert_eq!(found[0].name.first, "Élodie");
    }

    #[tokio::test]
    async fn test_commit_is_rejected_for_a_processed_key() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);

        let first = new_person("1000001");
        let first_outcome = completed(&first);
        store
            .commit_registration(RegistrationCommit::NewPerson {
                record: record(key("r-1"), first_outcome.clone()),
                person: first,
            })
            .await
            .unwrap();

        let second = new_person("1000002");
        let err = store
            .commit_registration(RegistrationCommit::NewPerson {
                record: record(key("r-1"), completed(&second)),
                person: second,
            })
            .await
            .unwrap_err();

        match err {
            RegisterError::DuplicateSubmission(existing) => {
                assert_eq!(existing.outcome, first_outcome)
            }
            other => panic!("expected duplicate submission, got {other:?}"),
        }
        assert_eq!(store.person_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trn_collision_rolls_back_the_idempotency_record() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .insert_person(&seeded("1000001", "Someone", "Else"))
            .unwrap();

        let person = new_person("1000001");
        let err = store
            .commit_registration(RegistrationCommit::NewPerson {
                record: record(key("r-1"), completed(&person)),
                person,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RegisterError::IdentifierCollision(ref trn) if trn.as_str() == "1000001"));
        assert!(store.get_record(&key("r-1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_person_id_is_not_an_identifier_collision() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let person = seeded("1000001", "Minnie", "Driver");
        store.insert_person(&person).unwrap();

        let err = store
            .insert_person(&PersonIdentity {
                trn: Trn::parse("1000002").unwrap(),
                ..person
            })
            .unwrap_err();
        assert!(matches!(err, SqliteStoreError::Db(_)), "{err:?}");
        assert!(matches!(
            RegisterError::from(err),
            RegisterError::UpstreamUnavailable(_)
        ));
    }

    #[tokio::test]
    async fn test_unresolved_commit_keeps_candidate_back_references() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let existing = seeded("1234567", "Minnie", "Driver");
        store.insert_person(&existing).unwrap();

        let record_id = RecordUuid::new();
        let request = RegistrationRequest {
            key: key("r-1"),
            first_name: "Minnie".into(),
            middle_name: String::new(),
            last_name: "Driver".into(),
            date_of_birth: date(1990, 5, 23),
            emails: Vec::new(),
            national_id: None,
        };
        let outcome = RegistrationOutcome::Pending {
            record_id,
            candidate_count: 1,
        };
        store
            .commit_registration(RegistrationCommit::Unresolved {
                registration: UnresolvedRegistration {
                    record_id,
                    request,
                    candidates: vec![register_core::model::Candidate {
                        person: existing.clone(),
                        matched: [MatchedAttribute::Name, MatchedAttribute::DateOfBirth]
                            .into_iter()
                            .collect(),
                    }],
                },
                record: record(key("r-1"), outcome.clone()),
            })
            .await
            .unwrap();

        assert_eq!(
            store.unresolved_candidates(record_id).unwrap(),
            vec![existing.person_id]
        );
        let stored = store.get_record(&key("r-1")).await.unwrap().unwrap();
        assert_eq!(stored.outcome, outcome);
        assert_eq!(store.person_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_update_status_is_compare_and_set() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let person = seeded("1234567", "Minnie", "Driver");
        store.insert_person(&person).unwrap();

        let update = StatusUpdate {
            person_id: person.person_id,
            expected_version: 0,
            induction_status: InductionStatus::Exempt,
            status_before_exemption: Some(InductionStatus::Extended),
            status_date: Some(date(2024, 1, 1)),
        };
        store.update_status(update.clone()).await.unwrap();

        let err = store.update_status(update.clone()).await.unwrap_err();
        assert!(matches!(err, RegisterError::ConcurrentModification(id) if id == person.person_id));

        let missing = StatusUpdate {
            person_id: RecordUuid::new(),
            ..update
        };
        assert!(matches!(
            store.update_status(missing).await,
            Err(RegisterError::NotFound(_))
        ));

        let loaded = store.get_person(person.person_id).await.unwrap().unwrap();
        assert_eq!(loaded.induction_status, InductionStatus::Exempt);
        assert_eq!(loaded.version, 1);
    }

    #[tokio::test]
    async fn test_issued_identifiers_are_never_reused() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let first = store.issue().await.unwrap();
        let second = store.issue().await.unwrap();
        assert_eq!(first, "1000001");
        assert_eq!(second, "1000002");

        drop(store);
        let reopened = open(&dir);
        assert_eq!(reopened.issue().await.unwrap(), "1000003");
    }

    #[tokio::test]
    async fn test_exhausted_identifier_sequence_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        store
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO trn_sequence (seq, issued_at) VALUES (8999999, ?1)",
                    params![Utc::now().to_rfc3339()],
                )
                .map_err(SqliteStoreError::db)?;
                Ok(())
            })
            .unwrap();

        let err = store.issue().await.unwrap_err();
        assert!(matches!(err, RegisterError::UpstreamUnavailable(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_cross_reference_and_child_rows() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let person = seeded("1234567", "Minnie", "Driver");
        store.insert_person(&person).unwrap();
        store.link_national_id("ab123456c", person.person_id).unwrap();
        store
            .add_qualifying_event(
                person.person_id,
                &QualifyingEvent {
                    awarded: date(2016, 7, 1),
                    description: "PGCE".into(),
                },
            )
            .unwrap();
        store
            .open_appropriate_body_period(
                person.person_id,
                &AppropriateBodyPeriod {
                    body_name: "North Teaching School Hub".into(),
                    started: date(2023, 9, 1),
                    ended: None,
                },
            )
            .unwrap();

        let ids = store.person_ids_for_national_id("AB123456C").await.unwrap();
        assert!(ids.contains(&person.person_id));
        assert_eq!(
            store.qualifying_events(person.person_id).await.unwrap()[0].awarded,
            date(2016, 7, 1)
        );
        assert!(store.appropriate_body_periods(person.person_id).await.unwrap()[0].is_open());
    }

    #[tokio::test]
    async fn test_review_tasks_are_persisted() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let subject = RecordUuid::new();
        store
            .enqueue(ReviewTask::new(
                ReviewCategory::StatusDateChange,
                "induction is currently In Progress",
                ReviewSubject::Person(subject),
                chrono::Duration::days(5),
            ))
            .await
            .unwrap();

        let tasks = store.review_tasks().unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].category, ReviewCategory::StatusDateChange);
        assert_eq!(tasks[0].subject, ReviewSubject::Person(subject));
    }
}
