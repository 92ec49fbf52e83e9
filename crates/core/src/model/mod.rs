//! Domain types shared by the engines, the services and the storage adapters.

pub mod person;
pub mod registration;

pub use person::{
    AppropriateBodyPeriod, InductionStatus, PersonIdentity, PersonName, QualifyingEvent,
    StatedName, StatusUpdate,
};
pub use registration::{
    Candidate, IdempotencyKey, IdempotencyRecord, MatchedAttribute, MatchedAttributes, NewPerson,
    RegistrationCommit, RegistrationOutcome, RegistrationRequest, ResolvedIdentity,
    UnresolvedRegistration,
};
