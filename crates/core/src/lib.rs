//! # Register Core
//!
//! Identity and status consistency engine for the teacher register.
//!
//! This crate decides, for an incoming registration, whether it names a new person or one
//! already on record, and governs induction status changes driven by the status-defining date:
//! - attribute normalisation, synonym expansion and candidate matching
//! - duplicate resolution and identifier issuance
//! - idempotent intake keyed by `(caller_id, request_id)`
//! - the status transition decision table
//!
//! **No API concerns**: HTTP servers and storage engines live in `api-rest` and
//! `register-store-sqlite`. This crate only sees them through the traits in [`store`],
//! [`idempotency`], [`issuer`], [`review`] and [`synonyms`].

pub mod adapter;
pub mod config;
pub mod constants;
pub mod error;
pub mod idempotency;
pub mod issuer;
pub mod lookup;
pub mod matching;
pub mod model;
pub mod normalize;
pub mod resolution;
pub mod review;
pub mod services;
pub mod status;
pub mod store;
pub mod synonyms;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CoreConfig;
pub use error::{RegisterError, RegisterResult};
pub use lookup::{PersonInclude, PersonLookup, PersonView};
pub use model::{
    IdempotencyKey, IdempotencyRecord, InductionStatus, RegistrationOutcome, RegistrationRequest,
};
pub use services::{
    RegisterPorts, RegisterServices, RegistrationService, StatusDateOutcome, StatusDateService,
};
pub use status::DateChange;

pub use register_ids::{RecordUuid, Trn};
pub use register_types::{CallerId, EmailAddress, RequestId};
