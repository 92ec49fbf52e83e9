//! The two operations the engine exposes, plus person lookup.
//!
//! Every service built from one [`RegisterPorts`] shares one [`SerializedAdapter`] around the
//! record store, so dependent calls from different requests never interleave on it.

pub mod registration;
pub mod status;

use std::sync::Arc;

use crate::adapter::SerializedAdapter;
use crate::idempotency::IdempotencyStore;
use crate::issuer::IdentifierIssuer;
use crate::lookup::PersonLookup;
use crate::review::ReviewTaskSink;
use crate::store::{CrossReferenceStore, PersonStore};
use crate::synonyms::SynonymProvider;
use crate::CoreConfig;

pub use registration::RegistrationService;
pub use status::{StatusDateOutcome, StatusDateService};

/// The external collaborators the engine talks to.
#[derive(Clone)]
pub struct RegisterPorts {
    pub persons: Arc<dyn PersonStore>,
    pub cross_reference: Arc<dyn CrossReferenceStore>,
    pub idempotency: Arc<dyn IdempotencyStore>,
    pub issuer: Arc<dyn IdentifierIssuer>,
    pub synonyms: Arc<dyn SynonymProvider>,
    pub reviews: Arc<dyn ReviewTaskSink>,
}

/// All services, wired over one set of ports.
#[derive(Clone)]
pub struct RegisterServices {
    pub registration: RegistrationService,
    pub status_dates: StatusDateService,
    pub lookup: PersonLookup,
}

impl RegisterServices {
    pub fn new(cfg: Arc<CoreConfig>, ports: RegisterPorts) -> Self {
        let persons = Arc::new(SerializedAdapter::new(ports.persons.clone()));
        Self {
            registration: RegistrationService::new(cfg.clone(), persons.clone(), &ports),
            status_dates: StatusDateService::new(cfg, persons.clone(), ports.reviews.clone()),
            lookup: PersonLookup::new(persons),
        }
    }
}
