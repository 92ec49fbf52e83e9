//! # API REST
//!
//! REST API for the teacher register.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status code mapping)
//!
//! All register logic lives in `register-core`; handlers only translate between wire types and
//! [`RegisterServices`].

#![warn(rust_2018_idioms)]

pub mod dto;

use axum::{
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use register_core::status::DateChange;
use register_core::{
    CallerId, EmailAddress, IdempotencyKey, PersonInclude, RecordUuid, RegisterError,
    RegisterServices, RegistrationRequest, RequestId, Trn,
};

use dto::{
    AppropriateBodyPeriodRes, ErrorRes, HealthRes, IdentityRes, InductionRes, OutcomeRecordRes,
    PersonRes, QualifyingEventRes, RegistrationReq, RegistrationRes, StatedNameRes,
    StatusDateReq, StatusDateRes,
};

/// Header naming the calling system. Half of the idempotency key.
pub const CALLER_ID_HEADER: &str = "x-caller-id";

/// Application state shared across REST handlers.
#[derive(Clone)]
pub struct AppState {
    services: RegisterServices,
}

impl AppState {
    pub fn new(services: RegisterServices) -> Self {
        Self { services }
    }
}

type ApiError = (StatusCode, Json<ErrorRes>);

#[derive(OpenApi)]
#[openapi(
    paths(
        health,
        submit_registration,
        get_registration_outcome,
        put_status_date,
        get_person,
    ),
    components(schemas(
        HealthRes,
        RegistrationReq,
        RegistrationRes,
        IdentityRes,
        OutcomeRecordRes,
        StatusDateReq,
        StatusDateRes,
        PersonRes,
        InductionRes,
        AppropriateBodyPeriodRes,
        QualifyingEventRes,
        StatedNameRes,
        ErrorRes,
    ))
)]
pub struct ApiDoc;

/// Builds the REST router with OpenAPI docs and permissive CORS.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/registrations", post(submit_registration))
        .route(
            "/registrations/:caller_id/:request_id",
            get(get_registration_outcome),
        )
        .route("/persons/:id/status-date", put(put_status_date))
        .route("/persons/:id", get(get_person))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
///
/// Used for monitoring and load balancer health checks.
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Register REST API is alive".into(),
    })
}

#[utoipa::path(
    post,
    path = "/registrations",
    request_body = RegistrationReq,
    params(
        ("x-caller-id" = String, Header, description = "Identifier of the calling system")
    ),
    responses(
        (status = 200, description = "Registration resolved or held for review", body = RegistrationRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 409, description = "Request already processed; body carries the prior outcome", body = ErrorRes),
        (status = 503, description = "A collaborator is unavailable; retry with the same request id", body = ErrorRes)
    )
)]
/// Submit a registration
///
/// Resolves the request against existing persons. A definitive match returns that person, a
/// partial match is held for review (`pending`) and no match issues a new identifier.
///
/// # Errors
/// - `400` when the caller id header or any field is missing or malformed.
/// - `409` when `(caller id, request id)` was already processed.
/// - `503` when the record store, cross-reference, synonym source or issuer is unavailable.
#[axum::debug_handler]
async fn submit_registration(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegistrationReq>,
) -> Result<Json<RegistrationRes>, ApiError> {
    let caller_id = headers
        .get(CALLER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| bad_request(format!("missing {CALLER_ID_HEADER} header")))?;
    let request = registration_request(caller_id, req)?;

    let outcome = state
        .services
        .registration
        .submit(request)
        .await
        .map_err(error_response)?;
    Ok(Json((&outcome).into()))
}

#[utoipa::path(
    get,
    path = "/registrations/{caller_id}/{request_id}",
    params(
        ("caller_id" = String, Path, description = "Calling system"),
        ("request_id" = String, Path, description = "Caller-assigned request id")
    ),
    responses(
        (status = 200, description = "Recorded outcome", body = OutcomeRecordRes),
        (status = 404, description = "Never processed", body = ErrorRes)
    )
)]
/// Recorded outcome of an earlier registration
#[axum::debug_handler]
async fn get_registration_outcome(
    State(state): State<AppState>,
    AxumPath((caller_id, request_id)): AxumPath<(String, String)>,
) -> Result<Json<OutcomeRecordRes>, ApiError> {
    let key = IdempotencyKey::new(
        CallerId::new(&caller_id).map_err(|e| bad_request(e.to_string()))?,
        RequestId::new(&request_id).map_err(|e| bad_request(e.to_string()))?,
    );
    match state.services.registration.outcome(&key).await {
        Ok(Some(record)) => Ok(Json((&record).into())),
        Ok(None) => Err(error_response(RegisterError::NotFound(format!(
            "registration {key}"
        )))),
        Err(e) => Err(error_response(e)),
    }
}

#[utoipa::path(
    put,
    path = "/persons/{person_id}/status-date",
    request_body = StatusDateReq,
    params(
        ("person_id" = String, Path, description = "Canonical person id")
    ),
    responses(
        (status = 200, description = "Applied, or routed to review", body = StatusDateRes),
        (status = 400, description = "Bad request", body = ErrorRes),
        (status = 404, description = "No such person", body = ErrorRes),
        (status = 409, description = "Person changed concurrently; reload and retry", body = ErrorRes),
        (status = 422, description = "Person has no qualification date", body = ErrorRes)
    )
)]
/// Set or clear a person's status-defining date
///
/// A `null` date clears it. Changes the decision table cannot apply automatically come back as
/// `review_queued` with the reason; that is not an error.
#[axum::debug_handler]
async fn put_status_date(
    State(state): State<AppState>,
    AxumPath(person_id): AxumPath<String>,
    Json(req): Json<StatusDateReq>,
) -> Result<Json<StatusDateRes>, ApiError> {
    let person_id = RecordUuid::parse(&person_id).map_err(|e| bad_request(e.to_string()))?;
    let date = req
        .date
        .as_deref()
        .map(|raw| dto::parse_date("date", raw))
        .transpose()
        .map_err(bad_request)?;

    let outcome = state
        .services
        .status_dates
        .apply_status_date(person_id, DateChange::from_option(date))
        .await
        .map_err(error_response)?;
    Ok(Json((&outcome).into()))
}

#[derive(Debug, Default, Deserialize)]
struct PersonQuery {
    include: Option<String>,
}

#[utoipa::path(
    get,
    path = "/persons/{trn}",
    params(
        ("trn" = String, Path, description = "Seven-digit teacher reference number"),
        ("include" = Option<String>, Query, description = "Comma-separated: induction, qualifying_events, stated_names")
    ),
    responses(
        (status = 200, description = "The person", body = PersonRes),
        (status = 400, description = "Malformed TRN or unknown include", body = ErrorRes),
        (status = 404, description = "No person holds the TRN", body = ErrorRes)
    )
)]
/// Look up a person by TRN
#[axum::debug_handler]
async fn get_person(
    State(state): State<AppState>,
    AxumPath(trn): AxumPath<String>,
    Query(query): Query<PersonQuery>,
) -> Result<Json<PersonRes>, ApiError> {
    let trn = Trn::parse(&trn).map_err(|e| bad_request(e.to_string()))?;
    let includes = match query.include.as_deref() {
        Some(raw) => PersonInclude::parse_list(raw).map_err(error_response)?,
        None => Vec::new(),
    };

    let view = state
        .services
        .lookup
        .get(&trn, &includes)
        .await
        .map_err(error_response)?;
    Ok(Json((&view).into()))
}

fn registration_request(
    caller_id: &str,
    req: RegistrationReq,
) -> Result<RegistrationRequest, ApiError> {
    let key = IdempotencyKey::new(
        CallerId::new(caller_id).map_err(|e| bad_request(e.to_string()))?,
        RequestId::new(&req.request_id).map_err(|e| bad_request(e.to_string()))?,
    );
    if req.first_name.trim().is_empty() || req.last_name.trim().is_empty() {
        return Err(bad_request("first_name and last_name are required".into()));
    }
    let date_of_birth = dto::parse_date("date_of_birth", &req.date_of_birth).map_err(bad_request)?;
    let emails = req
        .emails
        .iter()
        .map(EmailAddress::parse)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| bad_request(e.to_string()))?;

    Ok(RegistrationRequest {
        key,
        first_name: req.first_name,
        middle_name: req.middle_name,
        last_name: req.last_name,
        date_of_birth,
        emails,
        national_id: req.national_id.filter(|id| !id.trim().is_empty()),
    })
}

fn bad_request(message: String) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorRes {
            error: "invalid_input".into(),
            message,
            prior: None,
        }),
    )
}

/// Maps a register error onto a status code and body.
fn error_response(err: RegisterError) -> ApiError {
    let (status, error, prior) = match &err {
        RegisterError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
        RegisterError::DuplicateSubmission(record) => (
            StatusCode::CONFLICT,
            "duplicate_submission",
            Some(OutcomeRecordRes::from(record.as_ref())),
        ),
        RegisterError::ConcurrentModification(_) => {
            (StatusCode::CONFLICT, "concurrent_modification", None)
        }
        RegisterError::PrerequisiteMissing(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "prerequisite_missing", None)
        }
        RegisterError::UpstreamUnavailable(_) | RegisterError::IdentifierCollision(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable", None)
        }
        RegisterError::InvalidInput(_) | RegisterError::Text(_) | RegisterError::Id(_) => {
            (StatusCode::BAD_REQUEST, "invalid_input", None)
        }
    };

    if status.is_server_error() {
        tracing::error!("register error: {err}");
    } else {
        tracing::debug!("register error: {err}");
    }

    (
        status,
        Json(ErrorRes {
            error: error.into(),
            message: err.to_string(),
            prior,
        }),
    )
}
