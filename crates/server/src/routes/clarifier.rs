//! JSON endpoints driving the flow runner.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use clarifier_core::errors::{EngineError, InterfaceError};
use clarifier_core::flows::{FlowRunner, StartOutcome, TurnOutcome, QUIZ_SETUP};
use clarifier_core::session::SessionMeta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

#[derive(Clone)]
pub struct ClarifierState {
    pub runner: Arc<FlowRunner>,
}

pub fn router(state: ClarifierState) -> Router {
    Router::new()
        .route("/clarifier/start", post(start))
        .route("/clarifier/ingest", post(ingest))
        .route("/clarifier/confirm", post(confirm))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub session_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub subject_id: String,
    #[serde(default)]
    pub doc_ids: Vec<String>,
    #[serde(default)]
    pub flow: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub session_id: String,
    pub text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub values: Map<String, Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClarifierError {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub correlation_id: String,
}

type ApiError = (StatusCode, Json<ClarifierError>);

fn new_correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn bad_request(correlation_id: &str, message: impl Into<String>) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ClarifierError {
            error: message.into(),
            errors: Vec::new(),
            correlation_id: correlation_id.to_string(),
        }),
    )
}

fn engine_error(error: EngineError, correlation_id: &str, route: &'static str) -> ApiError {
    let errors = match &error {
        EngineError::Validation { errors } => errors.clone(),
        _ => Vec::new(),
    };
    let interface = error.into_interface(correlation_id.to_string());
    interface_error(interface, errors, route)
}

fn interface_error(
    interface: InterfaceError,
    errors: Vec<String>,
    route: &'static str,
) -> ApiError {
    let status =
        StatusCode::from_u16(interface.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    if status.is_server_error() {
        warn!(
            event_name = "clarifier.http.failed",
            correlation_id = interface.correlation_id(),
            route,
            status = status.as_u16(),
            error = %interface,
            "request failed"
        );
    }
    let error = match &interface {
        InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
            message.clone()
        }
        other => other.user_message().to_string(),
    };
    (
        status,
        Json(ClarifierError {
            error,
            errors,
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

fn require_session_id(session_id: &str, correlation_id: &str) -> Result<(), ApiError> {
    if session_id.trim().is_empty() {
        return Err(bad_request(correlation_id, "sessionId is required"));
    }
    Ok(())
}

pub async fn start(
    State(state): State<ClarifierState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartOutcome>, ApiError> {
    let correlation_id = new_correlation_id();
    let Json(request) =
        payload.map_err(|rejection| bad_request(&correlation_id, rejection.body_text()))?;
    require_session_id(&request.session_id, &correlation_id)?;

    let flow_id = request.flow.as_deref().unwrap_or(QUIZ_SETUP).to_string();
    let meta = SessionMeta {
        session_id: request.session_id,
        user_id: request.user_id,
        subject_id: request.subject_id,
        doc_ids: request.doc_ids,
    };

    let outcome = state
        .runner
        .start(&flow_id, meta)
        .await
        .map_err(|error| engine_error(error, &correlation_id, "start"))?;
    info!(
        event_name = "clarifier.http.started",
        correlation_id = %correlation_id,
        session_id = %outcome.session_id,
        flow = %outcome.flow,
        resumed = outcome.resumed,
        "session started"
    );
    Ok(Json(outcome))
}

pub async fn ingest(
    State(state): State<ClarifierState>,
    payload: Result<Json<IngestRequest>, JsonRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let correlation_id = new_correlation_id();
    let Json(request) =
        payload.map_err(|rejection| bad_request(&correlation_id, rejection.body_text()))?;
    require_session_id(&request.session_id, &correlation_id)?;

    match state.runner.ingest(&request.session_id, &request.text).await {
        Ok(outcome) => Ok(Json(outcome)),
        // Ingest treats a missing session as a malformed request.
        Err(EngineError::SessionNotFound { session_id }) => {
            Err(bad_request(&correlation_id, format!("no session with id `{session_id}`")))
        }
        Err(error) => Err(engine_error(error, &correlation_id, "ingest")),
    }
}

pub async fn confirm(
    State(state): State<ClarifierState>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let correlation_id = new_correlation_id();
    let Json(request) =
        payload.map_err(|rejection| bad_request(&correlation_id, rejection.body_text()))?;
    require_session_id(&request.session_id, &correlation_id)?;

    state
        .runner
        .confirm(&request.session_id, &request.values)
        .await
        .map(Json)
        .map_err(|error| engine_error(error, &correlation_id, "confirm"))
}
