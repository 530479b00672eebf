use std::sync::Arc;
use std::time::{Duration, SystemTime};

use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use roundtable_domain::{
    AgentPatch, AgentRecord, FilterState, MeetingPatch, MeetingStatus, MeetingView, Page,
    page::DEFAULT_PAGE_SIZE,
};

pub mod api_envelope;
pub mod auth;
pub mod config;
pub mod mutations;
pub mod observability;
pub mod query;
pub mod store;


use crate::api_envelope::{
    ApiErrorTuple, created_data, internal_error, not_found_error, ok_data, unauthorized_error,
    validation_error,
};
use crate::auth::{AuthError, AuthService, SessionBundle};
use crate::config::Config;
use crate::mutations::{CreateAgentInput, CreateMeetingInput, GatewayError};
use crate::observability::{AuditEvent, Observability};
use crate::query::{ListParams, QueryError};
use crate::store::WorkspaceStore;

const SERVICE_NAME: &str = "roundtable-service";
const AUTH_ACCESS_COOKIE_NAME: &str = "rt_access_token";
const QUERY_KEY_PAGE_SIZE: &str = "pageSize";
const MAX_NAME_LENGTH: usize = 255;
const REQUEST_TIMEOUT_SECONDS: u64 = 30;

#[derive(Clone)]
struct AppState {
    config: Arc<Config>,
    auth: AuthService,
    observability: Observability,
    workspace: WorkspaceStore,
    started_at: SystemTime,
}

pub fn build_router(config: Config) -> Router {
    build_router_with_observability(config, Observability::default())
}

pub fn build_router_with_observability(config: Config, observability: Observability) -> Router {
    let auth = AuthService::from_config(&config);
    let workspace = WorkspaceStore::from_config(&config);
    let state = AppState {
        config: Arc::new(config),
        auth,
        observability,
        workspace,
        started_at: SystemTime::now(),
    };

    Router::new()
        .route("/healthz", get(health))
        .route("/api/auth/email", post(auth_email))
        .route("/api/auth/verify", post(auth_verify))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route(
            "/api/agents/:id",
            get(show_agent).patch(update_agent).delete(remove_agent),
        )
        .route("/api/meetings", get(list_meetings).post(create_meeting))
        .route("/api/meetings/:id", get(show_meeting).patch(update_meeting))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(
                    REQUEST_TIMEOUT_SECONDS,
                ))),
        )
        .with_state(state)
}

#[derive(Debug, serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime_seconds = state
        .started_at
        .elapsed()
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        uptime_seconds,
    })
}

#[derive(Debug, Deserialize)]
struct AuthEmailRequestPayload {
    email: Option<String>,
}

async fn auth_email(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AuthEmailRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let email = payload.email.unwrap_or_default();
    let challenge = state
        .auth
        .begin_email_challenge(&email)
        .await
        .map_err(map_auth_error)?;

    state.observability.audit(
        AuditEvent::new("auth.challenge_started", request_id.clone())
            .with_attribute("email", challenge.email.clone()),
    );
    state
        .observability
        .increment_counter("auth.challenge_started", &request_id);

    Ok(ok_data(json!({
        "challengeId": challenge.challenge_id,
        "email": challenge.email,
        "expiresAt": timestamp(challenge.expires_at),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthVerifyRequestPayload {
    challenge_id: Option<String>,
    code: Option<String>,
}

async fn auth_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<AuthVerifyRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let challenge_id = payload.challenge_id.unwrap_or_default();
    let code = payload.code.unwrap_or_default();
    let verified = state
        .auth
        .verify_email_code(&challenge_id, &code)
        .await
        .map_err(map_auth_error)?;

    state.observability.audit(
        AuditEvent::new("auth.session_issued", request_id.clone())
            .with_user_id(verified.user.id.clone())
            .with_attribute("session_id", verified.session.session_id.clone())
            .with_attribute("new_user", verified.new_user.to_string()),
    );
    state
        .observability
        .increment_counter("auth.session_issued", &request_id);

    Ok(ok_data(json!({
        "tokenType": verified.token_type,
        "accessToken": verified.access_token,
        "user": {
            "id": verified.user.id,
            "email": verified.user.email,
            "name": verified.user.name,
        },
        "session": {
            "id": verified.session.session_id,
            "issuedAt": timestamp(verified.session.issued_at),
            "expiresAt": timestamp(verified.session.expires_at),
        },
        "newUser": verified.new_user,
    })))
}

async fn list_agents(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let query = query.unwrap_or_default();
    let filter = FilterState::from_query(&query);
    let page_size = page_size_from_query(&query, state.config.page_size_cap);
    let params = ListParams::from_filter(&filter, page_size);

    let page = query::list_for(&state.workspace.agents(), &principal, &params)
        .await
        .map_err(|error| map_query_error(error, "Agent"))?;

    state.observability.audit(
        AuditEvent::new("agent.list_viewed", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("search", filter.search.clone())
            .with_attribute("page", filter.page.to_string())
            .with_attribute("count", page.items.len().to_string())
            .with_attribute("total", page.total.to_string()),
    );
    state
        .observability
        .increment_counter("agent.list_viewed", &request_id);

    Ok(ok_data(page_payload(&page, agent_payload)))
}

#[derive(Debug, Deserialize)]
struct CreateAgentRequestPayload {
    name: Option<String>,
    instructions: Option<String>,
}

async fn create_agent(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateAgentRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let name = normalize_required_string(payload.name, "name")?;
    let instructions = normalize_required_string(payload.instructions, "instructions")?;

    let record = mutations::create_agent(
        &state.workspace.agents(),
        &principal,
        CreateAgentInput { name, instructions },
    )
    .await
    .map_err(|error| map_gateway_error(error, "Agent"))?;

    state.observability.audit(
        AuditEvent::new("agent.created", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("agent_id", record.id.clone())
            .with_attribute("name", record.name.clone()),
    );
    state
        .observability
        .increment_counter("agent.created", &request_id);

    Ok(created_data(agent_payload(&record)))
}

async fn show_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let record = query::find_for(&state.workspace.agents(), &principal, &id)
        .await
        .map_err(|error| map_query_error(error, "Agent"))?;

    state.observability.audit(
        AuditEvent::new("agent.viewed", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("agent_id", record.id.clone()),
    );
    state
        .observability
        .increment_counter("agent.viewed", &request_id);

    Ok(ok_data(agent_payload(&record)))
}

#[derive(Debug, Deserialize)]
struct UpdateAgentRequestPayload {
    name: Option<String>,
    instructions: Option<String>,
}

async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateAgentRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let patch = AgentPatch {
        name: normalize_optional_string(payload.name, "name")?,
        instructions: normalize_optional_string(payload.instructions, "instructions")?,
    };
    if patch == AgentPatch::default() {
        return Err(validation_error(
            "fields",
            "At least one field must be provided.",
        ));
    }

    let record = mutations::update_agent(&state.workspace.agents(), &principal, &id, patch)
        .await
        .map_err(|error| map_gateway_error(error, "Agent"))?;

    state.observability.audit(
        AuditEvent::new("agent.updated", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("agent_id", record.id.clone()),
    );
    state
        .observability
        .increment_counter("agent.updated", &request_id);

    Ok(ok_data(agent_payload(&record)))
}

async fn remove_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let record = mutations::remove_agent(&state.workspace.agents(), &principal, &id)
        .await
        .map_err(|error| map_gateway_error(error, "Agent"))?;

    state.observability.audit(
        AuditEvent::new("agent.removed", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("agent_id", record.id.clone()),
    );
    state
        .observability
        .increment_counter("agent.removed", &request_id);

    Ok(ok_data(agent_payload(&record)))
}

async fn list_meetings(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let query = query.unwrap_or_default();
    let filter = FilterState::from_query(&query);
    let page_size = page_size_from_query(&query, state.config.page_size_cap);
    let params = ListParams::from_filter(&filter, page_size);

    let page = query::list_for(&state.workspace.meetings(), &principal, &params)
        .await
        .map_err(|error| map_query_error(error, "Meeting"))?;

    state.observability.audit(
        AuditEvent::new("meeting.list_viewed", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("search", filter.search.clone())
            .with_attribute("page", filter.page.to_string())
            .with_attribute("count", page.items.len().to_string())
            .with_attribute("total", page.total.to_string()),
    );
    state
        .observability
        .increment_counter("meeting.list_viewed", &request_id);

    Ok(ok_data(page_payload(&page, meeting_view_payload)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateMeetingRequestPayload {
    name: Option<String>,
    agent_id: Option<String>,
}

async fn create_meeting(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateMeetingRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let name = normalize_required_string(payload.name, "name")?;
    let agent_id = normalize_required_string(payload.agent_id, "agentId")?;

    let view = mutations::create_meeting(
        &state.workspace.agents(),
        &state.workspace.meetings(),
        &principal,
        CreateMeetingInput { name, agent_id },
    )
    .await
    .map_err(|error| map_gateway_error(error, "Agent"))?;

    state.observability.audit(
        AuditEvent::new("meeting.created", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("meeting_id", view.meeting.id.clone())
            .with_attribute("agent_id", view.agent.id.clone()),
    );
    state
        .observability
        .increment_counter("meeting.created", &request_id);

    Ok(created_data(meeting_view_payload(&view)))
}

async fn show_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let view = query::find_for(&state.workspace.meetings(), &principal, &id)
        .await
        .map_err(|error| map_query_error(error, "Meeting"))?;

    state.observability.audit(
        AuditEvent::new("meeting.viewed", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("meeting_id", view.meeting.id.clone()),
    );
    state
        .observability
        .increment_counter("meeting.viewed", &request_id);

    Ok(ok_data(meeting_view_payload(&view)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateMeetingRequestPayload {
    name: Option<String>,
    agent_id: Option<String>,
    status: Option<String>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

async fn update_meeting(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdateMeetingRequestPayload>,
) -> Result<impl IntoResponse, ApiErrorTuple> {
    let request_id = request_id(&headers);
    let bundle = session_bundle_from_headers(&state, &headers).await?;
    let principal = bundle.principal();

    let patch = MeetingPatch {
        name: normalize_optional_string(payload.name, "name")?,
        agent_id: normalize_optional_string(payload.agent_id, "agentId")?,
        status: payload.status.map(|raw| parse_status(&raw)).transpose()?,
        started_at: payload.started_at,
        ended_at: payload.ended_at,
    };
    if patch == MeetingPatch::default() {
        return Err(validation_error(
            "fields",
            "At least one field must be provided.",
        ));
    }

    let view = mutations::update_meeting(
        &state.workspace.agents(),
        &state.workspace.meetings(),
        &principal,
        &id,
        patch,
    )
    .await
    .map_err(|error| map_gateway_error(error, "Meeting"))?;

    state.observability.audit(
        AuditEvent::new("meeting.updated", request_id.clone())
            .with_user_id(principal.id.clone())
            .with_attribute("meeting_id", view.meeting.id.clone())
            .with_attribute("status", view.meeting.status.as_str()),
    );
    state
        .observability
        .increment_counter("meeting.updated", &request_id);

    Ok(ok_data(meeting_view_payload(&view)))
}

async fn session_bundle_from_headers(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<SessionBundle, ApiErrorTuple> {
    let access_token = access_token_from_headers(headers)
        .ok_or_else(|| unauthorized_error("Unauthenticated."))?;
    state
        .auth
        .resolve_access_token(&access_token)
        .await
        .map_err(map_auth_error)
}

fn access_token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = bearer_token(headers) {
        return Some(token);
    }
    cookie_token(headers)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn cookie_token(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(COOKIE).and_then(|value| value.to_str().ok())?;
    cookies
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == AUTH_ACCESS_COOKIE_NAME)
        .map(|(_, value)| value.trim().to_string())
        .filter(|token| !token.is_empty())
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn page_size_from_query(query: &str, cap: u64) -> u64 {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == QUERY_KEY_PAGE_SIZE)
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(cap.max(1))
}

fn normalize_required_string(
    value: Option<String>,
    field: &'static str,
) -> Result<String, ApiErrorTuple> {
    match normalize_optional_string(value, field)? {
        Some(value) => Ok(value),
        None => Err(validation_error(
            field,
            &format!("The {field} field is required."),
        )),
    }
}

fn normalize_optional_string(
    value: Option<String>,
    field: &'static str,
) -> Result<Option<String>, ApiErrorTuple> {
    let Some(value) = value else {
        return Ok(None);
    };
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(validation_error(
            field,
            &format!("The {field} field must not be blank."),
        ));
    }
    if value.chars().count() > MAX_NAME_LENGTH {
        return Err(validation_error(
            field,
            &format!("The {field} field must not exceed {MAX_NAME_LENGTH} characters."),
        ));
    }
    Ok(Some(value))
}

fn parse_status(raw: &str) -> Result<MeetingStatus, ApiErrorTuple> {
    MeetingStatus::parse(raw).ok_or_else(|| {
        validation_error(
            "status",
            "The status field must be one of upcoming, active, completed, processing, cancelled.",
        )
    })
}

fn map_auth_error(error: AuthError) -> ApiErrorTuple {
    match error {
        AuthError::Unauthorized => unauthorized_error("Unauthenticated."),
        AuthError::InvalidEmail => {
            validation_error("email", "The email field must be a valid address.")
        }
        AuthError::UnknownChallenge => {
            validation_error("challengeId", "That challenge is unknown or expired.")
        }
        AuthError::InvalidCode => validation_error("code", "That code is invalid."),
        AuthError::Persistence { message } => {
            tracing::error!(target: "roundtable.auth", error = %message, "auth store failure");
            internal_error("Something went wrong.")
        }
    }
}

fn map_query_error(error: QueryError, entity: &str) -> ApiErrorTuple {
    match error {
        QueryError::NotFound => not_found_error(format!("{entity} not found.")),
        QueryError::Store(store_error) => map_store_failure(&store_error.to_string()),
    }
}

fn map_gateway_error(error: GatewayError, entity: &str) -> ApiErrorTuple {
    match error {
        GatewayError::NotFound => not_found_error(format!("{entity} not found.")),
        GatewayError::Store(store_error) => map_store_failure(&store_error.to_string()),
    }
}

fn map_store_failure(message: &str) -> ApiErrorTuple {
    tracing::error!(target: "roundtable.store", error = %message, "workspace store failure");
    internal_error("Something went wrong.")
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn optional_timestamp(value: Option<DateTime<Utc>>) -> Value {
    value
        .map(|value| Value::String(timestamp(value)))
        .unwrap_or(Value::Null)
}

fn agent_payload(record: &AgentRecord) -> Value {
    json!({
        "id": record.id,
        "ownerId": record.owner_id,
        "name": record.name,
        "instructions": record.instructions,
        "createdAt": timestamp(record.created_at),
        "updatedAt": timestamp(record.updated_at),
    })
}

fn meeting_view_payload(view: &MeetingView) -> Value {
    json!({
        "id": view.meeting.id,
        "ownerId": view.meeting.owner_id,
        "name": view.meeting.name,
        "agentId": view.meeting.agent_id,
        "status": view.meeting.status.as_str(),
        "startedAt": optional_timestamp(view.meeting.started_at),
        "endedAt": optional_timestamp(view.meeting.ended_at),
        "durationSeconds": view.duration_seconds(),
        "agent": agent_payload(&view.agent),
        "createdAt": timestamp(view.meeting.created_at),
        "updatedAt": timestamp(view.meeting.updated_at),
    })
}

fn page_payload<T>(page: &Page<T>, item_payload: impl Fn(&T) -> Value) -> Value {
    json!({
        "items": page.items.iter().map(item_payload).collect::<Vec<Value>>(),
        "total": page.total,
        "totalPages": page.total_pages,
    })
}
