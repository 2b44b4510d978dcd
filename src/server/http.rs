//! JSON HTTP API.
//!
//! Every `/api/*` route except health passes through [`authenticate`], which
//! turns the bearer token into a [`Caller`]. No header means a legacy caller;
//! a key that does not resolve is a 401, a locked agent a 429 with
//! `Retry-After`, a malformed header a 400.

use std::sync::{Arc, Mutex};

use axum::extract::{FromRequestParts, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use super::caller::Caller;
use super::error::ApiError;
use crate::agents;
use crate::config::MnemoConfig;
use crate::error::StoreError;
use crate::records::search::{self, FileMatches, FileQuery};
use crate::records::store;
use crate::records::types::NewObservation;
use crate::records::{
    DateRange, Observation, OrderBy, SearchFilters, SearchOptions, SessionSummary, UserPrompt,
};

#[derive(Clone)]
pub struct AppState {
    db: Arc<Mutex<Connection>>,
    config: Arc<MnemoConfig>,
}

impl AppState {
    pub fn new(db: Arc<Mutex<Connection>>, config: Arc<MnemoConfig>) -> Self {
        Self { db, config }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/observations", get(list_observations).post(create_observation))
        .route("/api/summaries", get(list_summaries))
        .route("/api/prompts", get(list_prompts))
        .route("/api/files", get(find_files))
        .route("/api/agents/verify", post(verify_agent))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .route("/api/health", get(health))
        .merge(api)
        .with_state(state)
}

// ── Authentication ────────────────────────────────────────────────────────────

pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let caller = match bearer_token(request.headers())? {
        None => Caller::Legacy,
        Some(token) => {
            let agent = with_db(&state, move |conn, config| {
                agents::find_by_key(conn, &token, &config.auth)
            })
            .await?;
            Caller::Agent(agent.ok_or(ApiError::Unauthorized)?)
        }
    };
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| ApiError::BadRequest("authorization header is not valid text".into()))?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("expected `Authorization: Bearer <api key>`".into()))?;
    Ok(Some(token.to_string()))
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or(ApiError::Unauthorized)
    }
}

/// Run `f` against the shared connection on the blocking pool.
async fn with_db<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Connection, &MnemoConfig) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(&state.db);
    let config = Arc::clone(&state.config);
    tokio::task::spawn_blocking(move || {
        let conn = db
            .lock()
            .map_err(|e| ApiError::Internal(format!("db lock poisoned: {e}")))?;
        f(&conn, &config).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::Internal(format!("db task failed: {e}")))?
}

// ── Request / response shapes ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    pub count: usize,
}

impl<T> Page<T> {
    fn new(results: Vec<T>) -> Self {
        Self {
            count: results.len(),
            results,
        }
    }
}

/// Query string for the search endpoints. List values are comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    pub query: Option<String>,
    pub project: Option<String>,
    pub types: Option<String>,
    pub concepts: Option<String>,
    pub files: Option<String>,
    pub date_start: Option<i64>,
    pub date_end: Option<i64>,
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl SearchParams {
    fn into_options(self) -> Result<SearchOptions, StoreError> {
        let order_by = match self.order_by.as_deref() {
            Some(raw) => raw.parse::<OrderBy>()?,
            None => Default::default(),
        };
        let date_range = (self.date_start.is_some() || self.date_end.is_some()).then_some(DateRange {
            start: self.date_start,
            end: self.date_end,
        });
        Ok(SearchOptions {
            filters: SearchFilters {
                project: self.project,
                types: SearchFilters::split_list(self.types.as_deref()),
                date_range,
                concepts: SearchFilters::split_list(self.concepts.as_deref()),
                files: SearchFilters::split_list(self.files.as_deref()),
            },
            limit: self.limit,
            offset: self.offset.unwrap_or(0),
            order_by,
            query: self.query,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct FileParams {
    pub path: String,
    #[serde(default)]
    pub project: Option<String>,
    #[serde(default)]
    pub folder: bool,
    #[serde(default)]
    pub direct_children_only: bool,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CreateObservation {
    #[serde(flatten)]
    pub observation: NewObservation,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub id: String,
    pub api_key: String,
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let version = with_db(&state, |conn, _| {
        crate::db::migrations::get_schema_version(conn).map_err(StoreError::from)
    })
    .await?;
    Ok(Json(serde_json::json!({ "status": "ok", "schema_version": version })))
}

async fn list_observations(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<Observation>>, ApiError> {
    let options = params.into_options()?;
    let ctx = caller.access();
    let results = with_db(&state, move |conn, config| {
        search::search_observations(conn, &ctx, &options, &config.query)
    })
    .await?;
    Ok(Json(Page::new(results)))
}

async fn list_summaries(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<SessionSummary>>, ApiError> {
    let options = params.into_options()?;
    let ctx = caller.access();
    let results = with_db(&state, move |conn, config| {
        search::search_summaries(conn, &ctx, &options, &config.query)
    })
    .await?;
    Ok(Json(Page::new(results)))
}

async fn list_prompts(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<SearchParams>,
) -> Result<Json<Page<UserPrompt>>, ApiError> {
    let options = params.into_options()?;
    let ctx = caller.access();
    let results = with_db(&state, move |conn, config| {
        search::search_prompts(conn, &ctx, &options, &config.query)
    })
    .await?;
    Ok(Json(Page::new(results)))
}

async fn find_files(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<FileParams>,
) -> Result<Json<FileMatches>, ApiError> {
    let ctx = caller.access();
    let query = FileQuery {
        project: params.project,
        folder: params.folder,
        direct_children_only: params.direct_children_only,
        limit: params.limit,
    };
    let path = params.path;
    let matches = with_db(&state, move |conn, config| {
        search::find_by_file(conn, &ctx, &path, &query, &config.query)
    })
    .await?;
    Ok(Json(matches))
}

async fn create_observation(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<CreateObservation>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    if !caller.can_write() {
        return Err(ApiError::Forbidden("write"));
    }
    let meta = caller.write_metadata(body.visibility);
    let observation = body.observation;
    let id = with_db(&state, move |conn, _| {
        store::store_observation(conn, &observation, &meta)
    })
    .await?;
    tracing::info!(id, agent = caller.agent_id().unwrap_or("legacy"), "observation created over http");
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn verify_agent(
    State(state): State<AppState>,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let id = body.id.clone();
    let verified = with_db(&state, move |conn, config| {
        agents::verify(conn, &body.id, &body.api_key, &config.auth)
    })
    .await?;
    Ok(Json(serde_json::json!({ "id": id, "verified": verified })))
}
