use crate::api::AppState;
use crate::error::Result;
use crate::models::*;
use crate::state::SearchFilter;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Result<Json<HealthResponse>> {
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        active_searches: state.search.active_count(),
        stored_searches: state.search.stored_count().await?,
        websocket_connections: state.websocket.active_connections(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_searches: usize,
    pub stored_searches: u64,
    pub websocket_connections: usize,
}

/// Start a search
pub async fn create_search(
    State(state): State<AppState>,
    Json(request): Json<CreateSearchRequest>,
) -> Result<(StatusCode, Json<Search>)> {
    request.validate()?;

    let options = request
        .options
        .unwrap_or_else(|| SearchOptions::from_config(&state.config.search));

    let search = state
        .search
        .start(
            request.id.unwrap_or_else(Uuid::new_v4),
            SearchQuery::new(request.search_text),
            request.scope,
            options,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(search)))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub struct CreateSearchRequest {
    /// Caller-assigned id; generated when absent
    pub id: Option<Uuid>,
    #[validate(length(min = 1, max = 1024))]
    pub search_text: String,
    #[serde(default)]
    pub scope: SearchScope,
    pub options: Option<SearchOptions>,
}

/// List searches, responses omitted
pub async fn list_searches(
    State(state): State<AppState>,
    Query(params): Query<ListSearchesQuery>,
) -> Result<Json<Vec<Search>>> {
    let filter = SearchFilter {
        search_text: params.search_text,
        active_only: params.active_only.unwrap_or(false),
        ..Default::default()
    };

    Ok(Json(state.search.list(&filter).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListSearchesQuery {
    pub search_text: Option<String>,
    pub active_only: Option<bool>,
}

/// Get a search by ID
pub async fn get_search(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<GetSearchQuery>,
) -> Result<Json<Search>> {
    let search = state
        .search
        .get(&id, params.include_responses.unwrap_or(false))
        .await?;
    Ok(Json(search))
}

#[derive(Debug, Deserialize)]
pub struct GetSearchQuery {
    pub include_responses: Option<bool>,
}

/// Page through a search's responses
pub async fn search_responses(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<ResponsesQuery>,
) -> Result<Json<Vec<Response>>> {
    let skip = params.skip.unwrap_or(0);
    let take = params.take.unwrap_or(100).min(1000); // Max 1000 per page

    Ok(Json(state.search.responses(&id, skip, take).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResponsesQuery {
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

/// Stop an in-flight search
pub async fn stop_search(State(state): State<AppState>, Path(id): Path<Uuid>) -> StatusCode {
    if state.search.try_cancel(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_MODIFIED
    }
}

/// Delete a finished search
pub async fn delete_search(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.search.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Prometheus metrics endpoint
///
/// Returns metrics in Prometheus text exposition format
pub async fn metrics() -> (StatusCode, String) {
    let metrics = crate::metrics::gather_metrics();
    (StatusCode::OK, metrics)
}
