use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ApiError, ApiResult};
use crate::models::Submission;
use crate::services::submissions;
use crate::AppState;

#[derive(Deserialize, ToSchema)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<Submission>,
}

/// Admin substring search over past submissions
#[utoipa::path(get, path = "/admin/search", params(
    ("q" = String, Query, description = "Substring matched against name, email, property and check-in date")
), responses(
    (status = 200, description = "Matching submissions, newest first (max 50)"),
    (status = 400, description = "Missing or empty query")
))]
#[tracing::instrument(level = "debug", skip(state, query))]
pub async fn admin_search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<SearchResponse>> {
    let q = match query.q {
        Some(q) if !q.trim().is_empty() => q,
        _ => return Err(ApiError::validation("query parameter required")),
    };
    let results = submissions::search(&state.db, &q)
        .await
        .map_err(|e| ApiError::internal(format!("query error: {e}")))?;
    Ok(Json(SearchResponse { results }))
}
