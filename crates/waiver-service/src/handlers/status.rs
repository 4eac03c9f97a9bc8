use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::AppState;

#[derive(Serialize, ToSchema)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Liveness probe
#[utoipa::path(get, path = "/status", responses( (status = 200, body = StatusResponse) ))]
pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

#[derive(Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub status: &'static str,
}

/// Readiness probe: checks DB connectivity (simple SELECT 1)
#[utoipa::path(get, path = "/readyz", responses(
    (status = 200, body = ReadinessResponse, description = "Service ready"),
    (status = 503, body = ReadinessResponse, description = "Dependency not ready")
))]
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    if ok {
        (StatusCode::OK, Json(ReadinessResponse { status: "ready" }))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(ReadinessResponse { status: "degraded" }))
    }
}
