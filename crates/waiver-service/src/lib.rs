pub mod auth;
pub mod catalog;
pub mod db;
pub mod error;
pub mod handlers;
pub mod ident;
pub mod models;
pub mod notify;
pub mod render;
pub mod services;
pub mod storage;
pub mod telemetry;
pub mod test_support;

// Re-export storage accessor to provide a stable import path.
pub use storage::get_storage;

use axum::response::Html;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use handlers::{search::admin_search, status::{readyz, status}, submit::submit};
use sqlx::{Pool, Postgres};
use utoipa::OpenApi;

use crate::telemetry::metrics_handler;

#[derive(Clone)]
pub struct AppState {
    pub db: Pool<Postgres>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::status::status,
        handlers::status::readyz,
        handlers::submit::submit,
        handlers::search::admin_search,
    ),
    components(schemas(
        error::ApiErrorBody,
        handlers::submit::SubmitRequest,
        handlers::submit::SubmitResponse,
    )),
    tags( (name = "waiver", description = "Activity Waiver Service API") )
)]
pub struct ApiDoc;

async fn swagger_ui() -> Html<String> {
    let html = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"/><title>Waiver Service API Docs</title>
<link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
<div id="swagger-ui"></div>
<script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
<script>
window.onload = () => { SwaggerUIBundle({ url: '/openapi.json', dom_id: '#swagger-ui' }); };
</script>
</body></html>"#;
    Html(html.to_string())
}

pub fn build_router(state: AppState) -> Router {
    let openapi = ApiDoc::openapi();
    Router::new()
        .route("/status", get(status))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .route("/submit", post(submit))
        .route(
            "/admin/search",
            get(admin_search).route_layer(middleware::from_fn(auth::admin_guard)),
        )
        .route("/openapi.json", get(|| async move { axum::Json(openapi.clone()) }))
        .route("/swagger", get(swagger_ui))
        .with_state(state)
}
