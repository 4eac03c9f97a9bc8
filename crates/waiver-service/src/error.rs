use axum::{response::{IntoResponse, Response}, Json, http::StatusCode};
use serde::Serialize;
use utoipa::ToSchema;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiErrorBody { pub error: String, pub code: &'static str }

#[derive(Debug, Clone)]
pub struct ApiError { pub status: StatusCode, pub code: &'static str, pub message: String }

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into() }
    }
    pub fn validation(msg: impl Into<String>) -> Self { Self::new(StatusCode::BAD_REQUEST, "validation_error", msg) }
    pub fn not_found(msg: impl Into<String>) -> Self { Self::new(StatusCode::NOT_FOUND, "not_found", msg) }
    pub fn internal(msg: impl Into<String>) -> Self { Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg) }
}

impl Display for ApiError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result { write!(f, "{}: {}", self.code, self.message) }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody { error: self.message, code: self.code };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
