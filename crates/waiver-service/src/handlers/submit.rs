use axum::{extract::State, Json};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::catalog;
use crate::error::{ApiError, ApiResult};
use crate::services::submissions::{self, ValidSubmission};
use crate::AppState;

/// Wire payload for POST /submit. Fields are optional so a missing key
/// surfaces as a ValidationError instead of a serde rejection.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub property: Option<String>,
    pub checkin_date: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub activities: Vec<String>,
    #[serde(default)]
    pub activity_initials: HashMap<String, String>,
    pub signature: Option<String>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submission_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_codes: Option<HashMap<String, String>>,
    pub message: String,
}

fn required(value: Option<String>, field: &str) -> Result<String, ApiError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ApiError::validation(format!("missing required field: {field}"))),
    }
}

pub fn validate(req: SubmitRequest) -> Result<ValidSubmission, ApiError> {
    let property = required(req.property, "property")?;
    let checkin_raw = required(req.checkin_date, "checkinDate")?;
    let name = required(req.name, "name")?;
    let email = required(req.email, "email")?;
    let signature = required(req.signature, "signature")?;
    if req.activities.is_empty() {
        return Err(ApiError::validation("at least one activity must be selected"));
    }
    if !catalog::is_known_property(&property) {
        return Err(ApiError::validation(format!("unknown property: {property}")));
    }
    let checkin_date = NaiveDate::parse_from_str(&checkin_raw, "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("invalid checkinDate: {checkin_raw}")))?;
    for activity in &req.activities {
        if catalog::find_activity(activity).is_none() {
            return Err(ApiError::validation(format!("unknown activity: {activity}")));
        }
        match req.activity_initials.get(activity) {
            Some(i) if !i.trim().is_empty() => {}
            _ => {
                return Err(ApiError::validation(format!(
                    "missing initials for activity: {activity}"
                )))
            }
        }
    }
    Ok(ValidSubmission {
        property,
        checkin_date,
        name,
        email,
        activities: req.activities,
        activity_initials: req.activity_initials,
        signature,
    })
}

/// Accept a waiver submission
#[utoipa::path(post, path = "/submit", request_body = SubmitRequest, responses(
    (status = 200, body = SubmitResponse),
    (status = 400, description = "Validation failure"),
    (status = 500, description = "Unexpected failure")
))]
#[tracing::instrument(level = "info", skip(state, req), fields(property = ?req.property))]
pub async fn submit(
    State(state): State<AppState>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<Json<SubmitResponse>> {
    let valid = validate(req)?;
    let outcome = submissions::submit(&state.db, valid)
        .await
        .map_err(|e| ApiError::internal(format!("submission failure: {e}")))?;
    Ok(Json(SubmitResponse {
        success: outcome.success,
        submission_id: outcome.submission_id,
        access_codes: outcome.access_codes,
        message: outcome.message,
    }))
}
