use serde::{Serialize, Deserialize};
use sqlx::types::Json;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub property: String,
    pub checkin_date: NaiveDate,
    pub name: String,
    pub email: String,
    pub activities: Json<Vec<String>>,
    pub activity_initials: Json<HashMap<String, String>>,
    pub signature: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Document {
    pub id: Uuid,
    pub submission_id: String,
    pub activity: String,
    pub storage_key: String,
    pub access_code: Option<String>,
    pub created_at: DateTime<Utc>,
}
