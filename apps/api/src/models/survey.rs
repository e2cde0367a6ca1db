use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Survey carries its retention policy inline: `retention_days` and `status`
/// are the only fields the engine reads from it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SurveyRow {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub retention_days: i32,
    pub created_at: DateTime<Utc>,
}

/// Topical category responses are classified into (e.g. "work-life balance").
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ThemeRow {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}
