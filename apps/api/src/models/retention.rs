use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Append-only audit trail: one row per enforcement run per survey that had
/// at least one deletion.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DataRetentionLogRow {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub records_deleted_count: i32,
    pub retention_policy_days: i32,
    pub execution_type: String,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    Automatic,
    Manual,
}

impl ExecutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionType::Automatic => "automatic",
            ExecutionType::Manual => "manual",
        }
    }
}
