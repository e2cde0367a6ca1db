use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Negative => "negative",
            Sentiment::Neutral => "neutral",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(Sentiment::Positive),
            "negative" => Some(Sentiment::Negative),
            "neutral" => Some(Sentiment::Neutral),
            _ => None,
        }
    }
}

/// One participant exchange. Created once, never mutated; deleted only by
/// the retention enforcer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ResponseRow {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub session_id: Uuid,
    pub content: String,
    pub ai_response: Option<String>,
    pub sentiment: String,
    pub sentiment_score: f64,
    pub theme_id: Option<Uuid>,
    pub urgency_score: i32,
    pub escalated: bool,
    pub created_at: DateTime<Utc>,
}
