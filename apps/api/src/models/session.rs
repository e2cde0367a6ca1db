use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// How strongly a session's responses are linkable to a participant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnonymizationLevel {
    Identified,
    Pseudonymous,
    Anonymous,
}

impl AnonymizationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnonymizationLevel::Identified => "identified",
            AnonymizationLevel::Pseudonymous => "pseudonymous",
            AnonymizationLevel::Anonymous => "anonymous",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "identified" => Some(AnonymizationLevel::Identified),
            "pseudonymous" => Some(AnonymizationLevel::Pseudonymous),
            "anonymous" => Some(AnonymizationLevel::Anonymous),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }
}

/// Progress of the interview completion flow, persisted on the session row
/// and re-read on every request — there is no in-memory session cache.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InterviewPhase {
    Active,
    Reviewing,
    Complete,
}

impl InterviewPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            InterviewPhase::Active => "active",
            InterviewPhase::Reviewing => "reviewing",
            InterviewPhase::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(InterviewPhase::Active),
            "reviewing" => Some(InterviewPhase::Reviewing),
            "complete" => Some(InterviewPhase::Complete),
            _ => None,
        }
    }
}

/// Stable anonymous correlation key for a (participant, survey) pair.
/// Created lazily on first session start, never updated.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AnonymousTokenRow {
    pub id: Uuid,
    pub participant_id: Uuid,
    pub survey_id: Uuid,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// One feedback conversation. `participant_id` is NULL for anonymous-level
/// sessions — only the token links rows, so identity and content stay
/// structurally separated rather than merely access-controlled.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationSessionRow {
    pub id: Uuid,
    pub participant_id: Option<Uuid>,
    pub token_id: Uuid,
    pub survey_id: Uuid,
    pub anonymization_level: String,
    pub status: String,
    pub phase: String,
    pub closing_summary: Option<Value>,
    pub add_more_used: bool,
    pub initial_mood: Option<i32>,
    pub final_mood: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}
