//! Axum route handlers for the Session API.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::AnonymizationLevel;
use crate::session::completion::{
    self, fallback_summary, StructuredSummary, ThemeCoverage, TranscriptMessage,
};
use crate::session::lifecycle::{self, StartSessionParams};
use crate::session::{is_preview_id, PREVIEW_ID_PREFIX};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Caller identity, already resolved by the external auth layer.
    pub participant_id: Option<Uuid>,
    pub survey_id: Uuid,
    pub anonymization_level: String,
    pub initial_mood: Option<i32>,
    /// Preview starts return a synthetic id and perform no writes.
    #[serde(default)]
    pub preview: bool,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub phase: String,
    pub preview: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct EndSessionRequest {
    pub final_mood: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct EarlyFinishRequest {
    #[serde(default)]
    pub transcript: Vec<TranscriptMessage>,
}

#[derive(Debug, Serialize)]
pub struct EarlyFinishResponse {
    pub summary: StructuredSummary,
    pub phase: String,
}

#[derive(Debug, Serialize)]
pub struct SessionStateResponse {
    pub session_id: Uuid,
    pub status: String,
    pub phase: String,
    pub closing_summary: Option<Value>,
    pub coverage: ThemeCoverage,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
///
/// Starts a conversation session. Requires a resolved caller identity
/// unless the request is flagged as preview, in which case a synthetic
/// non-persisted id comes back and nothing is written.
pub async fn handle_start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<Json<StartSessionResponse>, AppError> {
    if request.preview {
        return Ok(Json(StartSessionResponse {
            session_id: format!("{PREVIEW_ID_PREFIX}{}", Uuid::new_v4()),
            status: "active".to_string(),
            phase: "active".to_string(),
            preview: true,
        }));
    }

    let participant_id = request.participant_id.ok_or(AppError::NotAuthenticated)?;
    let level = AnonymizationLevel::parse(&request.anonymization_level).ok_or_else(|| {
        AppError::Validation(format!(
            "Unknown anonymization_level '{}'",
            request.anonymization_level
        ))
    })?;

    let session = lifecycle::start_session(
        &state.db,
        StartSessionParams {
            participant_id,
            survey_id: request.survey_id,
            anonymization_level: level,
            initial_mood: request.initial_mood,
        },
    )
    .await?;

    Ok(Json(StartSessionResponse {
        session_id: session.id.to_string(),
        status: session.status,
        phase: session.phase,
        preview: false,
    }))
}

/// GET /api/v1/sessions/:id
///
/// Current session state with the derived theme-coverage projection.
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStateResponse>, AppError> {
    let session_id = parse_session_id(&id)?;
    let session = lifecycle::get_session(&state.db, session_id).await?;
    let coverage = completion::theme_coverage(&state.db, session.survey_id, session_id).await?;

    Ok(Json(SessionStateResponse {
        session_id: session.id,
        status: session.status,
        phase: session.phase,
        closing_summary: session.closing_summary,
        coverage,
    }))
}

/// POST /api/v1/sessions/:id/end
///
/// Idempotent: ending a completed session, or a preview id, is a no-op.
pub async fn handle_end_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<EndSessionRequest>>,
) -> Result<StatusCode, AppError> {
    if is_preview_id(&id) {
        return Ok(StatusCode::NO_CONTENT);
    }
    let final_mood = request.and_then(|Json(r)| r.final_mood);
    let session_id = parse_session_id(&id)?;
    lifecycle::end_session(&state.db, session_id, final_mood).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/finish-early
///
/// Summarizes the transcript and moves the session to reviewing. Always
/// returns a summary — a degraded summarizer falls back deterministically.
pub async fn handle_early_finish(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<EarlyFinishRequest>,
) -> Result<Json<EarlyFinishResponse>, AppError> {
    if is_preview_id(&id) {
        // Preview sessions never persist; the participant still gets a
        // summary to review.
        return Ok(Json(EarlyFinishResponse {
            summary: fallback_summary(&request.transcript),
            phase: "reviewing".to_string(),
        }));
    }

    let session_id = parse_session_id(&id)?;
    let summary = completion::request_early_finish(
        &state.db,
        &state.llm,
        session_id,
        &request.transcript,
    )
    .await?;

    Ok(Json(EarlyFinishResponse {
        summary,
        phase: "reviewing".to_string(),
    }))
}

/// POST /api/v1/sessions/:id/add-more
///
/// Returns the session from reviewing to active, clearing the summary.
pub async fn handle_add_more(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if is_preview_id(&id) {
        return Ok(StatusCode::NO_CONTENT);
    }
    let session_id = parse_session_id(&id)?;
    completion::add_more(&state.db, session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/complete
pub async fn handle_complete(
    State(state): State<AppState>,
    Path(id): Path<String>,
    request: Option<Json<EndSessionRequest>>,
) -> Result<StatusCode, AppError> {
    if is_preview_id(&id) {
        return Ok(StatusCode::NO_CONTENT);
    }
    let final_mood = request.and_then(|Json(r)| r.final_mood);
    let session_id = parse_session_id(&id)?;
    completion::complete(&state.db, session_id, final_mood).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_session_id(id: &str) -> Result<Uuid, AppError> {
    id.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("'{id}' is not a valid session id")))
}
