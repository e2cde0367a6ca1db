//! Session lifecycle: start and end conversation sessions, issuing or
//! reusing the anonymous token that correlates a participant's sessions
//! within one survey without ever storing identity alongside responses.

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::session::{
    AnonymizationLevel, AnonymousTokenRow, ConversationSessionRow, SessionStatus,
};
use crate::models::survey::SurveyRow;

pub struct StartSessionParams {
    pub participant_id: Uuid,
    pub survey_id: Uuid,
    pub anonymization_level: AnonymizationLevel,
    pub initial_mood: Option<i32>,
}

/// Starts a session: reuses the (participant, survey) token if present,
/// creates it otherwise, then inserts an active session row.
///
/// The token is the correlation key; identity is a different object. For
/// anonymous-level sessions the session row carries no participant_id at
/// all — the separation is structural, not access-controlled.
pub async fn start_session(
    pool: &PgPool,
    params: StartSessionParams,
) -> Result<ConversationSessionRow, AppError> {
    let survey: Option<SurveyRow> = sqlx::query_as("SELECT * FROM surveys WHERE id = $1")
        .bind(params.survey_id)
        .fetch_optional(pool)
        .await?;
    let survey =
        survey.ok_or_else(|| AppError::NotFound(format!("Survey {} not found", params.survey_id)))?;

    let token = upsert_token(pool, params.participant_id, survey.id).await?;

    let session_participant_id = match params.anonymization_level {
        AnonymizationLevel::Anonymous => None,
        _ => Some(params.participant_id),
    };

    let session: ConversationSessionRow = sqlx::query_as(
        r#"
        INSERT INTO conversation_sessions
            (id, participant_id, token_id, survey_id, anonymization_level,
             status, phase, initial_mood)
        VALUES ($1, $2, $3, $4, $5, 'active', 'active', $6)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_participant_id)
    .bind(token.id)
    .bind(survey.id)
    .bind(params.anonymization_level.as_str())
    .bind(params.initial_mood)
    .fetch_one(pool)
    .await?;

    info!(
        "Started session {} on survey {} (level: {})",
        session.id,
        survey.id,
        params.anonymization_level.as_str()
    );

    Ok(session)
}

/// Single atomic insert-if-absent-else-return-existing. Two concurrent
/// starts for the same (participant, survey) land on the same token row —
/// never a read-then-write race.
async fn upsert_token(
    pool: &PgPool,
    participant_id: Uuid,
    survey_id: Uuid,
) -> Result<AnonymousTokenRow, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO anonymous_tokens (id, participant_id, survey_id, token)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (participant_id, survey_id)
            DO UPDATE SET participant_id = EXCLUDED.participant_id
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(participant_id)
    .bind(survey_id)
    .bind(format!("tok_{}", Uuid::new_v4().simple()))
    .fetch_one(pool)
    .await
}

/// Ends a session: records final mood and ended_at, marks it completed.
/// Ending an already-completed session is an idempotent no-op so retries
/// are harmless; an unknown id is `SessionNotFound`.
pub async fn end_session(
    pool: &PgPool,
    session_id: Uuid,
    final_mood: Option<i32>,
) -> Result<(), AppError> {
    let session: Option<ConversationSessionRow> =
        sqlx::query_as("SELECT * FROM conversation_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;

    let session =
        session.ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))?;

    if session.status == SessionStatus::Completed.as_str() {
        return Ok(());
    }

    sqlx::query(
        r#"
        UPDATE conversation_sessions
        SET status = 'completed', phase = 'complete', final_mood = $2, ended_at = $3
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(final_mood)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    info!("Ended session {session_id}");
    Ok(())
}

/// Loads a session or fails with `SessionNotFound`.
pub async fn get_session(
    pool: &PgPool,
    session_id: Uuid,
) -> Result<ConversationSessionRow, AppError> {
    let session: Option<ConversationSessionRow> =
        sqlx::query_as("SELECT * FROM conversation_sessions WHERE id = $1")
            .bind(session_id)
            .fetch_optional(pool)
            .await?;
    session.ok_or_else(|| AppError::SessionNotFound(session_id.to_string()))
}
