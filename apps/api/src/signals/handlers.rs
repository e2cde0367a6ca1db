//! Axum route handlers for the Signals API: response submission (classify
//! and persist), the closed-filter response listing, aggregation, and the
//! theme-health read surface.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::health::ThemeHealthRow;
use crate::models::response::ResponseRow;
use crate::models::survey::ThemeRow;
use crate::session::is_preview_id;
use crate::signals::aggregator::{self, AggregationOutcome};
use crate::signals::classifier::{
    ClassifiedSignal, ClassifyContext, ESCALATION_THRESHOLD, URGENT_THRESHOLD,
};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitResponseRequest {
    pub survey_id: Uuid,
    pub session_id: String,
    pub content: String,
    pub ai_response: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponseResponse {
    /// None for preview sessions — the signal is classified but not stored.
    pub response_id: Option<Uuid>,
    pub signal: ClassifiedSignal,
    pub urgent: bool,
    pub escalated: bool,
}

/// The closed filter set: sentiment band, date range, urgent-only. No
/// free-form query language over responses.
#[derive(Debug, Deserialize)]
pub struct ResponseFilter {
    pub sentiment: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub urgent: bool,
}

#[derive(Debug, Deserialize)]
pub struct AggregateRequest {
    pub theme_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ThemeHealthEntry {
    #[serde(flatten)]
    pub row: ThemeHealthRow,
    pub stale: bool,
}

#[derive(Debug, Serialize)]
pub struct SurveyHealthResponse {
    pub survey_id: Uuid,
    pub themes: Vec<ThemeHealthEntry>,
    pub stale: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/responses
///
/// Classifies one submitted exchange and persists it. Classification never
/// fails: a degraded external path degrades to the keyword fallback inside
/// the classifier. Preview sessions get a classified signal back but
/// nothing is written.
pub async fn handle_submit_response(
    State(state): State<AppState>,
    Json(request): Json<SubmitResponseRequest>,
) -> Result<Json<SubmitResponseResponse>, AppError> {
    if request.content.trim().is_empty() {
        return Err(AppError::Validation("content cannot be empty".to_string()));
    }

    let themes: Vec<ThemeRow> = sqlx::query_as("SELECT * FROM themes WHERE survey_id = $1")
        .bind(request.survey_id)
        .fetch_all(&state.db)
        .await?;
    let context = ClassifyContext {
        survey_themes: themes.iter().map(|t| t.name.clone()).collect(),
    };

    let signal = state.classifier.classify(&request.content, &context).await;
    let urgent = signal.urgency_score >= URGENT_THRESHOLD;
    let escalated = signal.urgency_score >= ESCALATION_THRESHOLD;

    if is_preview_id(&request.session_id) {
        return Ok(Json(SubmitResponseResponse {
            response_id: None,
            signal,
            urgent,
            escalated,
        }));
    }

    let session_id: Uuid = request
        .session_id
        .parse()
        .map_err(|_| AppError::Validation("session_id is not a valid id".to_string()))?;

    let session = crate::session::lifecycle::get_session(&state.db, session_id).await?;
    if session.survey_id != request.survey_id {
        return Err(AppError::Forbidden);
    }
    if session.status != "active" {
        return Err(AppError::Validation(
            "Cannot submit a response to a completed session".to_string(),
        ));
    }

    let theme_id = signal.theme.as_deref().and_then(|name| {
        themes
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(name))
            .map(|t| t.id)
    });

    let row: ResponseRow = sqlx::query_as(
        r#"
        INSERT INTO responses
            (id, survey_id, session_id, content, ai_response, sentiment,
             sentiment_score, theme_id, urgency_score, escalated)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(request.survey_id)
    .bind(session_id)
    .bind(&request.content)
    .bind(&request.ai_response)
    .bind(signal.sentiment.as_str())
    .bind(signal.sentiment_score)
    .bind(theme_id)
    .bind(signal.urgency_score)
    .bind(escalated)
    .fetch_one(&state.db)
    .await?;

    Ok(Json(SubmitResponseResponse {
        response_id: Some(row.id),
        signal,
        urgent,
        escalated,
    }))
}

/// GET /api/v1/surveys/:id/responses
pub async fn handle_list_responses(
    State(state): State<AppState>,
    Path(survey_id): Path<Uuid>,
    Query(filter): Query<ResponseFilter>,
) -> Result<Json<Vec<ResponseRow>>, AppError> {
    if let Some(s) = &filter.sentiment {
        if crate::models::response::Sentiment::parse(s).is_none() {
            return Err(AppError::Validation(format!("Unknown sentiment band '{s}'")));
        }
    }

    let responses: Vec<ResponseRow> = sqlx::query_as(
        r#"
        SELECT * FROM responses
        WHERE survey_id = $1
          AND ($2::text IS NULL OR sentiment = $2)
          AND ($3::timestamptz IS NULL OR created_at >= $3)
          AND ($4::timestamptz IS NULL OR created_at <= $4)
          AND (NOT $5::bool OR urgency_score >= $6)
        ORDER BY created_at DESC
        "#,
    )
    .bind(survey_id)
    .bind(&filter.sentiment)
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.urgent)
    .bind(URGENT_THRESHOLD)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(responses))
}

/// POST /api/v1/surveys/:id/aggregate
///
/// Recomputes ThemeHealth for the survey (optionally one theme). Partial
/// failures come back alongside the successful rows.
pub async fn handle_aggregate(
    State(state): State<AppState>,
    Path(survey_id): Path<Uuid>,
    request: Option<Json<AggregateRequest>>,
) -> Result<Json<AggregationOutcome>, AppError> {
    let theme_id = request.and_then(|Json(r)| r.theme_id);
    let outcome = aggregator::aggregate(&state.db, survey_id, theme_id).await?;
    Ok(Json(outcome))
}

/// GET /api/v1/surveys/:id/health
///
/// Stored ThemeHealth rows with the read-side staleness check applied.
pub async fn handle_survey_health(
    State(state): State<AppState>,
    Path(survey_id): Path<Uuid>,
) -> Result<Json<SurveyHealthResponse>, AppError> {
    let rows: Vec<ThemeHealthRow> =
        sqlx::query_as("SELECT * FROM theme_health WHERE survey_id = $1 ORDER BY health_index")
            .bind(survey_id)
            .fetch_all(&state.db)
            .await?;

    let now = Utc::now();
    let themes: Vec<ThemeHealthEntry> = rows
        .into_iter()
        .map(|row| {
            let stale = aggregator::is_stale(Some(row.analyzed_at), now);
            ThemeHealthEntry { row, stale }
        })
        .collect();
    let stale = themes.is_empty() || themes.iter().any(|t| t.stale);

    Ok(Json(SurveyHealthResponse {
        survey_id,
        themes,
        stale,
    }))
}
