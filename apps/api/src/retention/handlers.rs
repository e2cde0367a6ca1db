//! Axum route handler for retention cleanup. The external scheduler hits
//! this endpoint daily with `execution_type=automatic`; operators use the
//! same endpoint for manual runs.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::retention::{DataRetentionLogRow, ExecutionType};
use crate::retention::enforcer::{run_retention_cleanup, RetentionRunReport};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RetentionRunQuery {
    pub execution_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RetentionLogQuery {
    pub survey_id: Option<Uuid>,
}

/// POST /api/v1/retention/run
pub async fn handle_run_retention(
    State(state): State<AppState>,
    Query(query): Query<RetentionRunQuery>,
) -> Result<Json<RetentionRunReport>, AppError> {
    let execution_type = match query.execution_type.as_deref() {
        None | Some("manual") => ExecutionType::Manual,
        Some("automatic") => ExecutionType::Automatic,
        Some(other) => {
            return Err(AppError::Validation(format!(
                "Unknown execution_type '{other}'"
            )))
        }
    };

    let report = run_retention_cleanup(&state.db, execution_type).await?;
    Ok(Json(report))
}

/// GET /api/v1/retention/logs
///
/// The append-only audit trail, optionally scoped to one survey.
pub async fn handle_list_retention_logs(
    State(state): State<AppState>,
    Query(query): Query<RetentionLogQuery>,
) -> Result<Json<Vec<DataRetentionLogRow>>, AppError> {
    let logs: Vec<DataRetentionLogRow> = sqlx::query_as(
        r#"
        SELECT * FROM data_retention_logs
        WHERE ($1::uuid IS NULL OR survey_id = $1)
        ORDER BY executed_at DESC
        "#,
    )
    .bind(query.survey_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(logs))
}
