//! Retention Enforcer — idempotent batch job. For each active survey it
//! computes a cutoff from the survey's retention policy, deletes expired
//! responses, cleans up sessions left with zero responses, and writes one
//! audit log row per survey that had deletions.
//!
//! Surveys are independent units of work: a failure in one is recorded and
//! the run continues. Within one survey the delete-responses →
//! delete-orphan-sessions → write-log order is fixed, since orphan
//! detection depends on the prior delete having committed. Aggregate
//! ThemeHealth history is never touched.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::retention::ExecutionType;
use crate::models::survey::SurveyRow;

#[derive(Debug, Clone, Serialize)]
pub struct SurveyCleanupResult {
    pub survey_id: Uuid,
    pub responses_deleted: u64,
    pub sessions_deleted: u64,
    pub retention_days: i32,
    pub log_written: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SurveyCleanupFailure {
    pub survey_id: Uuid,
    pub error: String,
}

/// Aggregate run report: totals plus per-survey results and failures.
#[derive(Debug, Serialize)]
pub struct RetentionRunReport {
    pub total_deleted: u64,
    pub surveys: Vec<SurveyCleanupResult>,
    pub failures: Vec<SurveyCleanupFailure>,
    pub executed_at: DateTime<Utc>,
}

/// The oldest timestamp a response may carry before it becomes eligible
/// for deletion under a survey's policy.
pub fn cutoff_for(now: DateTime<Utc>, retention_days: i32) -> DateTime<Utc> {
    now - Duration::days(retention_days.max(0) as i64)
}

/// An audit row is owed only when a run actually deleted something; a pass
/// that finds nothing expirable must not append to the log.
fn log_required(responses_deleted: u64) -> bool {
    responses_deleted > 0
}

fn survey_result(
    survey: &SurveyRow,
    responses_deleted: u64,
    sessions_deleted: u64,
) -> SurveyCleanupResult {
    SurveyCleanupResult {
        survey_id: survey.id,
        responses_deleted,
        sessions_deleted,
        retention_days: survey.retention_days,
        log_written: log_required(responses_deleted),
    }
}

/// Runs cleanup across all active surveys. Never aborts mid-run because of
/// a single bad survey; re-running with no new expirable data is a safe
/// no-op (zero deletions, zero new log rows).
pub async fn run_retention_cleanup(
    pool: &PgPool,
    execution_type: ExecutionType,
) -> Result<RetentionRunReport, AppError> {
    let executed_at = Utc::now();
    let surveys: Vec<SurveyRow> = sqlx::query_as("SELECT * FROM surveys WHERE status = 'active'")
        .fetch_all(pool)
        .await?;

    let mut results = Vec::new();
    let mut failures = Vec::new();
    let mut total_deleted = 0u64;

    for survey in &surveys {
        match enforce_for_survey(pool, survey, executed_at, execution_type).await {
            Ok(result) => {
                total_deleted += result.responses_deleted;
                results.push(result);
            }
            Err(e) => {
                error!("Retention cleanup failed for survey {}: {e}", survey.id);
                failures.push(SurveyCleanupFailure {
                    survey_id: survey.id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Retention run ({}) deleted {} responses across {} surveys ({} failed)",
        execution_type.as_str(),
        total_deleted,
        results.len(),
        failures.len()
    );

    Ok(RetentionRunReport {
        total_deleted,
        surveys: results,
        failures,
        executed_at,
    })
}

async fn enforce_for_survey(
    pool: &PgPool,
    survey: &SurveyRow,
    now: DateTime<Utc>,
    execution_type: ExecutionType,
) -> Result<SurveyCleanupResult, sqlx::Error> {
    let cutoff = cutoff_for(now, survey.retention_days);

    // 1. Delete expired responses, remembering which sessions they touched.
    let touched: Vec<(Uuid,)> = sqlx::query_as(
        "DELETE FROM responses WHERE survey_id = $1 AND created_at < $2 RETURNING session_id",
    )
    .bind(survey.id)
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    let responses_deleted = touched.len() as u64;
    if !log_required(responses_deleted) {
        return Ok(survey_result(survey, 0, 0));
    }

    let mut session_ids: Vec<Uuid> = touched.into_iter().map(|(id,)| id).collect();
    session_ids.sort();
    session_ids.dedup();

    // 2. Drop touched sessions only when zero responses still reference
    // them; sessions with any surviving response stay.
    let sessions_deleted = sqlx::query(
        r#"
        DELETE FROM conversation_sessions
        WHERE id = ANY($1)
          AND NOT EXISTS (
              SELECT 1 FROM responses r WHERE r.session_id = conversation_sessions.id
          )
        "#,
    )
    .bind(&session_ids)
    .execute(pool)
    .await?
    .rows_affected();

    // 3. One audit row per survey with deletions.
    sqlx::query(
        r#"
        INSERT INTO data_retention_logs
            (id, survey_id, records_deleted_count, retention_policy_days,
             execution_type, executed_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(survey.id)
    .bind(responses_deleted as i32)
    .bind(survey.retention_days)
    .bind(execution_type.as_str())
    .bind(now)
    .execute(pool)
    .await?;

    info!(
        "Survey {}: deleted {} responses and {} orphaned sessions (cutoff {})",
        survey.id, responses_deleted, sessions_deleted, cutoff
    );

    Ok(survey_result(survey, responses_deleted, sessions_deleted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_cutoff_is_retention_days_before_now() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let cutoff = cutoff_for(now, 60);
        assert_eq!(cutoff, now - Duration::days(60));
    }

    #[test]
    fn test_cutoff_boundary_classification() {
        // retention_days=60: a response at now−61d is expired, now−10d is not.
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let cutoff = cutoff_for(now, 60);
        assert!(now - Duration::days(61) < cutoff);
        assert!(now - Duration::days(10) >= cutoff);
    }

    #[test]
    fn test_negative_retention_treated_as_zero() {
        let now = Utc::now();
        assert_eq!(cutoff_for(now, -5), now);
    }

    fn survey(retention_days: i32) -> SurveyRow {
        SurveyRow {
            id: Uuid::new_v4(),
            name: "quarterly pulse".to_string(),
            status: "active".to_string(),
            retention_days,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_zero_deletion_run_writes_no_log_row() {
        // A second pass with nothing expirable must leave the audit trail
        // untouched: no deletions means no log row is owed.
        assert!(!log_required(0));
        let result = survey_result(&survey(60), 0, 0);
        assert!(!result.log_written);
        assert_eq!(result.responses_deleted, 0);
        assert_eq!(result.sessions_deleted, 0);
    }

    #[test]
    fn test_deletions_require_exactly_one_log_row() {
        assert!(log_required(1));
        let s = survey(60);
        let result = survey_result(&s, 3, 1);
        assert!(result.log_written);
        assert_eq!(result.retention_days, 60);
        assert_eq!(result.survey_id, s.id);
    }
}
