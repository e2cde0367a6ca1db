//! Signal Aggregator — batches classified responses per (survey, theme)
//! into a `ThemeHealth` record: health index, intensity, direction,
//! polarization, and extracted root causes.
//!
//! Each run fully replaces the prior row for a (survey, theme) pair. Voice
//! weighting is consistent everywhere: one classified response is one voice.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::health::{PolarizationLevel, ThemeHealthRow};
use crate::models::response::ResponseRow;
use crate::models::survey::ThemeRow;

/// Themes at or above this health index are considered thriving.
pub const THRIVING_THRESHOLD: f64 = 70.0;
/// Themes below this health index are critical; only they get root causes.
pub const CRITICAL_THRESHOLD: f64 = 40.0;
/// |sentiment_score| at or above this marks a voice as strongly opinionated.
const STRONG_SENTIMENT_THRESHOLD: f64 = 0.4;
/// Aggregations older than this are stale on the read side.
pub const STALENESS_HOURS: i64 = 24;
/// Response count at which confidence saturates at 1.0.
const CONFIDENCE_SATURATION: f64 = 20.0;

// ────────────────────────────────────────────────────────────────────────────
// Report data model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ThemeInsights {
    pub frictions: Vec<String>,
    pub strengths: Vec<String>,
    pub patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootCause {
    pub cause: String,
    /// high / medium / low, from the fraction of negative voices explained.
    pub impact_level: String,
    pub explained_fraction: f64,
    pub recommendation: String,
}

/// One theme's computed health, ready to persist.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeHealthReport {
    pub theme_id: Uuid,
    pub theme_name: String,
    pub health_index: f64,
    pub intensity_score: f64,
    pub direction_score: f64,
    pub polarization_score: f64,
    pub polarization_level: PolarizationLevel,
    pub insights: ThemeInsights,
    pub root_causes: Vec<RootCause>,
    pub response_count: usize,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeFailure {
    pub theme_id: Uuid,
    pub error: String,
}

/// Aggregate result: successful reports plus isolated per-theme failures.
/// A single bad theme never blocks the rest of the run.
#[derive(Debug, Serialize)]
pub struct AggregationOutcome {
    pub theme_health: Vec<ThemeHealthRow>,
    pub failures: Vec<ThemeFailure>,
    pub analyzed_at: DateTime<Utc>,
}

// ────────────────────────────────────────────────────────────────────────────
// Root cause vocabulary (fixed business policy, not a configurable model)
// ────────────────────────────────────────────────────────────────────────────

struct CausePattern {
    cause: &'static str,
    markers: &'static [&'static str],
    recommendation: &'static str,
}

const CAUSE_PATTERNS: &[CausePattern] = &[
    CausePattern {
        cause: "workload",
        markers: &[
            "overwhelmed",
            "overworked",
            "workload",
            "hours",
            "deadline",
            "deadlines",
            "burnout",
            "exhausted",
            "stressed",
            "stress",
        ],
        recommendation: "Review workload distribution and staffing for this area",
    },
    CausePattern {
        cause: "management",
        markers: &[
            "manager",
            "management",
            "leadership",
            "micromanaged",
            "micromanagement",
            "supervisor",
        ],
        recommendation: "Coach people managers on the concerns raised in this theme",
    },
    CausePattern {
        cause: "communication",
        markers: &[
            "communication",
            "unclear",
            "confusing",
            "informed",
            "transparency",
            "silo",
            "silos",
        ],
        recommendation: "Clarify decision-making and tighten the communication loop",
    },
    CausePattern {
        cause: "recognition",
        markers: &[
            "recognition",
            "appreciated",
            "valued",
            "credit",
            "underpaid",
            "compensation",
            "pay",
        ],
        recommendation: "Audit recognition and compensation practices for this group",
    },
    CausePattern {
        cause: "growth",
        markers: &[
            "growth",
            "career",
            "promotion",
            "learning",
            "stuck",
            "development",
            "opportunity",
        ],
        recommendation: "Create visible growth paths and development opportunities",
    },
];

// ────────────────────────────────────────────────────────────────────────────
// Pure computation
// ────────────────────────────────────────────────────────────────────────────

/// Computes a theme's health report from its classified responses.
pub fn compute_theme_health(
    theme_id: Uuid,
    theme_name: &str,
    responses: &[ResponseRow],
) -> ThemeHealthReport {
    let total = responses.len();
    let positive_voices = responses.iter().filter(|r| r.sentiment == "positive").count();
    let negative_voices = responses.iter().filter(|r| r.sentiment == "negative").count();

    // Centered at 50, saturating at the extremes. Downstream thresholds
    // (≥70 thriving, <40 critical) depend on this exact scale.
    let (direction_score, health_index) = if total == 0 {
        (0.0, 50.0)
    } else {
        let direction = (positive_voices as f64 - negative_voices as f64) / total as f64;
        (direction, (((direction) + 1.0) * 50.0).clamp(0.0, 100.0))
    };

    let intensity_score = if total == 0 {
        0.0
    } else {
        let sum: f64 = responses.iter().map(|r| r.sentiment_score.abs()).sum();
        ((sum / total as f64) * 100.0).clamp(0.0, 100.0)
    };

    let polarization_score = compute_polarization(responses);
    let polarization_level = PolarizationLevel::from_score(polarization_score);

    let root_causes = if total > 0 && health_index < CRITICAL_THRESHOLD {
        extract_root_causes(responses)
    } else {
        Vec::new()
    };

    let insights = build_insights(
        theme_name,
        responses,
        positive_voices,
        negative_voices,
        health_index,
        polarization_level,
        &root_causes,
    );

    let confidence = (total as f64 / CONFIDENCE_SATURATION).clamp(0.0, 1.0);

    ThemeHealthReport {
        theme_id,
        theme_name: theme_name.to_string(),
        health_index,
        intensity_score,
        direction_score,
        polarization_score,
        polarization_level,
        insights,
        root_causes,
        response_count: total,
        confidence,
    }
}

/// Spread between strongly positive and strongly negative camps, 0–100.
///
/// `100 · (1 − |sp − sn| / (sp + sn)) · ((sp + sn) / total)` where sp/sn are
/// strong-positive/strong-negative voice counts. Balanced extremes score
/// 100; all-neutral scores 0 — this measures opposing camps, not variance
/// around a mean.
fn compute_polarization(responses: &[ResponseRow]) -> f64 {
    let total = responses.len();
    if total == 0 {
        return 0.0;
    }
    let strong_pos = responses
        .iter()
        .filter(|r| r.sentiment_score >= STRONG_SENTIMENT_THRESHOLD)
        .count() as f64;
    let strong_neg = responses
        .iter()
        .filter(|r| r.sentiment_score <= -STRONG_SENTIMENT_THRESHOLD)
        .count() as f64;
    let strong_total = strong_pos + strong_neg;
    if strong_total == 0.0 {
        return 0.0;
    }
    let balance = 1.0 - (strong_pos - strong_neg).abs() / strong_total;
    let coverage = strong_total / total as f64;
    (100.0 * balance * coverage).clamp(0.0, 100.0)
}

/// Root causes are only extracted for critical themes. Each cause explains
/// a fraction of the negative voices; causes explaining none are dropped.
fn extract_root_causes(responses: &[ResponseRow]) -> Vec<RootCause> {
    let negatives: Vec<&ResponseRow> = responses
        .iter()
        .filter(|r| r.sentiment == "negative")
        .collect();
    if negatives.is_empty() {
        return Vec::new();
    }

    let mut causes = Vec::new();
    for pattern in CAUSE_PATTERNS {
        let matched = negatives
            .iter()
            .filter(|r| {
                let lower = r.content.to_lowercase();
                pattern.markers.iter().any(|m| lower.contains(m))
            })
            .count();
        if matched == 0 {
            continue;
        }
        let fraction = matched as f64 / negatives.len() as f64;
        causes.push(RootCause {
            cause: pattern.cause.to_string(),
            impact_level: impact_level(fraction).to_string(),
            explained_fraction: fraction,
            recommendation: pattern.recommendation.to_string(),
        });
    }
    causes.sort_by(|a, b| {
        b.explained_fraction
            .partial_cmp(&a.explained_fraction)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    causes
}

fn impact_level(fraction: f64) -> &'static str {
    if fraction >= 0.5 {
        "high"
    } else if fraction >= 0.25 {
        "medium"
    } else {
        "low"
    }
}

fn build_insights(
    theme_name: &str,
    responses: &[ResponseRow],
    positive_voices: usize,
    negative_voices: usize,
    health_index: f64,
    polarization_level: PolarizationLevel,
    root_causes: &[RootCause],
) -> ThemeInsights {
    let snippet = |r: &ResponseRow| {
        let mut s: String = r.content.chars().take(80).collect();
        if r.content.chars().count() > 80 {
            s.push('…');
        }
        s
    };

    let frictions: Vec<String> = if root_causes.is_empty() {
        responses
            .iter()
            .filter(|r| r.sentiment == "negative")
            .take(3)
            .map(snippet)
            .collect()
    } else {
        root_causes
            .iter()
            .map(|c| format!("{} ({} impact)", c.cause, c.impact_level))
            .collect()
    };

    let strengths: Vec<String> = responses
        .iter()
        .filter(|r| r.sentiment == "positive")
        .take(3)
        .map(snippet)
        .collect();

    let mut patterns = Vec::new();
    let total = responses.len();
    if total > 0 {
        patterns.push(format!(
            "{positive_voices} of {total} voices lean positive, {negative_voices} negative"
        ));
    }
    if health_index >= THRIVING_THRESHOLD {
        patterns.push(format!("'{theme_name}' is thriving"));
    } else if total > 0 && health_index < CRITICAL_THRESHOLD {
        patterns.push(format!("'{theme_name}' is in critical territory"));
    }
    if polarization_level == PolarizationLevel::High {
        patterns.push("Opinions split into opposing camps on this theme".to_string());
    }

    ThemeInsights {
        frictions,
        strengths,
        patterns,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Batch run against storage
// ────────────────────────────────────────────────────────────────────────────

/// Aggregates a survey's responses into ThemeHealth rows, optionally scoped
/// to one theme. Tolerates reading a mid-flight write set — no transactional
/// snapshot is taken across the survey.
pub async fn aggregate(
    pool: &PgPool,
    survey_id: Uuid,
    theme_id: Option<Uuid>,
) -> Result<AggregationOutcome, AppError> {
    let themes: Vec<ThemeRow> = match theme_id {
        Some(tid) => {
            sqlx::query_as("SELECT * FROM themes WHERE survey_id = $1 AND id = $2")
                .bind(survey_id)
                .bind(tid)
                .fetch_all(pool)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM themes WHERE survey_id = $1 ORDER BY name")
                .bind(survey_id)
                .fetch_all(pool)
                .await?
        }
    };

    if themes.is_empty() {
        return Err(AppError::NotFound(format!(
            "No themes found for survey {survey_id}"
        )));
    }

    let responses: Vec<ResponseRow> =
        sqlx::query_as("SELECT * FROM responses WHERE survey_id = $1 AND theme_id IS NOT NULL")
            .bind(survey_id)
            .fetch_all(pool)
            .await?;

    let mut by_theme: HashMap<Uuid, Vec<ResponseRow>> = HashMap::new();
    for response in responses {
        if let Some(tid) = response.theme_id {
            by_theme.entry(tid).or_default().push(response);
        }
    }

    let analyzed_at = Utc::now();
    let mut theme_health = Vec::new();
    let mut failures = Vec::new();

    for theme in &themes {
        let empty = Vec::new();
        let group = by_theme.get(&theme.id).unwrap_or(&empty);
        let report = compute_theme_health(theme.id, &theme.name, group);

        match replace_theme_health(pool, survey_id, &report, analyzed_at).await {
            Ok(row) => theme_health.push(row),
            Err(e) => {
                error!("Aggregation failed for theme {}: {e}", theme.id);
                failures.push(ThemeFailure {
                    theme_id: theme.id,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(
        "Aggregated survey {survey_id}: {} themes computed, {} failed",
        theme_health.len(),
        failures.len()
    );

    Ok(AggregationOutcome {
        theme_health,
        failures,
        analyzed_at,
    })
}

/// Full-row replacement for one (survey, theme) pair — never merged, so a
/// stale partial run can never drift against a fresh full run.
async fn replace_theme_health(
    pool: &PgPool,
    survey_id: Uuid,
    report: &ThemeHealthReport,
    analyzed_at: DateTime<Utc>,
) -> Result<ThemeHealthRow, sqlx::Error> {
    sqlx::query_as(
        r#"
        INSERT INTO theme_health
            (id, survey_id, theme_id, health_index, intensity_score, direction_score,
             polarization_level, polarization_score, insights, root_causes,
             response_count, confidence, analyzed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        ON CONFLICT (survey_id, theme_id) DO UPDATE SET
            health_index = EXCLUDED.health_index,
            intensity_score = EXCLUDED.intensity_score,
            direction_score = EXCLUDED.direction_score,
            polarization_level = EXCLUDED.polarization_level,
            polarization_score = EXCLUDED.polarization_score,
            insights = EXCLUDED.insights,
            root_causes = EXCLUDED.root_causes,
            response_count = EXCLUDED.response_count,
            confidence = EXCLUDED.confidence,
            analyzed_at = EXCLUDED.analyzed_at
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(survey_id)
    .bind(report.theme_id)
    .bind(report.health_index)
    .bind(report.intensity_score)
    .bind(report.direction_score)
    .bind(report.polarization_level.as_str())
    .bind(report.polarization_score)
    .bind(serde_json::to_value(&report.insights).unwrap_or_default())
    .bind(serde_json::to_value(&report.root_causes).unwrap_or_default())
    .bind(report.response_count as i32)
    .bind(report.confidence)
    .bind(analyzed_at)
    .fetch_one(pool)
    .await
}

/// Read-side staleness check: older than 24h, or missing entirely.
pub fn is_stale(analyzed_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    match analyzed_at {
        None => true,
        Some(at) => now - at > Duration::hours(STALENESS_HOURS),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(sentiment: &str, score: f64, content: &str) -> ResponseRow {
        ResponseRow {
            id: Uuid::new_v4(),
            survey_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            content: content.to_string(),
            ai_response: None,
            sentiment: sentiment.to_string(),
            sentiment_score: score,
            theme_id: Some(Uuid::new_v4()),
            urgency_score: 0,
            escalated: false,
            created_at: Utc::now(),
        }
    }

    fn positives(n: usize) -> Vec<ResponseRow> {
        (0..n)
            .map(|_| make_response("positive", 0.5, "great team"))
            .collect()
    }

    fn negatives(n: usize) -> Vec<ResponseRow> {
        (0..n)
            .map(|_| make_response("negative", -0.5, "too much workload, always stressed"))
            .collect()
    }

    fn neutrals(n: usize) -> Vec<ResponseRow> {
        (0..n)
            .map(|_| make_response("neutral", 0.0, "it was fine"))
            .collect()
    }

    #[test]
    fn test_health_index_seven_positive_three_negative_is_70() {
        let mut responses = positives(7);
        responses.extend(negatives(3));
        let report = compute_theme_health(Uuid::new_v4(), "culture", &responses);
        assert_eq!(report.health_index, 70.0);
        assert_eq!(report.response_count, 10);
    }

    #[test]
    fn test_health_index_empty_group_is_exactly_50() {
        let report = compute_theme_health(Uuid::new_v4(), "culture", &[]);
        assert_eq!(report.health_index, 50.0);
        assert_eq!(report.direction_score, 0.0);
        assert_eq!(report.confidence, 0.0);
        assert!(report.root_causes.is_empty());
    }

    #[test]
    fn test_health_index_all_positive_is_100() {
        let report = compute_theme_health(Uuid::new_v4(), "culture", &positives(5));
        assert_eq!(report.health_index, 100.0);
    }

    #[test]
    fn test_health_index_all_negative_is_0() {
        let report = compute_theme_health(Uuid::new_v4(), "culture", &negatives(5));
        assert_eq!(report.health_index, 0.0);
    }

    #[test]
    fn test_health_index_always_in_bounds() {
        for (pos, neg, neu) in [(0, 0, 0), (1, 0, 0), (0, 1, 0), (3, 3, 3), (10, 1, 0)] {
            let mut responses = positives(pos);
            responses.extend(negatives(neg));
            responses.extend(neutrals(neu));
            let report = compute_theme_health(Uuid::new_v4(), "t", &responses);
            assert!(
                (0.0..=100.0).contains(&report.health_index),
                "health_index {} out of bounds",
                report.health_index
            );
        }
    }

    #[test]
    fn test_balanced_extremes_polarize_more_than_all_neutral() {
        // Same mean sentiment (0), very different polarization.
        let mut split = positives(5);
        split.extend(negatives(5));
        let split_report = compute_theme_health(Uuid::new_v4(), "t", &split);

        let neutral_report = compute_theme_health(Uuid::new_v4(), "t", &neutrals(10));

        assert_eq!(split_report.polarization_score, 100.0);
        assert_eq!(neutral_report.polarization_score, 0.0);
        assert_eq!(split_report.polarization_level, PolarizationLevel::High);
        assert_eq!(neutral_report.polarization_level, PolarizationLevel::Low);
    }

    #[test]
    fn test_lopsided_strong_voices_polarize_less_than_balanced() {
        let mut lopsided = positives(9);
        lopsided.extend(negatives(1));
        let lopsided_report = compute_theme_health(Uuid::new_v4(), "t", &lopsided);

        let mut balanced = positives(5);
        balanced.extend(negatives(5));
        let balanced_report = compute_theme_health(Uuid::new_v4(), "t", &balanced);

        assert!(lopsided_report.polarization_score < balanced_report.polarization_score);
    }

    #[test]
    fn test_root_causes_only_for_critical_themes() {
        // Healthy theme: no root causes even with some negatives.
        let mut healthy = positives(8);
        healthy.extend(negatives(2));
        let healthy_report = compute_theme_health(Uuid::new_v4(), "t", &healthy);
        assert!(healthy_report.health_index >= CRITICAL_THRESHOLD);
        assert!(healthy_report.root_causes.is_empty());

        // Critical theme: workload markers in every negative response.
        let critical_report = compute_theme_health(Uuid::new_v4(), "t", &negatives(5));
        assert!(critical_report.health_index < CRITICAL_THRESHOLD);
        let workload = critical_report
            .root_causes
            .iter()
            .find(|c| c.cause == "workload")
            .expect("workload cause extracted");
        assert_eq!(workload.impact_level, "high");
        assert_eq!(workload.explained_fraction, 1.0);
        assert!(!workload.recommendation.is_empty());
    }

    #[test]
    fn test_root_causes_sorted_by_explained_fraction() {
        let mut responses = vec![
            make_response("negative", -0.5, "my manager ignores feedback"),
            make_response("negative", -0.5, "too much workload and stress"),
            make_response("negative", -0.5, "deadlines and workload are brutal"),
            make_response("negative", -0.5, "workload never lets up"),
        ];
        responses.push(make_response("neutral", 0.0, "okay I suppose"));
        let report = compute_theme_health(Uuid::new_v4(), "t", &responses);
        assert!(report.health_index < CRITICAL_THRESHOLD);
        assert!(report.root_causes.len() >= 2);
        assert_eq!(report.root_causes[0].cause, "workload");
        for pair in report.root_causes.windows(2) {
            assert!(pair[0].explained_fraction >= pair[1].explained_fraction);
        }
    }

    #[test]
    fn test_impact_level_thresholds() {
        assert_eq!(impact_level(0.5), "high");
        assert_eq!(impact_level(0.49), "medium");
        assert_eq!(impact_level(0.25), "medium");
        assert_eq!(impact_level(0.24), "low");
    }

    #[test]
    fn test_confidence_saturates_at_20_responses() {
        let report = compute_theme_health(Uuid::new_v4(), "t", &positives(40));
        assert_eq!(report.confidence, 1.0);
        let small = compute_theme_health(Uuid::new_v4(), "t", &positives(5));
        assert_eq!(small.confidence, 0.25);
    }

    #[test]
    fn test_intensity_reflects_strength_of_scores() {
        let strong = compute_theme_health(Uuid::new_v4(), "t", &positives(4));
        let flat = compute_theme_health(Uuid::new_v4(), "t", &neutrals(4));
        assert_eq!(strong.intensity_score, 50.0);
        assert_eq!(flat.intensity_score, 0.0);
    }

    #[test]
    fn test_insights_mention_voice_split() {
        let mut responses = positives(7);
        responses.extend(negatives(3));
        let report = compute_theme_health(Uuid::new_v4(), "culture", &responses);
        assert!(report
            .insights
            .patterns
            .iter()
            .any(|p| p.contains("7 of 10")));
        assert!(!report.insights.strengths.is_empty());
    }

    #[test]
    fn test_staleness_window() {
        let now = Utc::now();
        assert!(is_stale(None, now));
        assert!(is_stale(Some(now - Duration::hours(25)), now));
        assert!(!is_stale(Some(now - Duration::hours(23)), now));
    }
}
