use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PolarizationLevel {
    Low,
    Medium,
    High,
}

impl PolarizationLevel {
    /// Buckets a 0–100 polarization score: low <33, medium <66, high ≥66.
    pub fn from_score(score: f64) -> Self {
        if score >= 66.0 {
            PolarizationLevel::High
        } else if score >= 33.0 {
            PolarizationLevel::Medium
        } else {
            PolarizationLevel::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolarizationLevel::Low => "low",
            PolarizationLevel::Medium => "medium",
            PolarizationLevel::High => "high",
        }
    }
}

/// Aggregate health record for one (survey, theme) pair. Fully replaced on
/// each aggregation run, never merged.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ThemeHealthRow {
    pub id: Uuid,
    pub survey_id: Uuid,
    pub theme_id: Uuid,
    pub health_index: f64,
    pub intensity_score: f64,
    pub direction_score: f64,
    pub polarization_level: String,
    pub polarization_score: f64,
    pub insights: Value,
    pub root_causes: Value,
    pub response_count: i32,
    pub confidence: f64,
    pub analyzed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polarization_buckets() {
        assert_eq!(PolarizationLevel::from_score(0.0), PolarizationLevel::Low);
        assert_eq!(PolarizationLevel::from_score(32.9), PolarizationLevel::Low);
        assert_eq!(
            PolarizationLevel::from_score(33.0),
            PolarizationLevel::Medium
        );
        assert_eq!(
            PolarizationLevel::from_score(65.9),
            PolarizationLevel::Medium
        );
        assert_eq!(PolarizationLevel::from_score(66.0), PolarizationLevel::High);
        assert_eq!(
            PolarizationLevel::from_score(100.0),
            PolarizationLevel::High
        );
    }
}
