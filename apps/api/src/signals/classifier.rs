//! Signal Classifier — pluggable, trait-based classifier turning one raw
//! response into {sentiment, sentiment_score, theme, urgency_score}.
//!
//! Default: `KeywordClassifier` (pure-Rust, fast, deterministic, fully
//! testable). Optional: `LlmClassifier` (richer output via the external
//! text-analysis service), which degrades to the keyword path on any
//! transport or shape failure — classification never fails the caller.
//!
//! `AppState` holds an `Arc<dyn ResponseClassifier>`, swapped at startup
//! via ENABLE_LLM_CLASSIFIER.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::llm_client::LlmClient;
use crate::models::response::Sentiment;
use crate::signals::prompts::{CLASSIFY_PROMPT, CLASSIFY_SYSTEM};

/// Responses at or above this urgency are eligible for urgent surfacing.
pub const URGENT_THRESHOLD: i32 = 3;
/// Responses at or above this urgency carry an escalation flag downstream.
pub const ESCALATION_THRESHOLD: i32 = 4;

const POSITIVE_WORDS: &[&str] = &[
    "great",
    "good",
    "helpful",
    "excellent",
    "love",
    "enjoy",
    "appreciate",
    "appreciated",
    "supportive",
    "happy",
    "amazing",
    "fantastic",
    "proud",
    "motivated",
    "valued",
    "fair",
    "thriving",
];

const NEGATIVE_WORDS: &[&str] = &[
    "overwhelmed",
    "stressed",
    "stressful",
    "bad",
    "terrible",
    "frustrated",
    "frustrating",
    "exhausted",
    "burnout",
    "unhappy",
    "toxic",
    "unfair",
    "ignored",
    "confusing",
    "worried",
    "anxious",
    "angry",
    "micromanaged",
    "underpaid",
    "overworked",
];

// ────────────────────────────────────────────────────────────────────────────
// Output data model (shared across backends)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedSignal {
    pub sentiment: Sentiment,
    /// Fixed mapping on the keyword path: {+0.5, 0.0, −0.5}. The external
    /// path may return finer-grained values in [-1, 1].
    pub sentiment_score: f64,
    /// Theme name as classified; the handler resolves it to a theme row.
    pub theme: Option<String>,
    /// 0–5. Keyword path always yields 0.
    pub urgency_score: i32,
    pub key_insight: Option<String>,
    /// "keyword" | "llm" — for transparency in responses and logs.
    pub backend: &'static str,
}

/// Survey-scoped context handed to the classifier. Explicit per request —
/// no process-wide state feeds classification.
#[derive(Debug, Clone, Default)]
pub struct ClassifyContext {
    pub survey_themes: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// Implement this to swap classifier backends without touching handlers.
/// Infallible by contract: a degraded external dependency must fall back,
/// never surface an error to the participant-facing flow.
#[async_trait]
pub trait ResponseClassifier: Send + Sync {
    async fn classify(&self, text: &str, context: &ClassifyContext) -> ClassifiedSignal;
}

// ────────────────────────────────────────────────────────────────────────────
// KeywordClassifier — deterministic default
// ────────────────────────────────────────────────────────────────────────────

/// Pure keyword-set membership classifier. The downstream health-score math
/// depends on its fixed {-0.5, 0.0, +0.5} mapping — do not replace these
/// vectors with a continuous function of hit count.
pub struct KeywordClassifier;

#[async_trait]
impl ResponseClassifier for KeywordClassifier {
    async fn classify(&self, text: &str, _context: &ClassifyContext) -> ClassifiedSignal {
        classify_keywords(text)
    }
}

pub fn classify_keywords(text: &str) -> ClassifiedSignal {
    let mut positive_hits = 0usize;
    let mut negative_hits = 0usize;

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        if POSITIVE_WORDS.contains(&word.as_str()) {
            positive_hits += 1;
        } else if NEGATIVE_WORDS.contains(&word.as_str()) {
            negative_hits += 1;
        }
    }

    // Ties and zero-hit texts both land on neutral.
    let sentiment = if positive_hits > negative_hits {
        Sentiment::Positive
    } else if negative_hits > positive_hits {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };

    ClassifiedSignal {
        sentiment,
        sentiment_score: fixed_score(sentiment),
        theme: None,
        urgency_score: 0,
        key_insight: None,
        backend: "keyword",
    }
}

fn fixed_score(sentiment: Sentiment) -> f64 {
    match sentiment {
        Sentiment::Positive => 0.5,
        Sentiment::Negative => -0.5,
        Sentiment::Neutral => 0.0,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LlmClassifier — external path with mandatory degradation
// ────────────────────────────────────────────────────────────────────────────

/// Expected shape of the external classification payload. Anything that
/// fails to deserialize or validate is treated like a network failure.
#[derive(Debug, Deserialize)]
struct LlmClassification {
    sentiment: String,
    sentiment_score: f64,
    theme: Option<String>,
    urgency_score: Option<i32>,
    key_insight: Option<String>,
}

pub struct LlmClassifier {
    llm: LlmClient,
}

impl LlmClassifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ResponseClassifier for LlmClassifier {
    async fn classify(&self, text: &str, context: &ClassifyContext) -> ClassifiedSignal {
        let prompt = CLASSIFY_PROMPT
            .replace("{themes}", &context.survey_themes.join(", "))
            .replace("{text}", text);

        match self.llm.call_json::<LlmClassification>(&prompt, CLASSIFY_SYSTEM).await {
            Ok(raw) => match validate_classification(raw) {
                Some(signal) => signal,
                None => {
                    warn!("Classification degraded: external payload failed shape check");
                    classify_keywords(text)
                }
            },
            Err(e) => {
                warn!("Classification degraded: {e}");
                classify_keywords(text)
            }
        }
    }
}

fn validate_classification(raw: LlmClassification) -> Option<ClassifiedSignal> {
    let sentiment = Sentiment::parse(&raw.sentiment)?;
    if !raw.sentiment_score.is_finite() || !(-1.0..=1.0).contains(&raw.sentiment_score) {
        return None;
    }
    let urgency = raw.urgency_score.unwrap_or(0);
    if !(0..=5).contains(&urgency) {
        return None;
    }
    Some(ClassifiedSignal {
        sentiment,
        sentiment_score: raw.sentiment_score,
        theme: raw.theme.filter(|t| !t.trim().is_empty()),
        urgency_score: urgency,
        key_insight: raw.key_insight,
        backend: "llm",
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_text_scores_half() {
        let signal = classify_keywords("This is a great and helpful team");
        assert_eq!(signal.sentiment, Sentiment::Positive);
        assert_eq!(signal.sentiment_score, 0.5);
        assert_eq!(signal.urgency_score, 0);
    }

    #[test]
    fn test_negative_text_scores_negative_half() {
        let signal = classify_keywords("I feel overwhelmed and stressed");
        assert_eq!(signal.sentiment, Sentiment::Negative);
        assert_eq!(signal.sentiment_score, -0.5);
    }

    #[test]
    fn test_no_hits_is_neutral() {
        let signal = classify_keywords("It was fine I guess");
        assert_eq!(signal.sentiment, Sentiment::Neutral);
        assert_eq!(signal.sentiment_score, 0.0);
    }

    #[test]
    fn test_tie_is_neutral() {
        let signal = classify_keywords("The team is great but I am exhausted");
        assert_eq!(signal.sentiment, Sentiment::Neutral);
        assert_eq!(signal.sentiment_score, 0.0);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let signal = classify_keywords("GREAT, really GREAT!");
        assert_eq!(signal.sentiment, Sentiment::Positive);
    }

    #[test]
    fn test_keyword_backend_label() {
        assert_eq!(classify_keywords("anything").backend, "keyword");
    }

    #[test]
    fn test_validate_rejects_unknown_sentiment() {
        let raw = LlmClassification {
            sentiment: "ecstatic".to_string(),
            sentiment_score: 0.9,
            theme: None,
            urgency_score: None,
            key_insight: None,
        };
        assert!(validate_classification(raw).is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range_score() {
        let raw = LlmClassification {
            sentiment: "positive".to_string(),
            sentiment_score: 1.5,
            theme: None,
            urgency_score: None,
            key_insight: None,
        };
        assert!(validate_classification(raw).is_none());
    }

    #[test]
    fn test_validate_rejects_out_of_range_urgency() {
        let raw = LlmClassification {
            sentiment: "negative".to_string(),
            sentiment_score: -0.8,
            theme: None,
            urgency_score: Some(9),
            key_insight: None,
        };
        assert!(validate_classification(raw).is_none());
    }

    #[test]
    fn test_validate_accepts_well_formed_payload() {
        let raw = LlmClassification {
            sentiment: "negative".to_string(),
            sentiment_score: -0.8,
            theme: Some("workload".to_string()),
            urgency_score: Some(4),
            key_insight: Some("chronic overtime".to_string()),
        };
        let signal = validate_classification(raw).unwrap();
        assert_eq!(signal.sentiment, Sentiment::Negative);
        assert_eq!(signal.urgency_score, 4);
        assert_eq!(signal.backend, "llm");
        assert!(signal.urgency_score >= ESCALATION_THRESHOLD);
    }

    #[test]
    fn test_urgency_thresholds_are_fixed_policy() {
        // Urgent surfacing at 3, escalation at 4. The read path binds
        // URGENT_THRESHOLD, so these values gate both write and read.
        assert_eq!(URGENT_THRESHOLD, 3);
        assert_eq!(ESCALATION_THRESHOLD, 4);
        assert!(URGENT_THRESHOLD < ESCALATION_THRESHOLD);
    }

    #[test]
    fn test_validate_drops_blank_theme() {
        let raw = LlmClassification {
            sentiment: "neutral".to_string(),
            sentiment_score: 0.0,
            theme: Some("   ".to_string()),
            urgency_score: Some(0),
            key_insight: None,
        };
        assert_eq!(validate_classification(raw).unwrap().theme, None);
    }
}
