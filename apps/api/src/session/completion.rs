//! Interview completion state machine: active → reviewing → complete, with
//! a once-per-review-entry "add more" side transition back to active.
//!
//! The machine itself is a pure struct; phase, closing summary and the
//! add-more flag persist on the session row and are re-read per request.
//! Early finish must never dead-end the participant: if the summarizer
//! fails or returns an unusable shape, a deterministic fallback summary is
//! built from the transcript.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::llm_client::LlmClient;
use crate::models::session::{ConversationSessionRow, InterviewPhase};
use crate::session::lifecycle;
use crate::session::prompts::{SUMMARY_PROMPT, SUMMARY_SYSTEM};

const FALLBACK_MESSAGE_COUNT: usize = 3;
const FALLBACK_TRUNCATE_CHARS: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredSummary {
    pub overview: String,
    pub key_points: Vec<String>,
    pub sentiment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub role: String,
    pub content: String,
}

/// Read-only projection surfaced with every session state. Coverage never
/// gates a transition.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeCoverage {
    pub discussed_themes: i64,
    pub total_themes: i64,
    pub coverage: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Pure state machine
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompletionState {
    phase: InterviewPhase,
    summary: Option<StructuredSummary>,
    add_more_used: bool,
}

impl CompletionState {
    pub fn new(
        phase: InterviewPhase,
        summary: Option<StructuredSummary>,
        add_more_used: bool,
    ) -> Self {
        Self {
            phase,
            summary,
            add_more_used,
        }
    }

    pub fn from_row(row: &ConversationSessionRow) -> Result<Self, AppError> {
        let phase = InterviewPhase::parse(&row.phase).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Session {} has invalid phase", row.id))
        })?;
        let summary = row
            .closing_summary
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());
        Ok(Self::new(phase, summary, row.add_more_used))
    }

    pub fn current_state(&self) -> InterviewPhase {
        self.phase
    }

    pub fn summary(&self) -> Option<&StructuredSummary> {
        self.summary.as_ref()
    }

    pub fn add_more_used(&self) -> bool {
        self.add_more_used
    }

    /// active → reviewing, attaching the closing summary. Re-entering a
    /// review re-arms the add-more transition.
    pub fn enter_review(&mut self, summary: StructuredSummary) -> Result<(), AppError> {
        if self.phase != InterviewPhase::Active {
            return Err(invalid(self.phase, InterviewPhase::Reviewing));
        }
        self.phase = InterviewPhase::Reviewing;
        self.summary = Some(summary);
        self.add_more_used = false;
        Ok(())
    }

    /// reviewing → active, clearing the summary. Allowed exactly once per
    /// review entry.
    pub fn add_more(&mut self) -> Result<(), AppError> {
        if self.phase != InterviewPhase::Reviewing || self.add_more_used {
            return Err(invalid(self.phase, InterviewPhase::Active));
        }
        self.phase = InterviewPhase::Active;
        self.summary = None;
        self.add_more_used = true;
        Ok(())
    }

    /// active|reviewing → complete. A participant may complete without
    /// ever reviewing. Complete is terminal.
    pub fn complete(&mut self) -> Result<(), AppError> {
        if self.phase == InterviewPhase::Complete {
            return Err(invalid(self.phase, InterviewPhase::Complete));
        }
        self.phase = InterviewPhase::Complete;
        Ok(())
    }
}

fn invalid(from: InterviewPhase, to: InterviewPhase) -> AppError {
    AppError::InvalidTransition {
        from: from.as_str().to_string(),
        to: to.as_str().to_string(),
    }
}

/// Deterministic summary from the last 3 participant messages, each
/// truncated to 100 characters, with sentiment "mixed".
pub fn fallback_summary(transcript: &[TranscriptMessage]) -> StructuredSummary {
    let key_points: Vec<String> = transcript
        .iter()
        .filter(|m| m.role == "participant" || m.role == "user")
        .rev()
        .take(FALLBACK_MESSAGE_COUNT)
        .map(|m| {
            let mut text: String = m.content.chars().take(FALLBACK_TRUNCATE_CHARS).collect();
            if m.content.chars().count() > FALLBACK_TRUNCATE_CHARS {
                text.push('…');
            }
            text
        })
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();

    StructuredSummary {
        overview: "Summary of what you shared in this conversation.".to_string(),
        key_points,
        sentiment: "mixed".to_string(),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Persisted transitions
// ────────────────────────────────────────────────────────────────────────────

/// Early finish: summarize the transcript and move to reviewing. The
/// summarizer call is the only fallible part and it is absorbed — this
/// function never fails on a degraded external service, only on invalid
/// state or storage errors.
pub async fn request_early_finish(
    pool: &PgPool,
    llm: &LlmClient,
    session_id: Uuid,
    transcript: &[TranscriptMessage],
) -> Result<StructuredSummary, AppError> {
    let row = lifecycle::get_session(pool, session_id).await?;
    let mut state = CompletionState::from_row(&row)?;
    if state.current_state() != InterviewPhase::Active {
        return Err(invalid(state.current_state(), InterviewPhase::Reviewing));
    }

    let summary = summarize_or_fallback(llm, transcript).await;
    state.enter_review(summary.clone())?;
    persist_state(pool, session_id, &state).await?;

    Ok(summary)
}

pub async fn summarize_or_fallback(
    llm: &LlmClient,
    transcript: &[TranscriptMessage],
) -> StructuredSummary {
    let rendered: String = transcript
        .iter()
        .map(|m| format!("{}: {}\n", m.role, m.content))
        .collect();
    let prompt = SUMMARY_PROMPT.replace("{transcript}", &rendered);

    match llm.call_json::<StructuredSummary>(&prompt, SUMMARY_SYSTEM).await {
        Ok(summary) if !summary.overview.trim().is_empty() => summary,
        Ok(_) => {
            warn!("Summarizer returned an empty overview, using fallback");
            fallback_summary(transcript)
        }
        Err(e) => {
            warn!("Summarizer degraded, using fallback: {e}");
            fallback_summary(transcript)
        }
    }
}

/// reviewing → active: clears the stored summary so the participant can
/// keep talking.
pub async fn add_more(pool: &PgPool, session_id: Uuid) -> Result<(), AppError> {
    let row = lifecycle::get_session(pool, session_id).await?;
    let mut state = CompletionState::from_row(&row)?;
    state.add_more()?;
    persist_state(pool, session_id, &state).await
}

/// Marks the interview complete and ends the underlying session. The state
/// machine always reaches its terminal state for the caller: a failure in
/// the session update is logged, not surfaced.
pub async fn complete(
    pool: &PgPool,
    session_id: Uuid,
    final_mood: Option<i32>,
) -> Result<(), AppError> {
    let row = lifecycle::get_session(pool, session_id).await?;
    let mut state = CompletionState::from_row(&row)?;
    state.complete()?;
    persist_state(pool, session_id, &state).await?;

    if let Err(e) = lifecycle::end_session(pool, session_id, final_mood).await {
        error!("Session {session_id} reached complete but ending it failed: {e}");
    }

    Ok(())
}

async fn persist_state(
    pool: &PgPool,
    session_id: Uuid,
    state: &CompletionState,
) -> Result<(), AppError> {
    let summary_json = state
        .summary()
        .map(serde_json::to_value)
        .transpose()
        .map_err(|e| AppError::Internal(e.into()))?;

    sqlx::query(
        r#"
        UPDATE conversation_sessions
        SET phase = $2, closing_summary = $3, add_more_used = $4
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .bind(state.current_state().as_str())
    .bind(summary_json)
    .bind(state.add_more_used())
    .execute(pool)
    .await?;
    Ok(())
}

/// Coverage = discussed themes / total survey themes, derived from stored
/// responses rather than tracked as state.
pub async fn theme_coverage(
    pool: &PgPool,
    survey_id: Uuid,
    session_id: Uuid,
) -> Result<ThemeCoverage, AppError> {
    let discussed: i64 = sqlx::query_scalar(
        "SELECT COUNT(DISTINCT theme_id) FROM responses WHERE session_id = $1 AND theme_id IS NOT NULL",
    )
    .bind(session_id)
    .fetch_one(pool)
    .await?;

    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM themes WHERE survey_id = $1")
        .bind(survey_id)
        .fetch_one(pool)
        .await?;

    let coverage = if total > 0 {
        discussed as f64 / total as f64
    } else {
        0.0
    };

    Ok(ThemeCoverage {
        discussed_themes: discussed,
        total_themes: total,
        coverage,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> StructuredSummary {
        StructuredSummary {
            overview: "overview".to_string(),
            key_points: vec!["point".to_string()],
            sentiment: "positive".to_string(),
        }
    }

    fn active_state() -> CompletionState {
        CompletionState::new(InterviewPhase::Active, None, false)
    }

    fn message(role: &str, content: &str) -> TranscriptMessage {
        TranscriptMessage {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    #[test]
    fn test_active_to_reviewing_attaches_summary() {
        let mut state = active_state();
        state.enter_review(summary()).unwrap();
        assert_eq!(state.current_state(), InterviewPhase::Reviewing);
        assert!(state.summary().is_some());
        assert!(!state.add_more_used());
    }

    #[test]
    fn test_enter_review_from_reviewing_is_invalid() {
        let mut state = active_state();
        state.enter_review(summary()).unwrap();
        let err = state.enter_review(summary()).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        // Failed transition must not mutate state.
        assert_eq!(state.current_state(), InterviewPhase::Reviewing);
    }

    #[test]
    fn test_add_more_clears_summary_and_returns_to_active() {
        let mut state = active_state();
        state.enter_review(summary()).unwrap();
        state.add_more().unwrap();
        assert_eq!(state.current_state(), InterviewPhase::Active);
        assert!(state.summary().is_none());
        assert!(state.add_more_used());
    }

    #[test]
    fn test_add_more_only_from_reviewing() {
        let mut state = active_state();
        let err = state.add_more().unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(state.current_state(), InterviewPhase::Active);
    }

    #[test]
    fn test_add_more_rearmed_by_reentering_review() {
        let mut state = active_state();
        state.enter_review(summary()).unwrap();
        state.add_more().unwrap();
        // Second review entry re-arms the side transition.
        state.enter_review(summary()).unwrap();
        assert!(!state.add_more_used());
        state.add_more().unwrap();
        assert_eq!(state.current_state(), InterviewPhase::Active);
    }

    #[test]
    fn test_complete_from_active_without_reviewing() {
        let mut state = active_state();
        state.complete().unwrap();
        assert_eq!(state.current_state(), InterviewPhase::Complete);
    }

    #[test]
    fn test_complete_from_reviewing() {
        let mut state = active_state();
        state.enter_review(summary()).unwrap();
        state.complete().unwrap();
        assert_eq!(state.current_state(), InterviewPhase::Complete);
    }

    #[test]
    fn test_complete_is_terminal() {
        let mut state = active_state();
        state.complete().unwrap();
        assert!(state.complete().is_err());
        assert!(state.add_more().is_err());
        assert!(state.enter_review(summary()).is_err());
        assert_eq!(state.current_state(), InterviewPhase::Complete);
    }

    #[test]
    fn test_fallback_summary_takes_last_three_participant_messages() {
        let transcript = vec![
            message("participant", "first"),
            message("assistant", "a reply"),
            message("participant", "second"),
            message("participant", "third"),
            message("participant", "fourth"),
        ];
        let summary = fallback_summary(&transcript);
        assert_eq!(summary.sentiment, "mixed");
        assert_eq!(summary.key_points, vec!["second", "third", "fourth"]);
    }

    #[test]
    fn test_fallback_summary_truncates_to_100_chars() {
        let long = "x".repeat(250);
        let transcript = vec![message("participant", &long)];
        let summary = fallback_summary(&transcript);
        assert_eq!(summary.key_points.len(), 1);
        // 100 chars plus the ellipsis marker
        assert_eq!(summary.key_points[0].chars().count(), 101);
    }

    #[test]
    fn test_fallback_summary_empty_transcript() {
        let summary = fallback_summary(&[]);
        assert_eq!(summary.sentiment, "mixed");
        assert!(summary.key_points.is_empty());
        assert!(!summary.overview.is_empty());
    }
}
