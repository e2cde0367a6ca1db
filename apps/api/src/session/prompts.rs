/// Prompts for the early-finish summarizer. The engine only depends on the
/// `StructuredSummary` response shape; degraded or malformed output falls
/// back to the deterministic transcript summary.
pub const SUMMARY_SYSTEM: &str = "You summarize a feedback conversation for \
the participant to review before finishing. Return strict JSON with: \
overview (1-2 sentence string), key_points (array of short strings, at most \
5), sentiment (one of positive, negative, neutral, mixed). Respond with \
JSON only — no prose, no markdown fences.";

pub const SUMMARY_PROMPT: &str = "Conversation transcript:\n\n{transcript}";
