/// Prompts for the external classification path. Prompt wording is an
/// implementation detail of the external service contract — the engine only
/// depends on the response shape checked in `classifier.rs`.
pub const CLASSIFY_SYSTEM: &str = "You analyze a single piece of workplace \
feedback. Return strict JSON with the fields: sentiment (one of positive, \
negative, neutral), sentiment_score (number in [-1, 1]), theme (one of the \
provided theme names, or null), urgency_score (integer 0-5, where 3+ needs \
prompt human attention), key_insight (short string or null). Respond with \
JSON only — no prose, no markdown fences.";

pub const CLASSIFY_PROMPT: &str = "Survey themes: {themes}\n\nFeedback:\n{text}";
