// Signal pipeline: per-response classification and per-theme aggregation.
// All LLM calls go through llm_client — no direct Anthropic calls here.

pub mod aggregator;
pub mod classifier;
pub mod handlers;
pub mod prompts;
