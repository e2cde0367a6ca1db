use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::signals::classifier::ResponseClassifier;

/// Shared application state injected into all route handlers via Axum
/// extractors. No session or token state lives here — all of that is
/// persisted and re-read per request.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub llm: LlmClient,
    pub config: Config,
    /// Pluggable classifier. Default: KeywordClassifier. Swap via
    /// ENABLE_LLM_CLASSIFIER env.
    pub classifier: Arc<dyn ResponseClassifier>,
}
