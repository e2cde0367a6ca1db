mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod retention;
mod routes;
mod session;
mod signals;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::create_pool;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::signals::classifier::{KeywordClassifier, LlmClassifier, ResponseClassifier};
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (panics on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_directive(&config.rust_log))),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Pulse API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (runs migrations)
    let db = create_pool(&config.database_url).await?;

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Classifier backend: keyword by default, LLM (with keyword fallback)
    // when ENABLE_LLM_CLASSIFIER is set.
    let classifier: Arc<dyn ResponseClassifier> = if config.enable_llm_classifier {
        Arc::new(LlmClassifier::new(llm.clone()))
    } else {
        Arc::new(KeywordClassifier)
    };
    info!(
        "Classifier backend: {}",
        if config.enable_llm_classifier {
            "llm"
        } else {
            "keyword"
        }
    );

    // Build app state
    let state = AppState {
        db,
        llm,
        config: config.clone(),
        classifier,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Default tracing directive when RUST_LOG is unset. The package name is
/// hyphenated but tracing targets use the crate name (`pulse_api::…`), so
/// the directive must be underscored or it matches nothing and every log
/// line is dropped.
fn default_log_directive(level: &str) -> String {
    format!("{}={}", env!("CARGO_PKG_NAME").replace('-', "_"), level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_directive_uses_underscored_crate_name() {
        let directive = default_log_directive("info");
        assert_eq!(directive, "pulse_api=info");
        assert!(!directive.contains('-'));
    }

    #[test]
    fn test_default_log_directive_carries_configured_level() {
        assert_eq!(default_log_directive("debug"), "pulse_api=debug");
    }
}
