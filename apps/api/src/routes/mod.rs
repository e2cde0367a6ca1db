pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::retention::handlers as retention_handlers;
use crate::session::handlers as session_handlers;
use crate::signals::handlers as signal_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Session API
        .route(
            "/api/v1/sessions",
            post(session_handlers::handle_start_session),
        )
        .route(
            "/api/v1/sessions/:id",
            get(session_handlers::handle_get_session),
        )
        .route(
            "/api/v1/sessions/:id/end",
            post(session_handlers::handle_end_session),
        )
        .route(
            "/api/v1/sessions/:id/finish-early",
            post(session_handlers::handle_early_finish),
        )
        .route(
            "/api/v1/sessions/:id/add-more",
            post(session_handlers::handle_add_more),
        )
        .route(
            "/api/v1/sessions/:id/complete",
            post(session_handlers::handle_complete),
        )
        // Signals API
        .route(
            "/api/v1/responses",
            post(signal_handlers::handle_submit_response),
        )
        .route(
            "/api/v1/surveys/:id/responses",
            get(signal_handlers::handle_list_responses),
        )
        .route(
            "/api/v1/surveys/:id/aggregate",
            post(signal_handlers::handle_aggregate),
        )
        .route(
            "/api/v1/surveys/:id/health",
            get(signal_handlers::handle_survey_health),
        )
        // Retention API (hit by the external scheduler and by operators)
        .route(
            "/api/v1/retention/run",
            post(retention_handlers::handle_run_retention),
        )
        .route(
            "/api/v1/retention/logs",
            get(retention_handlers::handle_list_retention_logs),
        )
        .with_state(state)
}
