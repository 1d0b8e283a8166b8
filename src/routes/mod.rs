// src/routes/mod.rs

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::error::AppError;
use crate::AppState;

pub mod dashboard;
pub mod health;
pub mod operations;
pub mod schema;

use dashboard::{infrastructure, options, telephony, workflow};

fn dashboard_routes() -> Router<AppState> {
    Router::new()
        // telephony
        .route("/total-calls", get(telephony::total_calls))
        .route("/connection-rate", get(telephony::connection_rate))
        .route("/drop-rate", get(telephony::drop_rate))
        .route("/peak-hours", get(telephony::peak_hours))
        .route("/active-calls", get(telephony::active_calls))
        .route("/call-duration", get(telephony::call_duration))
        .route("/top-dropped", get(telephony::top_dropped))
        // workflow
        .route("/initiation-source", get(workflow::initiation_source))
        .route("/claim-completion", get(workflow::claim_completion))
        .route("/reattempt-funnel", get(workflow::reattempt_funnel))
        .route("/first-attempt-rate", get(workflow::first_attempt_rate))
        .route("/incomplete-steps", get(workflow::incomplete_steps))
        // infrastructure
        .route("/transcription-queue", get(infrastructure::transcription_queue))
        .route("/transcription-time", get(infrastructure::transcription_time))
        .route("/transcription-api-usage", get(infrastructure::transcription_api_usage))
        .route("/concurrent-peaks", get(infrastructure::concurrent_peaks))
        .route("/error-rate", get(infrastructure::error_rate))
        // dropdowns
        .route("/filter-options", get(options::filter_options))
}

fn operations_routes() -> Router<AppState> {
    Router::new()
        .route("/logs", get(operations::logs))
        .route("/detail/:id", get(operations::detail))
}

async fn not_found() -> AppError {
    AppError::NotFound("not found".into())
}

/// The whole API. The schema explorer is only mounted when enabled.
pub fn router(state: AppState) -> Router {
    // Very permissive CORS; the portal front end is served from another origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut api = Router::new()
        .route("/api/health", get(health::health))
        .nest("/api/dashboard", dashboard_routes())
        .nest("/api/operations", operations_routes());
    if state.config.expose_schema {
        api = api.nest("/api/schema", schema::router());
    }

    api.fallback(not_found)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
