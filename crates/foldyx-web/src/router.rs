//! Axum router: maps all URL paths to handlers.

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    services::ServeDir,
    cors::CorsLayer,
    trace::TraceLayer,
    compression::CompressionLayer,
};
use std::sync::Arc;
use crate::state::{AppState, SharedState};
use crate::handlers::{
    editor::{new_session, editor_page, add_chain, delete_chains, clear_chains, load_preset, job_preview},
    run::{start_run, run_page, api_run, cancel_run},
    files::download_file,
    system::api_system,
};
use crate::sse::run_events;

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let shared: SharedState = Arc::new(state);

    Router::new()
        // Editor
        .route("/",                             get(new_session))
        .route("/session/{id}",                 get(editor_page))
        .route("/session/{id}/chains",          post(add_chain))
        .route("/session/{id}/chains/delete",   post(delete_chains))
        .route("/session/{id}/chains/clear",    post(clear_chains))
        .route("/session/{id}/preset",          post(load_preset))
        .route("/session/{id}/job.yaml",        get(job_preview))
        .route("/session/{id}/run",             post(start_run))

        // Runs
        .route("/runs/{run_id}",                get(run_page))
        .route("/api/runs/{run_id}",            get(api_run))
        .route("/api/runs/{run_id}/events",     get(run_events))
        .route("/api/runs/{run_id}/cancel",     post(cancel_run))
        .route("/api/runs/{run_id}/files/{kind}", get(download_file))

        // System
        .route("/api/system",                   get(api_system))

        // Static files
        .nest_service("/static", ServeDir::new(static_dir))

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}
