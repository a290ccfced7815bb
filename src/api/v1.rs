use axum::{
    routing::{get, post},
    Router,
};

use crate::{
    api::{events, health, merges},
    controller::AppState,
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/health", get(health::health_check))
        .route("/events", post(events::ingest_event))
        .route("/lifecycle/stream", get(events::lifecycle_stream))
        .route("/processes/:process_id/merges", get(merges::list_merges))
        .route("/processes/:process_id/merges/:scenario_time", get(merges::get_merge))
        .route(
            "/processes/:process_id/merges/:scenario_time/replace",
            post(merges::replace_missing),
        )
        .route(
            "/processes/:process_id/merges/:scenario_time/export",
            get(merges::export_merge),
        )
        .with_state(state)
}
