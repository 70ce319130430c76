use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware};

/// Creates the main router: `/health` plus the API under `/api`
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id)),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Search
        .route("/recommend", post(handlers::recommend))
        .route("/vibe", get(handlers::quick_vibe))
        .route("/similar/:media_id", get(handlers::similar))
        .route("/hidden-gems", get(handlers::hidden_gems))
        // Watch history
        .route(
            "/seen",
            get(handlers::seen_list)
                .post(handlers::mark_seen)
                .delete(handlers::unmark_seen),
        )
        // Catalog
        .route("/media", post(handlers::ingest_media))
        .route("/media/:id", get(handlers::get_media))
        .route("/media/:id/refresh", post(handlers::refresh_media))
        .route("/stats", get(handlers::stats))
        .route("/admin/quality-boost", post(handlers::quality_boost))
}
