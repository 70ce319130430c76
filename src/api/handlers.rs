use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::RequestId,
    models::{
        HiddenGemsResponse, IndexStats, IngestMediaRequest, MediaRecord, QualityBoostRequest,
        RecommendRequest, RecommendResponse, SeenEntry, SeenListResponse, SeenRequest,
        SimilarResponse, UserQuery, VibeQuery,
    },
    services::{seen, SearchRequest},
};

use super::AppState;

/// Largest list size a caller may ask for
const MAX_LIMIT: usize = 100;

/// Quick-search limits used by `GET /vibe`
const QUICK_TOP_K: usize = 15;
const QUICK_FINAL_RESULTS: usize = 5;

/// Non-positive or missing values become 0, which the services read as "default"
fn limit_param(value: Option<i64>) -> usize {
    value
        .filter(|v| *v > 0)
        .map(|v| (v as usize).min(MAX_LIMIT))
        .unwrap_or(0)
}

fn require_query(query: &str) -> AppResult<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(AppError::InvalidInput("query is required".to_string()));
    }
    Ok(query.to_string())
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let index_size = state.search.index().size().await;
    (
        StatusCode::OK,
        Json(json!({ "status": "healthy", "vector_index_size": index_size })),
    )
}

/// Full vibe search
pub async fn recommend(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<RecommendRequest>,
) -> AppResult<Json<RecommendResponse>> {
    let query = require_query(&request.query)?;
    tracing::info!(request_id = %request_id, user_id = %request.user_id, "Recommend request");

    let search_request = SearchRequest::new(request.user_id, query)
        .with_limits(limit_param(request.top_k), limit_param(request.limit))
        .with_judge(request.use_judge.unwrap_or(true));

    let result = state.search.search(search_request).await?;
    Ok(Json(result.into()))
}

/// Quick search from a query string
pub async fn quick_vibe(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Query<VibeQuery>,
) -> AppResult<Json<RecommendResponse>> {
    let query = require_query(params.q.as_deref().unwrap_or_default())?;
    tracing::info!(request_id = %request_id, user_id = %params.user_id, "Quick vibe request");

    let search_request = SearchRequest::new(params.user_id, query)
        .with_limits(QUICK_TOP_K, QUICK_FINAL_RESULTS);

    let result = state.search.search(search_request).await?;
    Ok(Json(result.into()))
}

pub async fn similar(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(media_id): Path<String>,
    Query(params): Query<UserQuery>,
) -> AppResult<Json<SimilarResponse>> {
    tracing::info!(request_id = %request_id, media_id = %media_id, "Similar request");

    let recommendations = state
        .search
        .find_similar(&params.user_id, &media_id, limit_param(params.limit))
        .await?;

    Ok(Json(SimilarResponse {
        source_id: media_id,
        recommendations,
    }))
}

pub async fn hidden_gems(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> AppResult<Json<HiddenGemsResponse>> {
    let hidden_gems = state
        .search
        .hidden_gems(&params.user_id, limit_param(params.limit))
        .await?;
    Ok(Json(HiddenGemsResponse { hidden_gems }))
}

pub async fn mark_seen(
    State(state): State<AppState>,
    Json(request): Json<SeenRequest>,
) -> AppResult<(StatusCode, Json<SeenEntry>)> {
    let entry = seen::mark_seen(
        state.store.as_ref(),
        &request.user_id,
        &request.media_id,
        request.rating,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn seen_list(
    State(state): State<AppState>,
    Query(params): Query<UserQuery>,
) -> AppResult<Json<SeenListResponse>> {
    let seen = seen::seen_list(state.store.as_ref(), &params.user_id).await?;
    Ok(Json(SeenListResponse {
        user_id: params.user_id,
        count: seen.len(),
        seen,
    }))
}

pub async fn unmark_seen(
    State(state): State<AppState>,
    Json(request): Json<SeenRequest>,
) -> AppResult<StatusCode> {
    seen::unmark_seen(state.store.as_ref(), &request.user_id, &request.media_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn ingest_media(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Json(request): Json<IngestMediaRequest>,
) -> AppResult<(StatusCode, Json<MediaRecord>)> {
    tracing::info!(request_id = %request_id, title = %request.title, "Ingest request");
    let record = state.ingestor.ingest(request).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn get_media(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
) -> AppResult<Json<MediaRecord>> {
    state
        .store
        .fetch_record(&media_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Media {}", media_id)))
}

pub async fn refresh_media(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(media_id): Path<String>,
) -> AppResult<Json<MediaRecord>> {
    tracing::info!(request_id = %request_id, media_id = %media_id, "Refresh request");
    let record = state.ingestor.refresh(&media_id).await?;
    Ok(Json(record))
}

pub async fn stats(State(state): State<AppState>) -> AppResult<Json<IndexStats>> {
    Ok(Json(state.search.stats().await?))
}

/// Queues a quality boost; applied asynchronously by the quality writer
pub async fn quality_boost(
    State(state): State<AppState>,
    Json(request): Json<QualityBoostRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    if request.media_id.trim().is_empty() {
        return Err(AppError::InvalidInput("media_id is required".to_string()));
    }
    if !request.amount.is_finite() {
        return Err(AppError::InvalidInput("amount must be a number".to_string()));
    }

    state.quality.report(request.media_id, request.amount);
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "queued" }))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_param() {
        assert_eq!(limit_param(None), 0);
        assert_eq!(limit_param(Some(-3)), 0);
        assert_eq!(limit_param(Some(0)), 0);
        assert_eq!(limit_param(Some(7)), 7);
        assert_eq!(limit_param(Some(10_000)), MAX_LIMIT);
    }

    #[test]
    fn test_require_query_trims() {
        assert_eq!(require_query("  neon rain ").unwrap(), "neon rain");
        assert!(matches!(require_query("   "), Err(AppError::InvalidInput(_))));
    }
}
