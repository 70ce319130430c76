use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

mod media;
mod recommendation;

pub use media::{media_id, MediaRecord, MediaType};
pub use recommendation::{Recommendation, RerankVerdict, SearchResult};

// ============================================================================
// Request Types
// ============================================================================

fn default_user_id() -> String {
    "default".to_string()
}

/// Body of `POST /recommend`
#[derive(Debug, Clone, Deserialize)]
pub struct RecommendRequest {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    /// Natural-language vibe description
    pub query: String,
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub top_k: Option<i64>,
    #[serde(default)]
    pub use_judge: Option<bool>,
}

/// Query string of `GET /vibe`
#[derive(Debug, Clone, Deserialize)]
pub struct VibeQuery {
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default = "default_user_id")]
    pub user_id: String,
}

/// Query string shared by user-scoped GET endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct UserQuery {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Body of `POST /seen` and `DELETE /seen`
#[derive(Debug, Clone, Deserialize)]
pub struct SeenRequest {
    pub user_id: String,
    pub media_id: String,
    /// Optional 1-10 rating
    #[serde(default)]
    pub rating: Option<f64>,
}

/// Body of `POST /media`
#[derive(Debug, Clone, Deserialize)]
pub struct IngestMediaRequest {
    pub title: String,
    pub media_type: MediaType,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub synopsis: Option<String>,
    /// Pre-written profile used verbatim instead of generating one
    #[serde(default)]
    pub vibe_profile: Option<String>,
}

/// Body of `POST /admin/quality-boost`
#[derive(Debug, Clone, Deserialize)]
pub struct QualityBoostRequest {
    pub media_id: String,
    pub amount: f64,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub query: String,
    pub total_candidates: usize,
    pub filtered_seen: usize,
    pub judged: bool,
    pub recommendations: Vec<Recommendation>,
}

impl From<SearchResult> for RecommendResponse {
    fn from(result: SearchResult) -> Self {
        Self {
            query: result.query,
            total_candidates: result.total_candidates,
            filtered_seen: result.filtered_count,
            judged: result.judged,
            recommendations: result.recommendations,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub source_id: String,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Serialize)]
pub struct HiddenGemsResponse {
    pub hidden_gems: Vec<MediaRecord>,
}

#[derive(Debug, Serialize)]
pub struct SeenListResponse {
    pub user_id: String,
    pub count: usize,
    pub seen: Vec<MediaRecord>,
}

/// A user's watch-history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeenEntry {
    pub user_id: String,
    pub media_id: String,
    pub rating: Option<f64>,
    pub watched_at: DateTime<Utc>,
}

/// Row counts reported by the backing store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub media_count: usize,
    pub embedding_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub media_count: usize,
    pub embedding_count: usize,
    pub vector_index_size: usize,
    pub embedding_model: String,
}
