use std::collections::{HashMap, HashSet};

use crate::{
    error::AppResult,
    models::{MediaRecord, MediaType, SeenEntry, StoreCounts},
};

/// Durable home of media records, watch history and embeddings
///
/// The search pipeline reads through this trait only; the two backends are
/// Postgres ([`PgMediaStore`](crate::db::PgMediaStore)) and an in-process map
/// ([`InMemoryStore`](crate::db::InMemoryStore)).
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait MediaStore: Send + Sync {
    /// Record by id; `None` when it no longer exists
    async fn fetch_record(&self, id: &str) -> AppResult<Option<MediaRecord>>;

    /// Case-insensitive exact title match within one media type
    async fn find_by_title(
        &self,
        title: &str,
        media_type: MediaType,
    ) -> AppResult<Option<MediaRecord>>;

    async fn list_records(&self) -> AppResult<Vec<MediaRecord>>;

    async fn insert_record(&self, record: &MediaRecord) -> AppResult<()>;

    async fn update_vibe_profile(&self, id: &str, vibe_profile: &str) -> AppResult<()>;

    /// Adds `amount` to the record's running quality score
    async fn apply_quality_boost(&self, id: &str, amount: f64) -> AppResult<()>;

    /// Ids the user has already watched; an unknown user has none
    async fn seen_media_ids(&self, user_id: &str) -> AppResult<HashSet<String>>;

    /// Watched records, most recent first
    async fn seen_media(&self, user_id: &str) -> AppResult<Vec<MediaRecord>>;

    /// Inserts or replaces a watch-history entry, creating the user if needed
    async fn mark_seen(&self, entry: &SeenEntry) -> AppResult<()>;

    /// Returns whether an entry was removed
    async fn unmark_seen(&self, user_id: &str, media_id: &str) -> AppResult<bool>;

    async fn store_embedding(&self, media_id: &str, vector: &[f32], model: &str) -> AppResult<()>;

    async fn fetch_embedding(&self, media_id: &str) -> AppResult<Option<Vec<f32>>>;

    /// All embeddings produced by `model`, keyed by media id
    async fn load_embeddings(&self, model: &str) -> AppResult<HashMap<String, Vec<f32>>>;

    async fn counts(&self) -> AppResult<StoreCounts>;
}
