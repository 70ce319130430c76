use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    db::MediaStore,
    error::{AppError, AppResult},
    models::{MediaRecord, MediaType, SeenEntry, StoreCounts},
};

struct StoredEmbedding {
    vector: Vec<f32>,
    model: String,
}

#[derive(Default)]
struct StoreInner {
    media: HashMap<String, MediaRecord>,
    /// user id -> media id -> entry
    seen: HashMap<String, HashMap<String, SeenEntry>>,
    embeddings: HashMap<String, StoredEmbedding>,
}

/// Process-local store used when no database is configured, and in tests
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl MediaStore for InMemoryStore {
    async fn fetch_record(&self, id: &str) -> AppResult<Option<MediaRecord>> {
        Ok(self.inner.read().await.media.get(id).cloned())
    }

    async fn find_by_title(
        &self,
        title: &str,
        media_type: MediaType,
    ) -> AppResult<Option<MediaRecord>> {
        let needle = title.trim().to_lowercase();
        let inner = self.inner.read().await;
        Ok(inner
            .media
            .values()
            .find(|m| m.media_type == media_type && m.title.to_lowercase() == needle)
            .cloned())
    }

    async fn list_records(&self) -> AppResult<Vec<MediaRecord>> {
        let inner = self.inner.read().await;
        let mut records: Vec<MediaRecord> = inner.media.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn insert_record(&self, record: &MediaRecord) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if inner.media.contains_key(&record.id) {
            return Err(AppError::InvalidInput(format!(
                "Media {} already exists",
                record.id
            )));
        }
        inner.media.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn update_vibe_profile(&self, id: &str, vibe_profile: &str) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .media
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Media {}", id)))?;
        record.vibe_profile = vibe_profile.to_string();
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn apply_quality_boost(&self, id: &str, amount: f64) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .media
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("Media {}", id)))?;
        record.quality_score += amount;
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn seen_media_ids(&self, user_id: &str) -> AppResult<HashSet<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .seen
            .get(user_id)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn seen_media(&self, user_id: &str) -> AppResult<Vec<MediaRecord>> {
        let inner = self.inner.read().await;
        let Some(entries) = inner.seen.get(user_id) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<&SeenEntry> = entries.values().collect();
        entries.sort_by(|a, b| b.watched_at.cmp(&a.watched_at));

        Ok(entries
            .into_iter()
            .filter_map(|entry| inner.media.get(&entry.media_id).cloned())
            .collect())
    }

    async fn mark_seen(&self, entry: &SeenEntry) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        inner
            .seen
            .entry(entry.user_id.clone())
            .or_default()
            .insert(entry.media_id.clone(), entry.clone());
        Ok(())
    }

    async fn unmark_seen(&self, user_id: &str, media_id: &str) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        Ok(inner
            .seen
            .get_mut(user_id)
            .map(|entries| entries.remove(media_id).is_some())
            .unwrap_or(false))
    }

    async fn store_embedding(&self, media_id: &str, vector: &[f32], model: &str) -> AppResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.media.contains_key(media_id) {
            return Err(AppError::NotFound(format!("Media {}", media_id)));
        }
        inner.embeddings.insert(
            media_id.to_string(),
            StoredEmbedding {
                vector: vector.to_vec(),
                model: model.to_string(),
            },
        );
        Ok(())
    }

    async fn fetch_embedding(&self, media_id: &str) -> AppResult<Option<Vec<f32>>> {
        let inner = self.inner.read().await;
        Ok(inner.embeddings.get(media_id).map(|e| e.vector.clone()))
    }

    async fn load_embeddings(&self, model: &str) -> AppResult<HashMap<String, Vec<f32>>> {
        let inner = self.inner.read().await;
        Ok(inner
            .embeddings
            .iter()
            .filter(|(_, e)| e.model == model)
            .map(|(id, e)| (id.clone(), e.vector.clone()))
            .collect())
    }

    async fn counts(&self) -> AppResult<StoreCounts> {
        let inner = self.inner.read().await;
        Ok(StoreCounts {
            media_count: inner.media.len(),
            embedding_count: inner.embeddings.len(),
        })
    }
}
