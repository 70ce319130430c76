use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, FromRow, PgPool};

use crate::{
    db::MediaStore,
    error::{AppError, AppResult},
    models::{MediaRecord, MediaType, SeenEntry, StoreCounts},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Applies the embedded schema migrations
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

const MEDIA_COLUMNS: &str = "id, title, media_type, year, plot_summary, vibe_profile, \
     quality_score, popularity_score, external_id, created_at, updated_at";

#[derive(FromRow)]
struct MediaRow {
    id: String,
    title: String,
    media_type: String,
    year: Option<i32>,
    plot_summary: Option<String>,
    vibe_profile: String,
    quality_score: f64,
    popularity_score: f64,
    external_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<MediaRow> for MediaRecord {
    type Error = AppError;

    fn try_from(row: MediaRow) -> Result<Self, Self::Error> {
        let media_type: MediaType = row.media_type.parse().map_err(|_| {
            AppError::Internal(format!(
                "Media {} has unknown type '{}'",
                row.id, row.media_type
            ))
        })?;

        Ok(MediaRecord {
            id: row.id,
            title: row.title,
            media_type,
            year: row.year,
            plot_summary: row.plot_summary,
            vibe_profile: row.vibe_profile,
            quality_score: row.quality_score,
            popularity_score: row.popularity_score,
            external_id: row.external_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_records(rows: Vec<MediaRow>) -> AppResult<Vec<MediaRecord>> {
    rows.into_iter().map(MediaRecord::try_from).collect()
}

/// [`MediaStore`] backed by PostgreSQL
#[derive(Clone)]
pub struct PgMediaStore {
    pool: PgPool,
}

impl PgMediaStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MediaStore for PgMediaStore {
    async fn fetch_record(&self, id: &str) -> AppResult<Option<MediaRecord>> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {} FROM media WHERE id = $1",
            MEDIA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(MediaRecord::try_from).transpose()
    }

    async fn find_by_title(
        &self,
        title: &str,
        media_type: MediaType,
    ) -> AppResult<Option<MediaRecord>> {
        let row = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {} FROM media WHERE lower(title) = lower($1) AND media_type = $2 LIMIT 1",
            MEDIA_COLUMNS
        ))
        .bind(title.trim())
        .bind(media_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(MediaRecord::try_from).transpose()
    }

    async fn list_records(&self) -> AppResult<Vec<MediaRecord>> {
        let rows = sqlx::query_as::<_, MediaRow>(&format!(
            "SELECT {} FROM media ORDER BY id",
            MEDIA_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    async fn insert_record(&self, record: &MediaRecord) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO media (id, title, media_type, year, plot_summary, vibe_profile, \
             quality_score, popularity_score, external_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(&record.id)
        .bind(&record.title)
        .bind(record.media_type.as_str())
        .bind(record.year)
        .bind(&record.plot_summary)
        .bind(&record.vibe_profile)
        .bind(record.quality_score)
        .bind(record.popularity_score)
        .bind(&record.external_id)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_vibe_profile(&self, id: &str, vibe_profile: &str) -> AppResult<()> {
        let result =
            sqlx::query("UPDATE media SET vibe_profile = $1, updated_at = now() WHERE id = $2")
                .bind(vibe_profile)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Media {}", id)));
        }
        Ok(())
    }

    async fn apply_quality_boost(&self, id: &str, amount: f64) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE media SET quality_score = quality_score + $1, updated_at = now() WHERE id = $2",
        )
        .bind(amount)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Media {}", id)));
        }
        Ok(())
    }

    async fn seen_media_ids(&self, user_id: &str) -> AppResult<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT media_id FROM seen_media WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().collect())
    }

    async fn seen_media(&self, user_id: &str) -> AppResult<Vec<MediaRecord>> {
        let rows = sqlx::query_as::<_, MediaRow>(
            "SELECT m.id, m.title, m.media_type, m.year, m.plot_summary, m.vibe_profile, \
             m.quality_score, m.popularity_score, m.external_id, m.created_at, m.updated_at \
             FROM media m JOIN seen_media s ON s.media_id = m.id \
             WHERE s.user_id = $1 ORDER BY s.watched_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    async fn mark_seen(&self, entry: &SeenEntry) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (id, username) VALUES ($1, $1) ON CONFLICT (id) DO NOTHING")
            .bind(&entry.user_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO seen_media (user_id, media_id, rating, watched_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (user_id, media_id) \
             DO UPDATE SET rating = EXCLUDED.rating, watched_at = EXCLUDED.watched_at",
        )
        .bind(&entry.user_id)
        .bind(&entry.media_id)
        .bind(entry.rating)
        .bind(entry.watched_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn unmark_seen(&self, user_id: &str, media_id: &str) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM seen_media WHERE user_id = $1 AND media_id = $2")
            .bind(user_id)
            .bind(media_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn store_embedding(&self, media_id: &str, vector: &[f32], model: &str) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO vibe_embeddings (media_id, embedding, model) VALUES ($1, $2, $3) \
             ON CONFLICT (media_id) \
             DO UPDATE SET embedding = EXCLUDED.embedding, model = EXCLUDED.model, created_at = now()",
        )
        .bind(media_id)
        .bind(vector)
        .bind(model)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_embedding(&self, media_id: &str) -> AppResult<Option<Vec<f32>>> {
        let vector: Option<Vec<f32>> =
            sqlx::query_scalar("SELECT embedding FROM vibe_embeddings WHERE media_id = $1")
                .bind(media_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(vector)
    }

    async fn load_embeddings(&self, model: &str) -> AppResult<HashMap<String, Vec<f32>>> {
        let rows: Vec<(String, Vec<f32>)> =
            sqlx::query_as("SELECT media_id, embedding FROM vibe_embeddings WHERE model = $1")
                .bind(model)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    async fn counts(&self) -> AppResult<StoreCounts> {
        let (media_count, embedding_count): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM media), (SELECT COUNT(*) FROM vibe_embeddings)",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreCounts {
            media_count: media_count.max(0) as usize,
            embedding_count: embedding_count.max(0) as usize,
        })
    }
}
