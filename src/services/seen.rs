use chrono::Utc;

use crate::{
    db::MediaStore,
    error::{AppError, AppResult},
    models::{MediaRecord, SeenEntry},
};

pub const MIN_RATING: f64 = 1.0;
pub const MAX_RATING: f64 = 10.0;

fn validate_rating(rating: Option<f64>) -> AppResult<Option<f64>> {
    match rating {
        Some(r) if !(MIN_RATING..=MAX_RATING).contains(&r) => Err(AppError::InvalidInput(format!(
            "Rating must be between {} and {}",
            MIN_RATING, MAX_RATING
        ))),
        other => Ok(other),
    }
}

fn require(value: &str, field: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::InvalidInput(format!("{} is required", field)));
    }
    Ok(())
}

/// Records that `user_id` watched `media_id`. Watching again replaces the rating.
pub async fn mark_seen(
    store: &dyn MediaStore,
    user_id: &str,
    media_id: &str,
    rating: Option<f64>,
) -> AppResult<SeenEntry> {
    require(user_id, "user_id")?;
    require(media_id, "media_id")?;
    let rating = validate_rating(rating)?;

    if store.fetch_record(media_id).await?.is_none() {
        return Err(AppError::NotFound(format!("Media {}", media_id)));
    }

    let entry = SeenEntry {
        user_id: user_id.to_string(),
        media_id: media_id.to_string(),
        rating,
        watched_at: Utc::now(),
    };
    store.mark_seen(&entry).await?;

    tracing::info!(user_id = %user_id, media_id = %media_id, "Marked as seen");
    Ok(entry)
}

pub async fn seen_list(store: &dyn MediaStore, user_id: &str) -> AppResult<Vec<MediaRecord>> {
    store.seen_media(user_id).await
}

/// Removes a watch-history entry; `NotFound` when there was none
pub async fn unmark_seen(store: &dyn MediaStore, user_id: &str, media_id: &str) -> AppResult<()> {
    require(user_id, "user_id")?;
    require(media_id, "media_id")?;

    if !store.unmark_seen(user_id, media_id).await? {
        return Err(AppError::NotFound(format!(
            "{} has not seen {}",
            user_id, media_id
        )));
    }

    tracing::info!(user_id = %user_id, media_id = %media_id, "Removed from seen");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::InMemoryStore,
        models::MediaType,
    };

    async fn store_with(title: &str) -> (InMemoryStore, String) {
        let store = InMemoryStore::new();
        let record = MediaRecord::new(title.to_string(), MediaType::Tv, "x".to_string());
        store.insert_record(&record).await.unwrap();
        (store, record.id)
    }

    #[tokio::test]
    async fn test_mark_seen_validates_rating() {
        let (store, id) = store_with("Severance").await;

        for bad in [0.0, 10.5, -1.0, f64::NAN] {
            let result = mark_seen(&store, "u1", &id, Some(bad)).await;
            assert!(matches!(result, Err(AppError::InvalidInput(_))), "rating {}", bad);
        }

        for good in [1.0, 7.5, 10.0] {
            assert!(mark_seen(&store, "u1", &id, Some(good)).await.is_ok());
        }
        assert!(mark_seen(&store, "u1", &id, None).await.is_ok());
    }

    #[tokio::test]
    async fn test_mark_seen_unknown_media() {
        let store = InMemoryStore::new();
        let result = mark_seen(&store, "u1", "tv-Nothing", None).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_mark_then_list_then_unmark() {
        let (store, id) = store_with("Severance").await;

        mark_seen(&store, "fresh-user", &id, Some(9.0)).await.unwrap();
        let seen = seen_list(&store, "fresh-user").await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, id);

        unmark_seen(&store, "fresh-user", &id).await.unwrap();
        assert!(seen_list(&store, "fresh-user").await.unwrap().is_empty());
        assert!(matches!(
            unmark_seen(&store, "fresh-user", &id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_blank_ids_rejected() {
        let (store, id) = store_with("Severance").await;
        assert!(matches!(
            mark_seen(&store, " ", &id, None).await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            unmark_seen(&store, "u1", "").await,
            Err(AppError::InvalidInput(_))
        ));
    }
}
