use std::{sync::Arc, time::Duration};

use crate::{
    db::MediaStore,
    error::{AppError, AppResult},
    models::{IngestMediaRequest, MediaRecord, MediaType},
    services::{embeddings::Embedder, llm::ChatCompletion, vector_index::VectorIndex},
};

const PROFILE_TEMPERATURE: f32 = 0.7;

const PROFILE_SYSTEM_PROMPT: &str = "You describe how films, shows and anime FEEL to watch, \
never what happens in them. Write about visual style (neon-noir, pastel dreamscape, gritty \
realism), pacing (meditative slow burn, frenetic), emotional texture (existential dread, cozy \
melancholy, manic joy) and atmosphere (rain-soaked streets, clinical coldness). No plot \
summary. Two or three sentences.";

/// Writes vibe profiles with a chat model
#[derive(Clone)]
pub struct VibeProfiler {
    llm: Arc<dyn ChatCompletion>,
}

impl VibeProfiler {
    pub fn new(llm: Arc<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    pub async fn generate(
        &self,
        title: &str,
        media_type: MediaType,
        year: Option<i32>,
        synopsis: Option<&str>,
    ) -> AppResult<String> {
        let year = year.map(|y| format!(" ({})", y)).unwrap_or_default();
        let prompt = format!(
            "Describe the look, pacing and emotional vibe of {}{} [{}].\n{}\n\nStyle, not story.",
            title,
            year,
            media_type,
            synopsis.unwrap_or_default()
        );

        let profile = self
            .llm
            .complete(PROFILE_SYSTEM_PROMPT, &prompt, PROFILE_TEMPERATURE)
            .await?;
        let profile = profile.trim().to_string();
        if profile.is_empty() {
            return Err(AppError::ExternalApi(
                "Profile generator returned an empty profile".to_string(),
            ));
        }
        Ok(profile)
    }
}

/// Adds media to the catalog and keeps store embeddings and the vector index in step
#[derive(Clone)]
pub struct MediaIngestor {
    store: Arc<dyn MediaStore>,
    embedder: Arc<dyn Embedder>,
    index: Arc<VectorIndex>,
    profiler: Option<VibeProfiler>,
    embed_timeout: Duration,
}

impl MediaIngestor {
    pub fn new(
        store: Arc<dyn MediaStore>,
        embedder: Arc<dyn Embedder>,
        index: Arc<VectorIndex>,
        embed_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            index,
            profiler: None,
            embed_timeout,
        }
    }

    pub fn with_profiler(mut self, profiler: VibeProfiler) -> Self {
        self.profiler = Some(profiler);
        self
    }

    /// Creates a record, or returns the existing one with the same title and type.
    ///
    /// The profile is the caller's when given, otherwise generated, otherwise the
    /// synopsis. The record is only written once its embedding exists.
    pub async fn ingest(&self, request: IngestMediaRequest) -> AppResult<MediaRecord> {
        let title = request.title.trim();
        if title.is_empty() {
            return Err(AppError::InvalidInput("Title must not be empty".to_string()));
        }

        if let Some(existing) = self.store.find_by_title(title, request.media_type).await? {
            tracing::debug!(media_id = %existing.id, "Media already ingested");
            return Ok(existing);
        }

        let synopsis = request
            .synopsis
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let supplied = request
            .vibe_profile
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        let vibe_profile = match (supplied, &self.profiler, synopsis) {
            (Some(profile), _, _) => profile.to_string(),
            (None, Some(profiler), _) => {
                profiler
                    .generate(title, request.media_type, request.year, synopsis)
                    .await?
            }
            (None, None, Some(synopsis)) => synopsis.to_string(),
            (None, None, None) => {
                return Err(AppError::InvalidInput(
                    "A vibe_profile or synopsis is required when no profile generator is configured"
                        .to_string(),
                ))
            }
        };

        let record = MediaRecord::new(title.to_string(), request.media_type, vibe_profile)
            .with_year(request.year)
            .with_plot_summary(synopsis.map(str::to_string));

        if let Some(existing) = self.store.fetch_record(&record.id).await? {
            if existing.title.to_lowercase() == title.to_lowercase() {
                return Ok(existing);
            }
            return Err(AppError::InvalidInput(format!(
                "Title '{}' maps to id {} already used by '{}'",
                title, record.id, existing.title
            )));
        }

        let embedding = self.embed(&record.vibe_profile).await?;
        self.store.insert_record(&record).await?;
        self.store
            .store_embedding(&record.id, &embedding, &self.embedder.model_name())
            .await?;
        self.index.upsert(record.id.clone(), embedding).await;

        tracing::info!(
            media_id = %record.id,
            media_type = %record.media_type,
            "Media ingested"
        );

        Ok(record)
    }

    /// Regenerates the profile when a generator is configured, then re-embeds
    pub async fn refresh(&self, media_id: &str) -> AppResult<MediaRecord> {
        let mut record = self
            .store
            .fetch_record(media_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Media {}", media_id)))?;

        if let Some(profiler) = &self.profiler {
            let profile = profiler
                .generate(
                    &record.title,
                    record.media_type,
                    record.year,
                    record.plot_summary.as_deref(),
                )
                .await?;
            self.store.update_vibe_profile(&record.id, &profile).await?;
            record.vibe_profile = profile;
        }

        let embedding = self.embed(&record.vibe_profile).await?;
        self.store
            .store_embedding(&record.id, &embedding, &self.embedder.model_name())
            .await?;
        let replaced = self.index.upsert(record.id.clone(), embedding).await;

        tracing::info!(media_id = %record.id, replaced, "Vibe embedding refreshed");

        // Re-read so updated_at reflects the store
        Ok(self.store.fetch_record(media_id).await?.unwrap_or(record))
    }

    async fn embed(&self, text: &str) -> AppResult<Vec<f32>> {
        tokio::time::timeout(self.embed_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| {
                AppError::ExternalApi(format!(
                    "Embedding timed out after {}ms",
                    self.embed_timeout.as_millis()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::InMemoryStore,
        services::{
            embeddings::{MockEmbedder, PlaceholderEmbedder},
            llm::MockChatCompletion,
        },
    };

    fn request(title: &str, synopsis: Option<&str>, profile: Option<&str>) -> IngestMediaRequest {
        IngestMediaRequest {
            title: title.to_string(),
            media_type: MediaType::Anime,
            year: Some(2021),
            synopsis: synopsis.map(str::to_string),
            vibe_profile: profile.map(str::to_string),
        }
    }

    fn typed_request(title: &str, media_type: MediaType, profile: &str) -> IngestMediaRequest {
        IngestMediaRequest {
            media_type,
            ..request(title, None, Some(profile))
        }
    }

    fn ingestor(store: Arc<InMemoryStore>, index: Arc<VectorIndex>) -> MediaIngestor {
        MediaIngestor::new(
            store,
            Arc::new(PlaceholderEmbedder::new(8)),
            index,
            Duration::from_secs(1),
        )
    }

    fn profiler_replying(reply: &'static str) -> VibeProfiler {
        let mut llm = MockChatCompletion::new();
        llm.expect_complete()
            .returning(move |_, _, temperature| {
                assert_eq!(temperature, PROFILE_TEMPERATURE);
                Ok(reply.to_string())
            });
        llm.expect_name().returning(|| "mock".to_string());
        VibeProfiler::new(Arc::new(llm))
    }

    #[tokio::test]
    async fn test_ingest_with_supplied_profile() {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(VectorIndex::new());
        let ingestor = ingestor(store.clone(), index.clone());

        let record = ingestor
            .ingest(request("Odd Taxi", Some("a walrus drives a cab"), Some("deadpan noir")))
            .await
            .unwrap();

        assert_eq!(record.id, "anime-Odd-Taxi");
        assert_eq!(record.vibe_profile, "deadpan noir");
        assert_eq!(record.plot_summary.as_deref(), Some("a walrus drives a cab"));
        assert_eq!(index.size().await, 1);
        assert!(store.fetch_embedding(&record.id).await.unwrap().is_some());
        assert_eq!(
            store.load_embeddings("placeholder-dev").await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent_by_title() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = ingestor(store.clone(), Arc::new(VectorIndex::new()));

        let first = ingestor
            .ingest(request("Mushishi", None, Some("hushed forest calm")))
            .await
            .unwrap();
        let second = ingestor
            .ingest(request("  mushishi ", None, Some("something else")))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(store.counts().await.unwrap().media_count, 1);
    }

    #[tokio::test]
    async fn test_ingest_keeps_non_ascii_titles_distinct() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = ingestor(store.clone(), Arc::new(VectorIndex::new()));

        let spirited = ingestor
            .ingest(request("千と千尋の神隠し", None, Some("bathhouse wonder")))
            .await
            .unwrap();
        let your_name = ingestor
            .ingest(request("君の名は。", None, Some("comet-lit longing")))
            .await
            .unwrap();

        assert_ne!(spirited.id, your_name.id);
        assert_eq!(your_name.title, "君の名は。");
        assert_eq!(your_name.vibe_profile, "comet-lit longing");
        assert_eq!(store.counts().await.unwrap().media_count, 2);
    }

    #[tokio::test]
    async fn test_same_title_with_different_type_is_a_new_record() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = ingestor(store.clone(), Arc::new(VectorIndex::new()));

        let movie = ingestor
            .ingest(typed_request("Fargo", MediaType::Movie, "snowbound dark comedy"))
            .await
            .unwrap();
        let show = ingestor
            .ingest(typed_request("Fargo", MediaType::Tv, "midwestern crime anthology"))
            .await
            .unwrap();

        assert_eq!(movie.id, "movie-Fargo");
        assert_eq!(show.id, "tv-Fargo");
        assert_eq!(show.media_type, MediaType::Tv);
        assert_eq!(show.vibe_profile, "midwestern crime anthology");
        assert_eq!(store.counts().await.unwrap().media_count, 2);
    }

    #[tokio::test]
    async fn test_id_collision_with_other_title_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = ingestor(store.clone(), Arc::new(VectorIndex::new()));

        ingestor
            .ingest(request("Run-Run", None, Some("breathless")))
            .await
            .unwrap();
        let clash = ingestor.ingest(request("Run Run", None, Some("other"))).await;

        assert!(matches!(clash, Err(AppError::InvalidInput(_))));
        assert_eq!(store.counts().await.unwrap().media_count, 1);
    }

    #[tokio::test]
    async fn test_ingest_generates_profile_when_missing() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = ingestor(store, Arc::new(VectorIndex::new()))
            .with_profiler(profiler_replying("  sun-bleached ennui  "));

        let record = ingestor
            .ingest(request("Aria", Some("gondolas"), None))
            .await
            .unwrap();
        assert_eq!(record.vibe_profile, "sun-bleached ennui");
    }

    #[tokio::test]
    async fn test_ingest_falls_back_to_synopsis() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = ingestor(store, Arc::new(VectorIndex::new()));

        let record = ingestor
            .ingest(request("Aria", Some("gondolas at dusk"), None))
            .await
            .unwrap();
        assert_eq!(record.vibe_profile, "gondolas at dusk");
    }

    #[tokio::test]
    async fn test_ingest_rejects_missing_text() {
        let store = Arc::new(InMemoryStore::new());
        let ingestor = ingestor(store, Arc::new(VectorIndex::new()));

        let no_text = ingestor.ingest(request("Aria", None, None)).await;
        assert!(matches!(no_text, Err(AppError::InvalidInput(_))));

        let no_title = ingestor.ingest(request("   ", None, Some("x"))).await;
        assert!(matches!(no_title, Err(AppError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_no_record() {
        let store = Arc::new(InMemoryStore::new());
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(AppError::ExternalApi("down".to_string())));
        embedder.expect_model_name().returning(|| "m".to_string());

        let ingestor = MediaIngestor::new(
            store.clone(),
            Arc::new(embedder),
            Arc::new(VectorIndex::new()),
            Duration::from_secs(1),
        );

        let result = ingestor.ingest(request("Aria", None, Some("calm"))).await;
        assert!(result.is_err());
        assert_eq!(store.counts().await.unwrap().media_count, 0);
    }

    #[tokio::test]
    async fn test_refresh_regenerates_and_reembeds() {
        let store = Arc::new(InMemoryStore::new());
        let index = Arc::new(VectorIndex::new());
        let record = ingestor(store.clone(), index.clone())
            .ingest(request("Aria", None, Some("old words")))
            .await
            .unwrap();
        let before = index.get(&record.id).await.unwrap();

        let refreshed = ingestor(store.clone(), index.clone())
            .with_profiler(profiler_replying("brand new words entirely"))
            .refresh(&record.id)
            .await
            .unwrap();

        assert_eq!(refreshed.vibe_profile, "brand new words entirely");
        assert_ne!(index.get(&record.id).await.unwrap(), before);
        assert_eq!(index.size().await, 1);
    }

    #[tokio::test]
    async fn test_refresh_unknown_media() {
        let ingestor = ingestor(Arc::new(InMemoryStore::new()), Arc::new(VectorIndex::new()));
        let result = ingestor.refresh("anime-Missing").await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
