//! The vibe search pipeline.
//!
//! query text -> embed -> exclude seen -> nearest neighbours -> hydrate -> judge
//! (optional) -> ranked, explained list. Only a missing query vector or exclusion
//! set fails a request; judge problems and unresolvable candidates shrink or
//! reorder the result instead.

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;

use crate::{
    db::MediaStore,
    error::{AppError, AppResult},
    models::{IndexStats, MediaRecord, Recommendation, RerankVerdict, SearchResult},
    services::{
        embeddings::Embedder,
        hydrator::{CandidateHydrator, ScoredMedia},
        judge::Judge,
        quality::rank_hidden_gems,
        vector_index::VectorIndex,
    },
};

pub const DEFAULT_TOP_K: usize = 20;
pub const DEFAULT_FINAL_RESULTS: usize = 10;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query embedding failed: {0}")]
    EmbeddingFailed(String),

    #[error("exclusion lookup failed: {0}")]
    ExclusionLookupFailed(String),

    #[error("no stored vibe embedding for media {0}")]
    SourceNotFound(String),

    #[error("catalog lookup failed: {0}")]
    CatalogLookupFailed(String),
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            SearchError::SourceNotFound(_) => AppError::NotFound(err.to_string()),
            SearchError::EmbeddingFailed(_)
            | SearchError::ExclusionLookupFailed(_)
            | SearchError::CatalogLookupFailed(_) => AppError::RetrievalFailed(err.to_string()),
        }
    }
}

/// Parameters of one [`VibeSearch::search`] call. Zero limits mean "use the default".
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub user_id: String,
    pub query: String,
    pub top_k: usize,
    pub final_results: usize,
    pub use_judge: bool,
}

impl SearchRequest {
    pub fn new(user_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            final_results: DEFAULT_FINAL_RESULTS,
            use_judge: true,
        }
    }

    pub fn with_limits(mut self, top_k: usize, final_results: usize) -> Self {
        self.top_k = top_k;
        self.final_results = final_results;
        self
    }

    pub fn with_judge(mut self, use_judge: bool) -> Self {
        self.use_judge = use_judge;
        self
    }
}

/// Timeouts for the external calls made while serving a search
#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub embed_timeout: Duration,
    /// Bounds the exclusion lookup, catalog listing and each record fetch
    pub fetch_timeout: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(5),
        }
    }
}

/// Recommendations being assembled for one response.
///
/// Tracks which ids are already placed so no candidate appears twice, and hands
/// out ranks positionally so they stay contiguous from 1.
struct Placement {
    recommendations: Vec<Recommendation>,
    placed: HashSet<String>,
    limit: usize,
}

impl Placement {
    fn new(limit: usize) -> Self {
        Self {
            recommendations: Vec::with_capacity(limit),
            placed: HashSet::with_capacity(limit),
            limit,
        }
    }

    fn is_full(&self) -> bool {
        self.recommendations.len() >= self.limit
    }

    fn place(&mut self, candidate: &ScoredMedia, explanation: String) -> bool {
        if self.is_full() || !self.placed.insert(candidate.media.id.clone()) {
            return false;
        }
        self.recommendations.push(Recommendation {
            media: candidate.media.clone(),
            vibe_score: candidate.vibe_score,
            explanation,
            rank: self.recommendations.len() + 1,
        });
        true
    }

    /// Places leftover candidates in the order given until full
    fn fill<F>(&mut self, candidates: &[ScoredMedia], explain: F)
    where
        F: Fn(&MediaRecord) -> String,
    {
        for candidate in candidates {
            if self.is_full() {
                break;
            }
            if !self.placed.contains(&candidate.media.id) {
                self.place(candidate, explain(&candidate.media));
            }
        }
    }

    fn into_recommendations(self) -> Vec<Recommendation> {
        self.recommendations
    }
}

fn plain_match(media: &MediaRecord) -> String {
    format!("Vibe match: {}", media.vibe_profile)
}

fn fallback_match(media: &MediaRecord) -> String {
    format!("Vibe match based on: {}", media.vibe_profile)
}

fn fill_in_match(media: &MediaRecord) -> String {
    format!("Similar vibe: {}", media.vibe_profile)
}

fn similar_to_source(media: &MediaRecord) -> String {
    format!("Similar vibe to source: {}", media.vibe_profile)
}

/// Awaits `fut` for at most `timeout`, flattening both failure kinds to a message
async fn bounded<T>(
    timeout: Duration,
    fut: impl Future<Output = AppResult<T>>,
) -> Result<T, String> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}ms", timeout.as_millis())),
    }
}

/// Entry point for every read-side recommendation mode
pub struct VibeSearch {
    index: Arc<VectorIndex>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn MediaStore>,
    hydrator: CandidateHydrator,
    judge: Option<Judge>,
    settings: SearchSettings,
}

impl VibeSearch {
    pub fn new(
        index: Arc<VectorIndex>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn MediaStore>,
        settings: SearchSettings,
    ) -> Self {
        let hydrator = CandidateHydrator::new(store.clone(), settings.fetch_timeout);
        Self {
            index,
            embedder,
            store,
            hydrator,
            judge: None,
            settings,
        }
    }

    pub fn with_judge(mut self, judge: Judge) -> Self {
        self.judge = Some(judge);
        self
    }

    pub fn has_judge(&self) -> bool {
        self.judge.is_some()
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    async fn exclusion_set(&self, user_id: &str) -> Result<HashSet<String>, SearchError> {
        bounded(self.settings.fetch_timeout, self.store.seen_media_ids(user_id))
            .await
            .map_err(SearchError::ExclusionLookupFailed)
    }

    /// Runs the full pipeline for a free-text vibe query
    pub async fn search(&self, request: SearchRequest) -> Result<SearchResult, SearchError> {
        let started = Instant::now();
        let top_k = if request.top_k == 0 {
            DEFAULT_TOP_K
        } else {
            request.top_k
        };
        let final_results = if request.final_results == 0 {
            DEFAULT_FINAL_RESULTS
        } else {
            request.final_results
        };

        let embedding = bounded(self.settings.embed_timeout, self.embedder.embed(&request.query))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Query embedding failed");
                SearchError::EmbeddingFailed(e)
            })?;

        let exclude = self.exclusion_set(&request.user_id).await.map_err(|e| {
            tracing::error!(user_id = %request.user_id, error = %e, "Exclusion lookup failed");
            e
        })?;

        let candidates = self.index.search(&embedding, top_k, &exclude).await;
        if candidates.is_empty() {
            tracing::info!(
                user_id = %request.user_id,
                filtered = exclude.len(),
                "No candidates for vibe query"
            );
            return Ok(SearchResult::empty(request.query, exclude.len()));
        }

        let total_candidates = candidates.len();
        let hydrated = self.hydrator.hydrate(&candidates).await;

        let mut judged = false;
        let recommendations = match &self.judge {
            Some(judge) if request.use_judge && !hydrated.is_empty() => {
                match judge.rerank(&request.query, &hydrated).await {
                    Ok(outcome) => {
                        judged = !outcome.degraded;
                        assemble_judged(&hydrated, outcome.verdicts, final_results)
                    }
                    Err(e) => {
                        tracing::warn!(
                            judge = %judge.name(),
                            error = %e,
                            "Judge degraded, falling back to similarity order"
                        );
                        assemble_positional(&hydrated, final_results, fallback_match)
                    }
                }
            }
            _ => assemble_positional(&hydrated, final_results, plain_match),
        };

        tracing::info!(
            user_id = %request.user_id,
            candidates = total_candidates,
            hydrated = hydrated.len(),
            filtered = exclude.len(),
            returned = recommendations.len(),
            judged,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Vibe search complete"
        );

        Ok(SearchResult {
            recommendations,
            query: request.query,
            total_candidates,
            filtered_count: exclude.len(),
            judged,
        })
    }

    /// Items closest to `source_id`'s own vibe, never including the source itself
    pub async fn find_similar(
        &self,
        user_id: &str,
        source_id: &str,
        limit: usize,
    ) -> Result<Vec<Recommendation>, SearchError> {
        let limit = if limit == 0 {
            DEFAULT_FINAL_RESULTS
        } else {
            limit
        };

        let source_vector = match self.index.get(source_id).await {
            Some(vector) => vector.to_vec(),
            None => bounded(
                self.settings.fetch_timeout,
                self.store.fetch_embedding(source_id),
            )
            .await
            .map_err(SearchError::EmbeddingFailed)?
            .ok_or_else(|| SearchError::SourceNotFound(source_id.to_string()))?,
        };

        let mut exclude = self.exclusion_set(user_id).await?;
        exclude.insert(source_id.to_string());

        let candidates = self
            .index
            .search(&source_vector, limit.saturating_mul(2), &exclude)
            .await;
        let hydrated = self.hydrator.hydrate(&candidates).await;
        let recommendations = assemble_positional(&hydrated, limit, similar_to_source);

        tracing::info!(
            source_id = %source_id,
            candidates = candidates.len(),
            returned = recommendations.len(),
            "Similar search complete"
        );

        Ok(recommendations)
    }

    /// High quality, low popularity records the user has not seen
    pub async fn hidden_gems(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<MediaRecord>, SearchError> {
        let limit = if limit == 0 {
            DEFAULT_FINAL_RESULTS
        } else {
            limit
        };

        let exclude = self.exclusion_set(user_id).await?;
        let records = bounded(self.settings.fetch_timeout, self.store.list_records())
            .await
            .map_err(SearchError::CatalogLookupFailed)?;

        let gems = rank_hidden_gems(records, &exclude, limit);
        tracing::info!(user_id = %user_id, returned = gems.len(), "Hidden gems ranked");
        Ok(gems)
    }

    /// Loads every stored embedding for the active model into the index
    pub async fn warm_index(&self) -> AppResult<usize> {
        let model = self.embedder.model_name();
        let embeddings = self.store.load_embeddings(&model).await?;
        let loaded = embeddings.len();
        self.index.replace_all(embeddings).await;

        tracing::info!(model = %model, loaded, "Vector index warmed");
        Ok(loaded)
    }

    pub async fn stats(&self) -> AppResult<IndexStats> {
        let counts = self.store.counts().await?;
        Ok(IndexStats {
            media_count: counts.media_count,
            embedding_count: counts.embedding_count,
            vector_index_size: self.index.size().await,
            embedding_model: self.embedder.model_name(),
        })
    }
}

/// Top `limit` candidates in similarity order, ranked by position
fn assemble_positional(
    hydrated: &[ScoredMedia],
    limit: usize,
    explain: fn(&MediaRecord) -> String,
) -> Vec<Recommendation> {
    let mut placement = Placement::new(limit);
    placement.fill(hydrated, explain);
    placement.into_recommendations()
}

/// Judge picks first, then the remaining slots from leftovers by similarity
fn assemble_judged(
    hydrated: &[ScoredMedia],
    verdicts: Vec<RerankVerdict>,
    limit: usize,
) -> Vec<Recommendation> {
    let by_id: HashMap<&str, &ScoredMedia> = hydrated
        .iter()
        .map(|c| (c.media.id.as_str(), c))
        .collect();

    let mut placement = Placement::new(limit);
    for verdict in verdicts {
        if let Some(candidate) = by_id.get(verdict.media_id.as_str()) {
            placement.place(candidate, verdict.explanation);
        }
    }
    placement.fill(hydrated, fill_in_match);
    placement.into_recommendations()
}
