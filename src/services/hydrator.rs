use std::{sync::Arc, time::Duration};

use crate::{db::MediaStore, models::MediaRecord, services::vector_index::SearchCandidate};

/// A hydrated candidate: full record plus its retrieval-time similarity
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMedia {
    pub media: MediaRecord,
    pub vibe_score: f64,
}

/// Resolves similarity hits to full records through the store
#[derive(Clone)]
pub struct CandidateHydrator {
    store: Arc<dyn MediaStore>,
    timeout: Duration,
}

impl CandidateHydrator {
    pub fn new(store: Arc<dyn MediaStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Fetches every candidate in parallel and returns them in input order.
    ///
    /// Ids that no longer resolve, whose lookup fails, or whose lookup exceeds the
    /// timeout are dropped. This never fails as a whole.
    pub async fn hydrate(&self, candidates: &[SearchCandidate]) -> Vec<ScoredMedia> {
        let mut tasks = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let store = self.store.clone();
            let timeout = self.timeout;
            let media_id = candidate.media_id.clone();
            let task = tokio::spawn(async move {
                tokio::time::timeout(timeout, store.fetch_record(&media_id)).await
            });
            tasks.push((candidate, task));
        }

        let mut hydrated = Vec::with_capacity(candidates.len());
        let mut dropped = 0usize;

        for (candidate, task) in tasks {
            match task.await {
                Ok(Ok(Ok(Some(media)))) => hydrated.push(ScoredMedia {
                    media,
                    vibe_score: candidate.similarity,
                }),
                Ok(Ok(Ok(None))) => {
                    tracing::debug!(media_id = %candidate.media_id, "Candidate no longer in catalog");
                    dropped += 1;
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!(media_id = %candidate.media_id, error = %e, "Candidate fetch failed");
                    dropped += 1;
                }
                Ok(Err(_)) => {
                    tracing::warn!(media_id = %candidate.media_id, "Candidate fetch timed out");
                    dropped += 1;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Task join error");
                    dropped += 1;
                }
            }
        }

        if dropped > 0 {
            tracing::info!(
                hydrated = hydrated.len(),
                dropped,
                "Dropped unresolvable candidates"
            );
        }

        hydrated
    }
}
