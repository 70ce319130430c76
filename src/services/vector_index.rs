use std::{
    cmp::Ordering,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use tokio::sync::RwLock;

/// A single nearest-neighbour hit
#[derive(Debug, Clone, PartialEq)]
pub struct SearchCandidate {
    pub media_id: String,
    /// Cosine similarity in [-1, 1]
    pub similarity: f64,
}

/// In-memory nearest-neighbour index over one embedding per media id
///
/// Search is an exhaustive cosine scan. Callers only rely on "up to `top_k` hits,
/// best first, excluded ids never returned", so an approximate index can replace
/// the scan without changing any call site.
///
/// Vectors are stored behind `Arc<[f32]>` and swapped whole under the write lock,
/// so a reader never sees a mix of two insertions for the same id.
#[derive(Debug, Default)]
pub struct VectorIndex {
    vectors: RwLock<HashMap<String, Arc<[f32]>>>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole collection in one write
    pub async fn replace_all(&self, embeddings: HashMap<String, Vec<f32>>) {
        let fresh: HashMap<String, Arc<[f32]>> = embeddings
            .into_iter()
            .map(|(id, vector)| (id, Arc::from(vector)))
            .collect();
        *self.vectors.write().await = fresh;
    }

    /// Inserts or replaces the vector for `id`. Returns true when an entry was replaced.
    pub async fn upsert(&self, id: impl Into<String>, vector: Vec<f32>) -> bool {
        let vector: Arc<[f32]> = Arc::from(vector);
        self.vectors
            .write()
            .await
            .insert(id.into(), vector)
            .is_some()
    }

    /// Removes the entry for `id`; no-op if absent
    pub async fn remove(&self, id: &str) {
        self.vectors.write().await.remove(id);
    }

    pub async fn size(&self) -> usize {
        self.vectors.read().await.len()
    }

    /// Stored vector for `id`, if any
    pub async fn get(&self, id: &str) -> Option<Arc<[f32]>> {
        self.vectors.read().await.get(id).cloned()
    }

    /// Returns up to `top_k` candidates by descending similarity, skipping `exclude`.
    ///
    /// Equal similarities are ordered by media id so results are reproducible for a
    /// given snapshot. An empty index or `top_k == 0` yields an empty list.
    pub async fn search(
        &self,
        query: &[f32],
        top_k: usize,
        exclude: &HashSet<String>,
    ) -> Vec<SearchCandidate> {
        if top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<SearchCandidate> = {
            let vectors = self.vectors.read().await;
            vectors
                .iter()
                .filter(|(id, _)| !exclude.contains(*id))
                .map(|(id, vector)| SearchCandidate {
                    media_id: id.clone(),
                    similarity: cosine_similarity(query, vector),
                })
                .collect()
        };

        if scored.len() > top_k {
            scored.select_nth_unstable_by(top_k - 1, best_first);
            scored.truncate(top_k);
        }
        scored.sort_by(best_first);
        scored
    }
}

fn best_first(a: &SearchCandidate, b: &SearchCandidate) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.media_id.cmp(&b.media_id))
}

/// Cosine similarity `dot(a, b) / (|a| * |b|)`.
///
/// Mismatched lengths, empty or zero-norm vectors, and non-finite results all give 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-6;

    async fn scenario_index() -> VectorIndex {
        let index = VectorIndex::new();
        index.upsert("X", vec![1.0, 0.0]).await;
        index.upsert("Y", vec![0.0, 1.0]).await;
        index.upsert("Z", vec![0.7, 0.7]).await;
        index
    }

    fn ids(candidates: &[SearchCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.media_id.as_str()).collect()
    }

    #[test]
    fn test_cosine_of_vector_with_itself_is_one() {
        let a = [0.3, -1.2, 4.5, 0.01];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < EPSILON);
    }

    #[test]
    fn test_cosine_is_symmetric() {
        let a = [0.3, -1.2, 4.5];
        let b = [2.0, 0.5, -0.7];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_with_zero_vector_is_zero() {
        let zero = [0.0, 0.0, 0.0];
        let a = [1.0, 2.0, 3.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn test_cosine_dimension_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_non_finite_input_is_zero() {
        assert_eq!(cosine_similarity(&[f32::NAN, 1.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[f32::INFINITY, 1.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_opposite_vectors() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_search_orders_by_similarity() {
        let index = scenario_index().await;
        let hits = index.search(&[1.0, 0.0], 3, &HashSet::new()).await;

        assert_eq!(ids(&hits), vec!["X", "Z", "Y"]);
        assert!((hits[0].similarity - 1.0).abs() < EPSILON);
        assert!((hits[1].similarity - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        assert!(hits[2].similarity.abs() < EPSILON);
    }

    #[tokio::test]
    async fn test_search_skips_excluded_ids() {
        let index = scenario_index().await;
        let exclude: HashSet<String> = ["X".to_string()].into_iter().collect();
        let hits = index.search(&[1.0, 0.0], 3, &exclude).await;

        assert_eq!(ids(&hits), vec!["Z", "Y"]);
    }

    #[tokio::test]
    async fn test_search_on_empty_index_is_empty() {
        let index = VectorIndex::new();
        let hits = index.search(&[1.0, 0.0], 5, &HashSet::new()).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_search_respects_top_k() {
        let index = scenario_index().await;
        let hits = index.search(&[1.0, 0.0], 2, &HashSet::new()).await;
        assert_eq!(ids(&hits), vec!["X", "Z"]);

        assert!(index.search(&[1.0, 0.0], 0, &HashSet::new()).await.is_empty());
    }

    #[tokio::test]
    async fn test_ties_break_by_id() {
        let index = VectorIndex::new();
        for id in ["c", "a", "d", "b"] {
            index.upsert(id, vec![1.0, 1.0]).await;
        }

        let hits = index.search(&[1.0, 1.0], 3, &HashSet::new()).await;
        assert_eq!(ids(&hits), vec!["a", "b", "c"]);

        let again = index.search(&[1.0, 1.0], 3, &HashSet::new()).await;
        assert_eq!(hits, again);
    }

    #[tokio::test]
    async fn test_mismatched_dimensions_score_zero() {
        let index = VectorIndex::new();
        index.upsert("short", vec![1.0]).await;
        index.upsert("match", vec![1.0, 0.0]).await;

        let hits = index.search(&[1.0, 0.0], 5, &HashSet::new()).await;
        assert_eq!(ids(&hits), vec!["match", "short"]);
        assert_eq!(hits[1].similarity, 0.0);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_entry() {
        let index = VectorIndex::new();
        assert!(!index.upsert("A", vec![1.0, 0.0]).await);
        let size_before = index.size().await;

        assert!(index.upsert("A", vec![0.0, 1.0]).await);
        assert_eq!(index.size().await, size_before);
        assert_eq!(index.get("A").await.as_deref(), Some(&[0.0f32, 1.0][..]));
    }

    #[tokio::test]
    async fn test_remove_is_noop_when_absent() {
        let index = scenario_index().await;
        index.remove("missing").await;
        assert_eq!(index.size().await, 3);

        index.remove("X").await;
        assert_eq!(index.size().await, 2);
        assert!(index.get("X").await.is_none());
    }

    #[tokio::test]
    async fn test_replace_all_swaps_collection() {
        let index = scenario_index().await;
        let mut fresh = HashMap::new();
        fresh.insert("Q".to_string(), vec![0.5, 0.5]);
        index.replace_all(fresh).await;

        assert_eq!(index.size().await, 1);
        assert!(index.get("X").await.is_none());
    }

    #[tokio::test]
    async fn test_randomized_exclusions_never_leak() {
        let mut rng = fastrand::Rng::with_seed(7);
        for _ in 0..50 {
            let index = VectorIndex::new();
            let count = rng.usize(1..40);
            let mut all_ids = Vec::new();
            for i in 0..count {
                let id = format!("m{}", i);
                let vector = (0..8).map(|_| rng.f32() * 2.0 - 1.0).collect();
                index.upsert(id.clone(), vector).await;
                all_ids.push(id);
            }

            let exclude: HashSet<String> =
                all_ids.iter().filter(|_| rng.bool()).cloned().collect();
            let query: Vec<f32> = (0..8).map(|_| rng.f32() * 2.0 - 1.0).collect();
            let top_k = rng.usize(1..50);

            let hits = index.search(&query, top_k, &exclude).await;
            assert!(hits.len() <= top_k);
            assert_eq!(hits.len(), top_k.min(count - exclude.len()));
            assert!(hits.iter().all(|h| !exclude.contains(&h.media_id)));
            assert!(hits
                .windows(2)
                .all(|w| w[0].similarity >= w[1].similarity));
        }
    }

    #[tokio::test]
    async fn test_concurrent_upserts_are_never_torn() {
        let index = Arc::new(VectorIndex::new());
        index.upsert("shared", vec![0.0; 64]).await;

        let writers: Vec<_> = (1..=8)
            .map(|n| {
                let index = index.clone();
                tokio::spawn(async move {
                    for _ in 0..50 {
                        index.upsert("shared", vec![n as f32; 64]).await;
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let vector = index.get("shared").await.unwrap();
            assert!(vector.iter().all(|v| *v == vector[0]));
            tokio::task::yield_now().await;
        }

        for writer in writers {
            writer.await.unwrap();
        }
        assert_eq!(index.size().await, 1);
    }
}
