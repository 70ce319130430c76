use serde::{Deserialize, Serialize};

use super::MediaRecord;

/// A judge's placement of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankVerdict {
    pub media_id: String,
    /// 1-based, dense
    pub rank: usize,
    pub explanation: String,
}

/// The externally visible unit of a result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub media: MediaRecord,
    /// Cosine similarity at retrieval time; judging never overwrites it
    pub vibe_score: f64,
    pub explanation: String,
    /// 1-based and unique within one list
    pub rank: usize,
}

/// Outcome of one vibe search
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub recommendations: Vec<Recommendation>,
    pub query: String,
    /// Candidates returned by the vector index
    pub total_candidates: usize,
    /// Size of the exclusion set applied to the search
    pub filtered_count: usize,
    /// Whether the ordering came from the judge rather than the similarity fallback
    pub judged: bool,
}

impl SearchResult {
    pub fn empty(query: String, filtered_count: usize) -> Self {
        Self {
            recommendations: Vec::new(),
            query,
            total_candidates: 0,
            filtered_count,
            judged: false,
        }
    }
}
