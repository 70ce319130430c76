pub mod embeddings;
pub mod hydrator;
pub mod ingest;
pub mod judge;
pub mod llm;
pub mod quality;
pub mod search;
pub mod seen;
pub mod vector_index;

pub use embeddings::{CachedEmbedder, Embedder, OpenAiEmbedder, PlaceholderEmbedder};
pub use hydrator::{CandidateHydrator, ScoredMedia};
pub use ingest::{MediaIngestor, VibeProfiler};
pub use judge::{Judge, JudgeDegraded, JudgeOutcome};
pub use llm::{ChatCompletion, OpenAiChat};
pub use quality::{spawn_quality_writer, QualityBoostSender, QualityWriterHandle};
pub use search::{SearchError, SearchRequest, SearchSettings, VibeSearch};
pub use vector_index::{SearchCandidate, VectorIndex};
