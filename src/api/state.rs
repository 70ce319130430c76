use std::{sync::Arc, time::Duration};

use crate::{
    db::MediaStore,
    services::{
        spawn_quality_writer, ChatCompletion, Embedder, Judge, MediaIngestor, QualityBoostSender,
        QualityWriterHandle, SearchSettings, VectorIndex, VibeProfiler, VibeSearch,
    },
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<VibeSearch>,
    pub ingestor: MediaIngestor,
    pub store: Arc<dyn MediaStore>,
    pub quality: QualityBoostSender,
}

impl AppState {
    /// Wires the search pipeline, ingestion and the quality writer around one store.
    ///
    /// With a chat capability the search gets a judge and ingestion gets a profile
    /// generator. Must be called inside a tokio runtime.
    pub fn new(
        store: Arc<dyn MediaStore>,
        embedder: Arc<dyn Embedder>,
        chat: Option<Arc<dyn ChatCompletion>>,
        settings: SearchSettings,
        judge_timeout: Duration,
    ) -> (Self, QualityWriterHandle) {
        let index = Arc::new(VectorIndex::new());

        let mut search = VibeSearch::new(index.clone(), embedder.clone(), store.clone(), settings);
        let mut ingestor =
            MediaIngestor::new(store.clone(), embedder, index, settings.embed_timeout);

        if let Some(chat) = chat {
            search = search.with_judge(Judge::new(chat.clone(), judge_timeout));
            ingestor = ingestor.with_profiler(VibeProfiler::new(chat));
        }

        let (quality, quality_handle) = spawn_quality_writer(store.clone());

        let state = Self {
            search: Arc::new(search),
            ingestor,
            store,
            quality,
        };
        (state, quality_handle)
    }
}
