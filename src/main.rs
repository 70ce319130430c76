use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use vibe_api::{
    api::{create_router, AppState},
    config::Config,
    db::{
        create_pool, create_redis_client, run_migrations, Cache, InMemoryStore, MediaStore,
        PgMediaStore,
    },
    services::{
        CachedEmbedder, ChatCompletion, Embedder, OpenAiChat, OpenAiEmbedder,
        PlaceholderEmbedder, SearchSettings,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vibe_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn MediaStore> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url)
                .await
                .context("Failed to connect to Postgres")?;
            run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Using Postgres media store");
            Arc::new(PgMediaStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory media store");
            Arc::new(InMemoryStore::new())
        }
    };

    let (embedder, chat): (Arc<dyn Embedder>, Option<Arc<dyn ChatCompletion>>) =
        match config.api_key() {
            Some(api_key) => {
                let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
                    api_key.to_string(),
                    config.openai_api_url.clone(),
                    config.embedding_model.clone(),
                    config.embed_timeout(),
                )?);
                let chat: Arc<dyn ChatCompletion> = Arc::new(OpenAiChat::new(
                    api_key.to_string(),
                    config.openai_api_url.clone(),
                    config.chat_model.clone(),
                    config.judge_timeout(),
                )?);
                (embedder, Some(chat))
            }
            None => {
                tracing::warn!(
                    "OPENAI_API_KEY not set, using placeholder embeddings without judge or profile generation"
                );
                let embedder: Arc<dyn Embedder> = Arc::new(PlaceholderEmbedder::default());
                (embedder, None)
            }
        };

    let mut cache_handle = None;
    let embedder: Arc<dyn Embedder> = match &config.redis_url {
        Some(url) => {
            let (cache, handle) = Cache::new(create_redis_client(url)?);
            cache_handle = Some(handle);
            tracing::info!(ttl_secs = config.query_cache_ttl_secs, "Query embedding cache enabled");
            Arc::new(CachedEmbedder::new(
                embedder,
                cache,
                config.query_cache_ttl_secs,
            ))
        }
        None => embedder,
    };

    let settings = SearchSettings {
        embed_timeout: config.embed_timeout(),
        fetch_timeout: config.fetch_timeout(),
    };
    let (state, quality_handle) =
        AppState::new(store, embedder, chat, settings, config.judge_timeout());

    state
        .search
        .warm_index()
        .await
        .context("Failed to load embeddings into the vector index")?;

    tracing::info!(
        model = %state.search.embedder().model_name(),
        judge = state.search.has_judge(),
        cors = config.enable_cors,
        "Vibe search ready"
    );

    let mut app = create_router(state);
    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    tracing::info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    quality_handle.shutdown().await;
    if let Some(handle) = cache_handle {
        handle.shutdown().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
