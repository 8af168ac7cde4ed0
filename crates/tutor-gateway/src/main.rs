mod app;
mod error;
mod http;
mod ws;

use std::sync::Arc;

use tutor_broker::BrokerHandle;
use tutor_cache::{HotCache, InMemoryCache};
use tutor_core::config::TutorConfig;
use tutor_drs::db::init_db;
use tutor_drs::Drs;
use tutor_providers::embedding::{EmbeddingProvider, OpenAiEmbeddingProvider};
use tutor_providers::llm::{LlmProvider, OpenAiCompatLlmProvider};
use tutor_providers::router::{EmbeddingRouter, LlmRouter, Slot};
use tutor_providers::tts::{HttpStreamingTtsProvider, TtsProvider};
use tutor_worker::{Worker, WorkerConfig as RunnerConfig};

use app::{AppState, InMemoryIngestRequests};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let config = TutorConfig::load(None)?;

    std::fs::create_dir_all(
        std::path::Path::new(&config.database.path)
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    )?;
    let conn = rusqlite::Connection::open(&config.database.path)?;
    init_db(&conn)?;
    let drs = Arc::new(Drs::new(conn));

    let cache: Arc<dyn HotCache> = Arc::new(InMemoryCache::default());

    let embeddings = Arc::new(build_embedding_router(&config)?);
    let llm = Arc::new(build_llm_router(&config)?);
    let tts = build_tts_provider(&config);

    let broker_conn = rusqlite::Connection::open(&config.database.path)?;
    let broker = Arc::new(BrokerHandle::new(broker_conn)?);

    let ingest_requests = Arc::new(InMemoryIngestRequests::new());

    // Shared across the gateway's own retriever and every worker's ingest
    // pipeline so chunks a worker indexes are immediately queryable via
    // chat/retrieval. A networked deployment would replace this in-memory
    // index with one reachable from every process; here one process owns it.
    let vector_index: Arc<dyn tutor_vector::VectorIndex> = Arc::new(tutor_vector::InMemoryVectorIndex::default());

    for _ in 0..config.worker.process_count {
        let broker = broker.clone();
        let drs = drs.clone();
        let embeddings = embeddings.clone();
        let llm = llm.clone();
        let ingest_requests = ingest_requests.clone();
        let vector_index = vector_index.clone();
        let worker_config = RunnerConfig {
            max_tasks_per_process: config.worker.max_tasks_per_process,
            rss_soft_cap_bytes: config.worker.rss_soft_cap_bytes,
            ..RunnerConfig::default()
        };
        tokio::spawn(async move {
            let pipeline = Arc::new(tutor_ingest::IngestPipeline::new(embeddings, llm, vector_index, drs.clone()));
            let worker = Worker::new(broker, drs, pipeline, ingest_requests, worker_config);
            worker.run().await;
        });
    }

    let state = Arc::new(
        AppState::new(config.clone(), drs, cache, embeddings, llm, tts, broker, ingest_requests, vector_index).await?,
    );
    let router = app::build_router(state);

    let addr = format!("{}:{}", config.gateway.bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr, "tutor-gateway listening");
    axum::serve(listener, router).await?;

    Ok(())
}

fn build_embedding_router(config: &TutorConfig) -> anyhow::Result<EmbeddingRouter> {
    let cfg = config
        .providers
        .embedding
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no embedding provider configured; set [providers.embedding] in tutor.toml"))?;
    let provider: Box<dyn EmbeddingProvider> = Box::new(OpenAiEmbeddingProvider::new(
        cfg.api_key.clone(),
        cfg.base_url.clone(),
        cfg.model.clone(),
        cfg.batch_size,
        cfg.dimensions,
    ));
    Ok(EmbeddingRouter::new(vec![Slot::new(provider, 2)]))
}

fn build_llm_router(config: &TutorConfig) -> anyhow::Result<LlmRouter> {
    let cfg = config
        .providers
        .llm
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("no llm provider configured; set [providers.llm] in tutor.toml"))?;
    let provider: Box<dyn LlmProvider> = Box::new(OpenAiCompatLlmProvider::new(
        cfg.provider_id.clone(),
        cfg.api_key.clone(),
        cfg.base_url.clone().unwrap_or_else(|| "https://api.openai.com".to_string()),
        "/v1/chat/completions".to_string(),
        cfg.model.clone(),
    ));
    Ok(LlmRouter::new(vec![Slot::new(provider, 2)]))
}

fn build_tts_provider(config: &TutorConfig) -> Option<Arc<dyn TtsProvider>> {
    let cfg = config.providers.tts.as_ref()?;
    Some(Arc::new(HttpStreamingTtsProvider::new(
        cfg.provider_id.clone(),
        cfg.api_key.clone(),
        cfg.base_url.clone().unwrap_or_else(|| "https://api.openai.com".to_string()),
    )))
}
