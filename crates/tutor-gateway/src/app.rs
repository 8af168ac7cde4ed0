use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tower_http::trace::TraceLayer;

use tutor_broker::BrokerHandle;
use tutor_cache::HotCache;
use tutor_chat::ChatService;
use tutor_core::config::TutorConfig;
use tutor_drs::Drs;
use tutor_ingest::{IngestPipeline, IngestRequest};
use tutor_intent::IntentRouter;
use tutor_orchestrator::Orchestrator;
use tutor_providers::router::{EmbeddingRouter, LlmRouter};
use tutor_providers::tts::TtsProvider;
use tutor_retrieval::HybridRetriever;
use tutor_sessions::SessionManager;
use tutor_vector::VectorIndex;
use tutor_worker::IngestRequestSource;

/// In-process handoff from `POST /ingest/upload` to the worker: this
/// single-node posture keeps the already-built `IngestRequest` (with its raw
/// file bytes) in memory rather than round-tripping it through the broker's
/// JSON payload (mirrors `tutor_worker::IngestTaskPayload`'s own doc comment).
pub struct InMemoryIngestRequests {
    pending: DashMap<String, IngestRequest>,
}

impl InMemoryIngestRequests {
    pub fn new() -> Self {
        Self { pending: DashMap::new() }
    }

    pub fn put(&self, task_id: String, request: IngestRequest) {
        self.pending.insert(task_id, request);
    }
}

impl Default for InMemoryIngestRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl IngestRequestSource for InMemoryIngestRequests {
    fn take(&self, task_id: &str) -> Option<IngestRequest> {
        self.pending.remove(task_id).map(|(_, v)| v)
    }
}

/// Central shared state, passed as `Arc<AppState>` to every Axum handler.
pub struct AppState {
    pub config: TutorConfig,
    pub drs: Arc<Drs>,
    pub cache: Arc<dyn HotCache>,
    pub sessions: Arc<SessionManager>,
    pub vector_index: Arc<dyn VectorIndex>,
    pub embeddings: Arc<EmbeddingRouter>,
    pub llm: Arc<LlmRouter>,
    pub tts: Option<Arc<dyn TtsProvider>>,
    pub retriever: Arc<HybridRetriever>,
    pub chat: Arc<ChatService>,
    pub orchestrator: Arc<Orchestrator>,
    pub broker: Arc<BrokerHandle>,
    pub ingest_pipeline: Arc<IngestPipeline>,
    pub ingest_requests: Arc<InMemoryIngestRequests>,
    /// Voice sessions awaiting their first WS connection after `/session/create`.
    pub voice_course_hint: DashMap<String, String>,
    pub default_language: AsyncMutex<String>,
}

/// Seed exemplars for the intent router (§4.6); an operator can grow this
/// set through configuration later, but the router works with nothing more
/// than this plus the keyword/heuristic fallback.
fn seed_exemplars() -> Vec<tutor_intent::Exemplar> {
    vec![
        tutor_intent::Exemplar { label: "greeting".to_string(), text: "hello".to_string() },
        tutor_intent::Exemplar { label: "greeting".to_string(), text: "hi there".to_string() },
        tutor_intent::Exemplar { label: "course_query".to_string(), text: "what's in module 2 of this course".to_string() },
        tutor_intent::Exemplar { label: "course_query".to_string(), text: "tell me about this topic".to_string() },
        tutor_intent::Exemplar { label: "general_question".to_string(), text: "can you explain that differently".to_string() },
    ]
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub async fn new(
        config: TutorConfig,
        drs: Arc<Drs>,
        cache: Arc<dyn HotCache>,
        embeddings: Arc<EmbeddingRouter>,
        llm: Arc<LlmRouter>,
        tts: Option<Arc<dyn TtsProvider>>,
        broker: Arc<BrokerHandle>,
        ingest_requests: Arc<InMemoryIngestRequests>,
        vector_index: Arc<dyn VectorIndex>,
    ) -> tutor_core::Result<Self> {
        let sessions = Arc::new(SessionManager::new(drs.clone(), cache.clone()));
        let retriever = Arc::new(HybridRetriever::new(embeddings.clone(), vector_index.clone(), drs.clone(), None));
        let intent_router = Arc::new(
            IntentRouter::new(&embeddings, seed_exemplars(), tutor_intent::default_heuristics(), tutor_intent::DEFAULT_SIMILARITY_THRESHOLD).await?,
        );
        let chat = Arc::new(ChatService::new(sessions.clone(), intent_router, embeddings.clone(), llm.clone(), retriever.clone(), drs.clone()));

        let qa_agent = tutor_orchestrator::QaAgent::new(llm.clone(), retriever.clone());
        let assessment_agent = tutor_orchestrator::AssessmentAgent::new(drs.clone());
        let orchestrator = Arc::new(Orchestrator::new(drs.clone(), cache.clone(), sessions.clone(), qa_agent, assessment_agent));

        let ingest_pipeline = Arc::new(IngestPipeline::new(embeddings.clone(), llm.clone(), vector_index.clone(), drs.clone()));

        Ok(Self {
            config,
            drs,
            cache,
            sessions,
            vector_index,
            embeddings,
            llm,
            tts,
            retriever,
            chat,
            orchestrator,
            broker,
            ingest_pipeline,
            ingest_requests,
            voice_course_hint: DashMap::new(),
            default_language: AsyncMutex::new("en".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_take_returns_the_request_once() {
        let requests = InMemoryIngestRequests::new();
        let request = IngestRequest {
            owner_id: "owner".to_string(),
            course_id: None,
            title: "Course".to_string(),
            language: "en".to_string(),
            country: "US".to_string(),
            files: vec![],
            expand_content: false,
        };
        requests.put("task-1".to_string(), request);

        assert!(requests.take("task-1").is_some());
        assert!(requests.take("task-1").is_none());
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ingest/upload", post(crate::http::ingest::upload_handler))
        .route("/tasks/{task_id}", get(crate::http::ingest::task_status_handler))
        .route("/session/check", post(crate::http::sessions::check_handler))
        .route("/session/create", post(crate::http::sessions::create_handler))
        .route("/session/end", post(crate::http::sessions::end_handler))
        .route("/session/history", post(crate::http::sessions::history_handler))
        .route("/chat", post(crate::http::chat::chat_handler))
        .route("/chat/audio", post(crate::http::chat::chat_audio_handler))
        .route("/courses", get(crate::http::courses::list_handler))
        .route("/courses/{course_id}", get(crate::http::courses::detail_handler))
        .route("/quiz/generate", post(crate::http::quiz::generate_handler))
        .route("/quiz/submit", post(crate::http::quiz::submit_handler))
        .route("/voice", get(crate::ws::voice::voice_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
