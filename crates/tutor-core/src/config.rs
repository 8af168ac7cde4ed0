use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

// Timeout defaults (spec §5 "Timeouts (defaults)"). All in milliseconds
// unless the name says otherwise.
pub const EMBEDDING_BATCH_TIMEOUT_MS: u64 = 30_000;
pub const LLM_COMPLETION_TIMEOUT_MS: u64 = 60_000;
pub const TTS_CHUNK_TIMEOUT_MS: u64 = 15_000;
pub const STT_IDLE_TIMEOUT_MS: u64 = 30_000;
pub const DRS_QUERY_TIMEOUT_MS: u64 = 10_000;
pub const CACHE_OP_TIMEOUT_MS: u64 = 2_000;
pub const BROKER_CLAIM_POLL_TIMEOUT_MS: u64 = 5_000;
pub const CHAT_TURN_TIMEOUT_MS: u64 = 90_000;
pub const INGEST_TASK_TIMEOUT_MS: u64 = 90 * 60 * 1_000;

// Orchestrator resource budget (spec §4.8).
pub const BARGE_IN_STOP_BUDGET_MS: u64 = 100;
pub const TEXT_CHUNK_BUDGET_MS: u64 = 1_500;
pub const FIRST_AUDIO_CHUNK_BUDGET_MS: u64 = 3_000;

// Broker retry defaults (spec §4.1).
pub const BROKER_BACKOFF_BASE_MS: u64 = 1_000;
pub const BROKER_BACKOFF_FACTOR: u32 = 2;
pub const BROKER_BACKOFF_CAP_MS: u64 = 60_000;
pub const BROKER_BACKOFF_JITTER_PCT: f64 = 0.25;
pub const BROKER_DEFAULT_MAX_ATTEMPTS: u32 = 3;

// Retrieval defaults (spec §4.4).
pub const RETRIEVAL_TOP_R: usize = 4;
pub const RETRIEVAL_DENSE_K: usize = 10;
pub const RETRIEVAL_SPARSE_K: usize = 10;
pub const RRF_KAPPA: f64 = 60.0;
pub const RRF_DEFAULT_ALPHA: f64 = 0.6;

// Chat defaults (spec §4.7).
pub const CHAT_HISTORY_TURNS: usize = 10;

// Worker pool defaults (spec §4.2).
pub const WORKER_CONCURRENCY_PER_PROCESS: usize = 1;
pub const WORKER_MAX_TASKS_DEFAULT: u32 = 20;
pub const WORKER_RSS_SOFT_CAP_BYTES: u64 = 1_300 * 1024 * 1024;
pub const WORKER_HEARTBEAT_INTERVAL_SECS: u64 = 30;

pub const DEFAULT_PORT: u16 = 8089;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (tutor.toml + TUTOR_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TutorConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl Default for TutorConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            providers: ProvidersConfig::default(),
            worker: WorkerConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Provider selection and credentials — resolved into concrete
/// `tutor-providers` clients at startup (§6.1, §9 "Dynamic model client
/// selection").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    pub embedding: Option<EmbeddingProviderConfig>,
    pub llm: Option<LlmProviderConfig>,
    pub tts: Option<TtsProviderConfig>,
    pub stt: Option<SttProviderConfig>,
    pub reranker: Option<RerankerProviderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default = "default_embed_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embed_dims")]
    pub dimensions: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
    pub default_voice: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerProviderConfig {
    pub provider_id: String,
    pub api_key: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub process_count: usize,
    #[serde(default = "default_max_tasks")]
    pub max_tasks_per_process: u32,
    #[serde(default = "default_rss_cap")]
    pub rss_soft_cap_bytes: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            process_count: default_worker_count(),
            max_tasks_per_process: default_max_tasks(),
            rss_soft_cap_bytes: default_rss_cap(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_r")]
    pub top_r: usize,
    #[serde(default = "default_dense_k")]
    pub dense_k: usize,
    #[serde(default = "default_sparse_k")]
    pub sparse_k: usize,
    #[serde(default = "default_alpha")]
    pub alpha: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_r: default_top_r(),
            dense_k: default_dense_k(),
            sparse_k: default_sparse_k(),
            alpha: default_alpha(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/tutor.db", home)
}
fn default_embed_batch_size() -> usize {
    64
}
fn default_embed_dims() -> usize {
    1536
}
fn default_worker_count() -> usize {
    2
}
fn default_max_tasks() -> u32 {
    WORKER_MAX_TASKS_DEFAULT
}
fn default_rss_cap() -> u64 {
    WORKER_RSS_SOFT_CAP_BYTES
}
fn default_top_r() -> usize {
    RETRIEVAL_TOP_R
}
fn default_dense_k() -> usize {
    RETRIEVAL_DENSE_K
}
fn default_sparse_k() -> usize {
    RETRIEVAL_SPARSE_K
}
fn default_alpha() -> f64 {
    RRF_DEFAULT_ALPHA
}

impl TutorConfig {
    /// Load config from a TOML file with TUTOR_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.tutor/tutor.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TutorConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TUTOR_").split("_"))
            .extract()
            .map_err(|e| crate::error::TutorError::InvalidInput(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tutor/tutor.toml", home)
}
