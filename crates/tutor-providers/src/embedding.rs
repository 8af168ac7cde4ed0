use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::error::ProviderError;

/// `embed(texts[]) -> vectors[]` (§6.1). Implementations advertise a fixed
/// model id and dimensionality and a batch size they're happy to receive.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Maximum number of texts this provider accepts per call.
    fn batch_size(&self) -> usize;

    /// Dimensionality of the vectors this provider returns. Fixed for the
    /// lifetime of the provider.
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// OpenAI-compatible `/v1/embeddings` client — also used for OpenAI-compatible
/// third-party endpoints that mirror the request/response shape.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    batch_size: usize,
    dimensions: usize,
}

impl OpenAiEmbeddingProvider {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
        batch_size: usize,
        dimensions: usize,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            model,
            batch_size,
            dimensions,
        }
    }
}

#[derive(serde::Serialize)]
struct EmbedRequestBody<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponseBody {
    data: Vec<EmbedDatum>,
}

#[derive(Deserialize)]
struct EmbedDatum {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        "openai-embedding"
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.len() > self.batch_size {
            return Err(ProviderError::Parse(format!(
                "batch of {} exceeds provider batch size {}",
                texts.len(),
                self.batch_size
            )));
        }

        debug!(count = texts.len(), model = %self.model, "requesting embeddings");

        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&EmbedRequestBody {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry_after_ms = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited { retry_after_ms });
        }
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let mut body: EmbedResponseBody = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}
