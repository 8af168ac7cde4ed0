use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ProviderError;

#[derive(Debug, Clone)]
pub struct AudioChunk {
    pub data: Vec<u8>,
    pub seq: u64,
}

/// `synthesise_stream(text, voice, language) -> stream<audio_chunk>` (§6.1).
///
/// Cancellable mid-stream via the returned handle's token; a fresh call after
/// cancellation is how callers implement "pause/resume" (§6.1 design note).
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesise_stream(
        &self,
        text: &str,
        voice: &str,
        language: &str,
        cancel: CancellationToken,
        tx: mpsc::Sender<AudioChunk>,
    ) -> Result<(), ProviderError>;
}

/// Generic HTTP-streaming TTS client for providers that return raw audio
/// bytes over a chunked response body (most REST TTS APIs do).
pub struct HttpStreamingTtsProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    provider_name: String,
}

impl HttpStreamingTtsProvider {
    pub fn new(provider_name: impl Into<String>, api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider_name: provider_name.into(),
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl TtsProvider for HttpStreamingTtsProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn synthesise_stream(
        &self,
        text: &str,
        voice: &str,
        language: &str,
        cancel: CancellationToken,
        tx: mpsc::Sender<AudioChunk>,
    ) -> Result<(), ProviderError> {
        debug!(provider = %self.provider_name, voice, language, "starting tts stream");

        let url = format!("{}/v1/speech", self.base_url);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "text": text, "voice": voice, "language": language }))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let mut byte_stream = resp.bytes_stream();
        let mut seq = 0u64;

        loop {
            tokio::select! {
                chunk = byte_stream.next() => {
                    let Some(chunk) = chunk else { break };
                    let chunk = chunk?;
                    if tx.send(AudioChunk { data: chunk.to_vec(), seq }).await.is_err() {
                        return Err(ProviderError::Cancelled);
                    }
                    seq += 1;
                }
                _ = cancel.cancelled() => {
                    return Err(ProviderError::Cancelled);
                }
            }
        }

        Ok(())
    }
}
