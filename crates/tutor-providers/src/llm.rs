use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::ProviderError;
use crate::stream::{parse_sse_line, SseParsed, TextStreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, serde::Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Per-call tunables (§6.1 "options include temperature, max tokens, deadline, cancel token").
#[derive(Clone)]
pub struct CompleteOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub deadline_ms: u64,
    pub cancel: CancellationToken,
}

impl Default for CompleteOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 1024,
            deadline_ms: tutor_core::config::LLM_COMPLETION_TIMEOUT_MS,
            cancel: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
    pub stop_reason: String,
}

/// `complete(messages, options) -> text` / `complete_stream(...) -> stream<text_chunk>` (§6.1).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompleteOptions,
    ) -> Result<ChatResponse, ProviderError>;

    /// Default streaming fallback: issue a non-streaming call and replay it
    /// as a single delta. Providers with a real streaming endpoint override this.
    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompleteOptions,
        tx: mpsc::Sender<TextStreamEvent>,
    ) -> Result<(), ProviderError> {
        let resp = self.complete(messages, options).await?;
        let _ = tx
            .send(TextStreamEvent::TextDelta {
                text: resp.content,
            })
            .await;
        let _ = tx
            .send(TextStreamEvent::Done {
                model: resp.model,
                tokens_in: resp.tokens_in,
                tokens_out: resp.tokens_out,
                stop_reason: resp.stop_reason,
            })
            .await;
        Ok(())
    }
}

/// OpenAI-compatible `/v1/chat/completions` client; also serves any
/// third-party endpoint that mirrors the request/response shape (§9
/// "Dynamic model client selection").
pub struct OpenAiCompatLlmProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    chat_path: String,
    provider_name: String,
    model: String,
}

impl OpenAiCompatLlmProvider {
    pub fn new(
        provider_name: impl Into<String>,
        api_key: String,
        base_url: String,
        chat_path: String,
        model: String,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            provider_name: provider_name.into(),
            api_key,
            base_url,
            chat_path,
            model,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, self.chat_path)
    }

    fn request_body(&self, messages: &[ChatMessage], options: &CompleteOptions, stream: bool) -> serde_json::Value {
        let msgs: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role, "content": m.content }))
            .collect();
        serde_json::json!({
            "model": self.model,
            "messages": msgs,
            "max_tokens": options.max_tokens,
            "temperature": options.temperature,
            "stream": stream,
        })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[async_trait]
impl LlmProvider for OpenAiCompatLlmProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompleteOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let body = self.request_body(messages, options, false);
        debug!(model = %self.model, provider = %self.provider_name, "sending completion request");

        let deadline = tokio::time::Duration::from_millis(options.deadline_ms);
        let send = self.client.post(self.endpoint()).bearer_auth(&self.api_key).json(&body).send();

        let resp = tokio::select! {
            r = tokio::time::timeout(deadline, send) => {
                r.map_err(|_| ProviderError::Unavailable("deadline exceeded".to_string()))??
            }
            _ = options.cancel.cancelled() => return Err(ProviderError::Cancelled),
        };

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
            warn!(status, body = %message, "llm provider error");
            return Err(ProviderError::Api { status, message });
        }

        let api_resp: ApiResponse = resp.json().await.map_err(|e| ProviderError::Parse(e.to_string()))?;
        let choice = api_resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Parse("no choices in response".to_string()))?;
        let usage = api_resp.usage.unwrap_or_default();

        Ok(ChatResponse {
            content: choice.message.content.unwrap_or_default(),
            model: api_resp.model,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
            stop_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        })
    }

    async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompleteOptions,
        tx: mpsc::Sender<TextStreamEvent>,
    ) -> Result<(), ProviderError> {
        use futures_util::StreamExt;

        let body = self.request_body(messages, options, true);
        let resp = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api { status, message });
        }

        let mut byte_stream = resp.bytes_stream();
        let mut buf = String::new();
        let mut model = self.model.clone();
        let mut tokens_in = 0u32;
        let mut tokens_out = 0u32;

        loop {
            tokio::select! {
                chunk = byte_stream.next() => {
                    let Some(chunk) = chunk else { break };
                    let chunk = chunk?;
                    buf.push_str(&String::from_utf8_lossy(&chunk));

                    while let Some(pos) = buf.find('\n') {
                        let line = buf[..pos].trim_end_matches('\r').to_string();
                        buf.drain(..=pos);
                        let Some(SseParsed::Data(data)) = parse_sse_line(&line) else { continue };
                        if data == "[DONE]" {
                            let _ = tx
                                .send(TextStreamEvent::Done {
                                    model: model.clone(),
                                    tokens_in,
                                    tokens_out,
                                    stop_reason: "stop".to_string(),
                                })
                                .await;
                            return Ok(());
                        }
                        if let Ok(v) = serde_json::from_str::<serde_json::Value>(&data) {
                            if let Some(m) = v.get("model").and_then(|m| m.as_str()) {
                                model = m.to_string();
                            }
                            if let Some(delta) = v["choices"][0]["delta"]["content"].as_str() {
                                tokens_out += 1;
                                let _ = tx.send(TextStreamEvent::TextDelta { text: delta.to_string() }).await;
                            }
                        }
                    }
                }
                _ = options.cancel.cancelled() => {
                    return Err(ProviderError::Cancelled);
                }
            }
        }

        let _ = tx
            .send(TextStreamEvent::Done {
                model,
                tokens_in,
                tokens_out,
                stop_reason: "stop".to_string(),
            })
            .await;
        Ok(())
    }
}
