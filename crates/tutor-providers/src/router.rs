use tokio::sync::mpsc;
use tracing::{info, warn};
use tutor_core::degradation::OnceFlag;

use crate::embedding::EmbeddingProvider;
use crate::error::ProviderError;
use crate::llm::{ChatMessage, ChatResponse, CompleteOptions, LlmProvider};
use crate::stream::TextStreamEvent;

/// A provider plus how many times to retry it before moving to the next
/// slot in the chain (§9 "Multi-provider fallback chain").
pub struct Slot<P> {
    pub provider: P,
    pub max_retries: u32,
}

impl<P> Slot<P> {
    pub fn new(provider: P, max_retries: u32) -> Self {
        Self { provider, max_retries }
    }
}

fn retry_backoff_ms(attempt: u32) -> u64 {
    200 * (attempt as u64 + 1)
}

/// Routes embedding calls across providers in priority order with bounded
/// per-provider retries. Raises the degradation signal once if every slot
/// is exhausted.
pub struct EmbeddingRouter {
    slots: Vec<Slot<Box<dyn EmbeddingProvider>>>,
    degraded: OnceFlag,
}

impl EmbeddingRouter {
    pub fn new(slots: Vec<Slot<Box<dyn EmbeddingProvider>>>) -> Self {
        assert!(!slots.is_empty(), "EmbeddingRouter requires at least one provider slot");
        Self {
            slots,
            degraded: OnceFlag::new(),
        }
    }

    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut last_err = None;

        for slot in &self.slots {
            for attempt in 0..=slot.max_retries {
                match slot.provider.embed(texts).await {
                    Ok(vectors) => {
                        self.degraded.reset();
                        if attempt > 0 {
                            info!(provider = %slot.provider.name(), attempt, "embedding succeeded after retry");
                        }
                        return Ok(vectors);
                    }
                    Err(e) => {
                        warn!(provider = %slot.provider.name(), attempt, err = %e, "embedding provider failed");
                        let retryable = !matches!(e, ProviderError::RateLimited { .. });
                        last_err = Some(e);
                        if retryable && attempt < slot.max_retries {
                            tokio::time::sleep(tokio::time::Duration::from_millis(retry_backoff_ms(attempt))).await;
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        if self.degraded.fire() {
            warn!("embedding router exhausted all providers; degrading");
        }
        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all embedding providers failed".to_string())))
    }
}

/// Routes LLM completions across providers in priority order, mirroring
/// `EmbeddingRouter`'s retry/fallback shape.
pub struct LlmRouter {
    slots: Vec<Slot<Box<dyn LlmProvider>>>,
}

impl LlmRouter {
    pub fn new(slots: Vec<Slot<Box<dyn LlmProvider>>>) -> Self {
        assert!(!slots.is_empty(), "LlmRouter requires at least one provider slot");
        Self { slots }
    }

    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompleteOptions,
    ) -> Result<ChatResponse, ProviderError> {
        let mut last_err = None;

        for slot in &self.slots {
            for attempt in 0..=slot.max_retries {
                match slot.provider.complete(messages, options).await {
                    Ok(resp) => return Ok(resp),
                    Err(e) => {
                        warn!(provider = %slot.provider.name(), attempt, err = %e, "llm provider failed");
                        let retryable = !matches!(e, ProviderError::RateLimited { .. });
                        last_err = Some(e);
                        if retryable && attempt < slot.max_retries {
                            tokio::time::sleep(tokio::time::Duration::from_millis(retry_backoff_ms(attempt))).await;
                        } else {
                            break;
                        }
                    }
                }
            }
            info!(provider = %slot.provider.name(), "llm provider exhausted, trying next");
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all llm providers failed".to_string())))
    }

    pub async fn complete_stream(
        &self,
        messages: &[ChatMessage],
        options: &CompleteOptions,
        tx: mpsc::Sender<TextStreamEvent>,
    ) -> Result<(), ProviderError> {
        let mut last_err = None;

        for slot in &self.slots {
            for attempt in 0..=slot.max_retries {
                match slot.provider.complete_stream(messages, options, tx.clone()).await {
                    Ok(()) => return Ok(()),
                    Err(e) => {
                        warn!(provider = %slot.provider.name(), attempt, err = %e, "llm provider stream failed");
                        last_err = Some(e);
                        if attempt < slot.max_retries {
                            tokio::time::sleep(tokio::time::Duration::from_millis(retry_backoff_ms(attempt))).await;
                        }
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Unavailable("all llm providers failed".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct AlwaysFail;

    #[async_trait]
    impl EmbeddingProvider for AlwaysFail {
        fn name(&self) -> &str {
            "always-fail"
        }
        fn batch_size(&self) -> usize {
            64
        }
        fn dimensions(&self) -> usize {
            8
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Err(ProviderError::Unavailable("intentional".to_string()))
        }
    }

    struct AlwaysOk;

    #[async_trait]
    impl EmbeddingProvider for AlwaysOk {
        fn name(&self) -> &str {
            "always-ok"
        }
        fn batch_size(&self) -> usize {
            64
        }
        fn dimensions(&self) -> usize {
            8
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|_| vec![0.0; 8]).collect())
        }
    }

    #[tokio::test]
    async fn falls_back_to_second_provider() {
        let router = EmbeddingRouter::new(vec![
            Slot::new(Box::new(AlwaysFail), 0),
            Slot::new(Box::new(AlwaysOk), 0),
        ]);
        let result = router.embed(&["hello".to_string()]).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn errors_when_all_fail() {
        let router = EmbeddingRouter::new(vec![
            Slot::new(Box::new(AlwaysFail), 0),
            Slot::new(Box::new(AlwaysFail), 0),
        ]);
        let result = router.embed(&["hello".to_string()]).await;
        assert!(result.is_err());
    }
}
