//! Built-in provider registry — maps well-known provider IDs to their API
//! endpoints and default models, so operators select a provider by id in
//! config instead of hand-typing base URLs (§9 "Dynamic model client
//! selection").

/// A well-known OpenAI-compatible LLM provider.
pub struct KnownLlmProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub chat_path: &'static str,
    pub default_model: &'static str,
}

pub const KNOWN_LLM_PROVIDERS: &[KnownLlmProvider] = &[
    KnownLlmProvider {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com",
        chat_path: "/v1/chat/completions",
        default_model: "gpt-4o-mini",
    },
    KnownLlmProvider {
        id: "groq",
        name: "Groq",
        base_url: "https://api.groq.com/openai",
        chat_path: "/v1/chat/completions",
        default_model: "llama-3.3-70b-versatile",
    },
    KnownLlmProvider {
        id: "deepseek",
        name: "DeepSeek",
        base_url: "https://api.deepseek.com",
        chat_path: "/v1/chat/completions",
        default_model: "deepseek-chat",
    },
    KnownLlmProvider {
        id: "together",
        name: "Together AI",
        base_url: "https://api.together.xyz",
        chat_path: "/v1/chat/completions",
        default_model: "meta-llama/Meta-Llama-3.1-70B-Instruct-Turbo",
    },
];

/// A well-known embedding provider.
pub struct KnownEmbeddingProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub default_model: &'static str,
    pub default_dimensions: usize,
}

pub const KNOWN_EMBEDDING_PROVIDERS: &[KnownEmbeddingProvider] = &[
    KnownEmbeddingProvider {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com",
        default_model: "text-embedding-3-small",
        default_dimensions: 1536,
    },
    KnownEmbeddingProvider {
        id: "together",
        name: "Together AI",
        base_url: "https://api.together.xyz",
        default_model: "togethercomputer/m2-bert-80M-8k-retrieval",
        default_dimensions: 768,
    },
];

/// A well-known TTS provider.
pub struct KnownTtsProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
    pub default_voice: &'static str,
}

pub const KNOWN_TTS_PROVIDERS: &[KnownTtsProvider] = &[
    KnownTtsProvider {
        id: "elevenlabs",
        name: "ElevenLabs",
        base_url: "https://api.elevenlabs.io",
        default_voice: "rachel",
    },
    KnownTtsProvider {
        id: "openai",
        name: "OpenAI",
        base_url: "https://api.openai.com",
        default_voice: "alloy",
    },
];

/// A well-known STT provider.
pub struct KnownSttProvider {
    pub id: &'static str,
    pub name: &'static str,
    pub base_url: &'static str,
}

pub const KNOWN_STT_PROVIDERS: &[KnownSttProvider] = &[
    KnownSttProvider {
        id: "deepgram",
        name: "Deepgram",
        base_url: "wss://api.deepgram.com",
    },
    KnownSttProvider {
        id: "whisper",
        name: "OpenAI Whisper",
        base_url: "https://api.openai.com",
    },
];

pub fn find_llm_provider(id: &str) -> Option<&'static KnownLlmProvider> {
    KNOWN_LLM_PROVIDERS.iter().find(|p| p.id == id)
}

pub fn find_embedding_provider(id: &str) -> Option<&'static KnownEmbeddingProvider> {
    KNOWN_EMBEDDING_PROVIDERS.iter().find(|p| p.id == id)
}

pub fn find_tts_provider(id: &str) -> Option<&'static KnownTtsProvider> {
    KNOWN_TTS_PROVIDERS.iter().find(|p| p.id == id)
}

pub fn find_stt_provider(id: &str) -> Option<&'static KnownSttProvider> {
    KNOWN_STT_PROVIDERS.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_known_llm_provider() {
        assert!(find_llm_provider("groq").is_some());
        assert!(find_llm_provider("nonexistent").is_none());
    }
}
