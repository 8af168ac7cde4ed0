//! Two-tier session manager (component I, §4.5): hot cache in front of the
//! durable record store, never the other way around — cache absence or
//! failure degrades latency, not correctness.

pub mod error;

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::warn;

use tutor_cache::HotCache;
use tutor_core::degradation::OnceFlag;
use tutor_drs::types::{Message, MessageRole, MessageType, Session};
use tutor_drs::Drs;

pub use error::{Result, SessionError};

const CACHE_TTL_SECS: u64 = 24 * 60 * 60;
const CACHE_MAX_MESSAGES: usize = 50;

#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub device_class: Option<String>,
}

/// Per-session write serialisation (§4.5 "all writes are serialised on a
/// per-session lock"); reads never take this lock.
pub struct SessionManager {
    drs: Arc<Drs>,
    cache: Arc<dyn HotCache>,
    write_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    cache_degraded: OnceFlag,
}

impl SessionManager {
    pub fn new(drs: Arc<Drs>, cache: Arc<dyn HotCache>) -> Self {
        Self {
            drs,
            cache,
            write_locks: DashMap::new(),
            cache_degraded: OnceFlag::new(),
        }
    }

    fn lock_for(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        self.write_locks.entry(session_id.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Return the user's active, unexpired session, or atomically create one
    /// (ending any stale active session in the same DRS transaction).
    pub async fn get_or_create(&self, user_id: &str, client_info: &ClientInfo) -> Result<Session> {
        if let Some(existing) = self.drs.get_active_session_for_user(user_id)? {
            if !is_expired(&existing) {
                return Ok(existing);
            }
            self.drs.end_session(&existing.session_id)?;
        }

        let session = self.drs.create_session(
            user_id,
            client_info.ip.as_deref(),
            client_info.user_agent.as_deref(),
            client_info.device_class.as_deref(),
            None,
        )?;
        Ok(session)
    }

    /// Append a turn: DRS write is authoritative, cache refresh is
    /// best-effort (§4.5 "cache failure -> log and continue").
    pub async fn append(
        &self,
        user_id: &str,
        session_id: &str,
        role: MessageRole,
        content: &str,
        message_type: MessageType,
        metadata: &HashMap<String, serde_json::Value>,
    ) -> Result<Message> {
        let lock = self.lock_for(session_id);
        let _guard = lock.lock().await;

        let message = self
            .drs
            .append_message(session_id, user_id, role, content, message_type, None, None, None, metadata)?;
        self.drs.touch_session(session_id)?;

        self.refresh_cache_after_append(session_id, &message).await;

        Ok(message)
    }

    async fn refresh_cache_after_append(&self, session_id: &str, message: &Message) {
        let key = cache_key(session_id);
        let mut cached = match self.cache.get(&key).await {
            Ok(Some(value)) => serde_json::from_value::<Vec<Message>>(value).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                if self.cache_degraded.fire() {
                    warn!(session_id, error = %e, "session cache degraded, continuing DRS-only");
                }
                return;
            }
        };

        cached.push(message.clone());
        if cached.len() > CACHE_MAX_MESSAGES {
            let overflow = cached.len() - CACHE_MAX_MESSAGES;
            cached.drain(0..overflow);
        }

        if let Ok(value) = serde_json::to_value(&cached) {
            if let Err(e) = self.cache.set_with_ttl(&key, value, CACHE_TTL_SECS).await {
                if self.cache_degraded.fire() {
                    warn!(session_id, error = %e, "session cache degraded, continuing DRS-only");
                }
                return;
            }
        }
        self.cache_degraded.reset();
    }

    /// Most recent `limit` messages, chronological order. Cache hit returns
    /// a slice; cache miss reads the DRS and repopulates up to
    /// `CACHE_MAX_MESSAGES` (§4.5).
    pub async fn history(&self, session_id: &str, limit: usize) -> Result<Vec<Message>> {
        let key = cache_key(session_id);
        match self.cache.get(&key).await {
            Ok(Some(value)) => {
                self.cache_degraded.reset();
                let cached: Vec<Message> = serde_json::from_value(value).unwrap_or_default();
                if !cached.is_empty() {
                    let start = cached.len().saturating_sub(limit);
                    return Ok(cached[start..].to_vec());
                }
            }
            Ok(None) => {}
            Err(e) => {
                if self.cache_degraded.fire() {
                    warn!(session_id, error = %e, "session cache degraded, reading DRS directly");
                }
            }
        }

        let messages = self.drs.history_for_session(session_id, CACHE_MAX_MESSAGES.max(limit))?;
        if let Ok(value) = serde_json::to_value(&messages) {
            let _ = self.cache.set_with_ttl(&key, value, CACHE_TTL_SECS).await;
        }

        let start = messages.len().saturating_sub(limit);
        Ok(messages[start..].to_vec())
    }

    pub async fn end(&self, session_id: &str) -> Result<()> {
        self.drs.end_session(session_id)?;
        let _ = self.cache.del(&cache_key(session_id)).await;
        Ok(())
    }
}

fn cache_key(session_id: &str) -> String {
    format!("session:{session_id}:messages")
}

fn is_expired(session: &Session) -> bool {
    match &session.expires_at {
        Some(expires_at) => match chrono::DateTime::parse_from_rfc3339(expires_at) {
            Ok(dt) => dt < chrono::Utc::now(),
            Err(_) => false,
        },
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_cache::InMemoryCache;
    use tutor_drs::db::init_db;

    fn manager() -> SessionManager {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        let drs = Arc::new(Drs::new(conn));
        let cache: Arc<dyn HotCache> = Arc::new(InMemoryCache::default());
        SessionManager::new(drs, cache)
    }

    #[tokio::test]
    async fn get_or_create_reuses_active_session() {
        let manager = manager();
        let info = ClientInfo::default();
        let first = manager.get_or_create("user-1", &info).await.unwrap();
        let second = manager.get_or_create("user-1", &info).await.unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn append_and_history_round_trip() {
        let manager = manager();
        let info = ClientInfo::default();
        let session = manager.get_or_create("user-1", &info).await.unwrap();

        for i in 0..3 {
            manager
                .append(
                    "user-1",
                    &session.session_id,
                    MessageRole::User,
                    &format!("message {i}"),
                    MessageType::Text,
                    &HashMap::new(),
                )
                .await
                .unwrap();
        }

        let history = manager.history(&session.session_id, 10).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].content, "message 0");
        assert_eq!(history[2].content, "message 2");
    }

    #[tokio::test]
    async fn history_respects_limit_on_cache_hit() {
        let manager = manager();
        let info = ClientInfo::default();
        let session = manager.get_or_create("user-1", &info).await.unwrap();

        for i in 0..5 {
            manager
                .append(
                    "user-1",
                    &session.session_id,
                    MessageRole::User,
                    &format!("message {i}"),
                    MessageType::Text,
                    &HashMap::new(),
                )
                .await
                .unwrap();
        }

        let history = manager.history(&session.session_id, 2).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "message 4");
    }

    #[tokio::test]
    async fn end_session_clears_cache_and_marks_inactive() {
        let manager = manager();
        let info = ClientInfo::default();
        let session = manager.get_or_create("user-1", &info).await.unwrap();
        manager.end(&session.session_id).await.unwrap();

        let reopened = manager.get_or_create("user-1", &info).await.unwrap();
        assert_ne!(reopened.session_id, session.session_id);
    }
}
