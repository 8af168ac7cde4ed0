//! Chat service (component J, §4.7): one pipeline per user turn — resolve
//! session, fetch context, classify intent, branch, guard against garbage
//! output, persist both turns.

pub mod error;
pub mod garbage;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use tutor_core::config::{CHAT_HISTORY_TURNS, CHAT_TURN_TIMEOUT_MS};
use tutor_drs::types::{Message, MessageRole, MessageType};
use tutor_drs::Drs;
use tutor_intent::IntentRouter;
use tutor_providers::llm::{ChatMessage, CompleteOptions, Role};
use tutor_providers::router::{EmbeddingRouter, LlmRouter};
use tutor_retrieval::{HybridRetriever, RetrievalFilter};
use tutor_sessions::{ClientInfo, SessionManager};

pub use error::{ChatError, Result};

const GREETING_LABEL: &str = "greeting";
const GENERAL_QUESTION_LABEL: &str = "general_question";
const COURSE_QUERY_LABEL: &str = "course_query";

const SYSTEM_PROMPT: &str = "You are a patient, encouraging tutor. Answer clearly and concisely.";

#[derive(Debug, Clone)]
pub struct Source {
    pub chunk_id: String,
    pub document_id: String,
    pub score: f32,
}

#[derive(Debug, Clone)]
pub struct ChatTurnResult {
    pub answer: String,
    pub session_id: String,
    pub route_label: String,
    pub confidence: f32,
    pub sources: Vec<Source>,
}

pub struct ChatService {
    sessions: Arc<SessionManager>,
    intent_router: Arc<IntentRouter>,
    embeddings: Arc<EmbeddingRouter>,
    llm: Arc<LlmRouter>,
    retriever: Arc<HybridRetriever>,
    drs: Arc<Drs>,
    turn_timeout_ms: u64,
}

impl ChatService {
    pub fn new(
        sessions: Arc<SessionManager>,
        intent_router: Arc<IntentRouter>,
        embeddings: Arc<EmbeddingRouter>,
        llm: Arc<LlmRouter>,
        retriever: Arc<HybridRetriever>,
        drs: Arc<Drs>,
    ) -> Self {
        Self {
            sessions,
            intent_router,
            embeddings,
            llm,
            retriever,
            drs,
            turn_timeout_ms: CHAT_TURN_TIMEOUT_MS,
        }
    }

    /// Run one full turn (§4.7 steps 1-7). The end-to-end budget is a single
    /// deadline; exceeding it surfaces as `ChatError::Timeout` rather than a
    /// partial answer. `course_id`, when given, sets the session's current
    /// course before routing so a `course_query` classification has a course
    /// to retrieve against (§4.7 step 4).
    pub async fn chat(&self, user_id: &str, message: &str, client_info: &ClientInfo, course_id: Option<&str>) -> Result<ChatTurnResult> {
        let deadline = tokio::time::Duration::from_millis(self.turn_timeout_ms);
        match tokio::time::timeout(deadline, self.chat_inner(user_id, message, client_info, course_id)).await {
            Ok(result) => result,
            Err(_) => Err(ChatError::Timeout),
        }
    }

    async fn chat_inner(&self, user_id: &str, message: &str, client_info: &ClientInfo, course_id: Option<&str>) -> Result<ChatTurnResult> {
        let session = self.sessions.get_or_create(user_id, client_info).await?;

        let current_course_id = match course_id {
            Some(id) => {
                self.drs.set_current_course(&session.session_id, Some(id))?;
                Some(id.to_string())
            }
            None => session.current_course_id.clone(),
        };

        let history = self.sessions.history(&session.session_id, CHAT_HISTORY_TURNS * 2).await?;

        let query_vector = self
            .embeddings
            .embed(std::slice::from_ref(&message.to_string()))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();

        let classification = self.intent_router.classify(&query_vector, message);

        self.sessions
            .append(
                user_id,
                &session.session_id,
                MessageRole::User,
                message,
                MessageType::Text,
                &HashMap::new(),
            )
            .await?;

        let (answer, route_label, confidence, sources) = self.answer_for_label(&session.session_id, &current_course_id, message, &history, &classification).await?;

        self.sessions
            .append(
                user_id,
                &session.session_id,
                MessageRole::Assistant,
                &answer,
                MessageType::Text,
                &HashMap::new(),
            )
            .await?;

        Ok(ChatTurnResult {
            answer,
            session_id: session.session_id,
            route_label,
            confidence,
            sources,
        })
    }

    async fn answer_for_label(
        &self,
        session_id: &str,
        current_course_id: &Option<String>,
        message: &str,
        history: &[Message],
        classification: &tutor_intent::IntentResult,
    ) -> Result<(String, String, f32, Vec<Source>)> {
        match classification.label.as_str() {
            GREETING_LABEL => Ok((precanned_greeting(), GREETING_LABEL.to_string(), classification.confidence, Vec::new())),
            COURSE_QUERY_LABEL => {
                let (answer, sources) = self.answer_course_query(current_course_id, message, history).await?;
                if sources.is_empty() || garbage::is_garbage(&answer) {
                    warn!(session_id, "course_query produced no grounding or garbage output, downgrading to general_question");
                    let retried = self.answer_general(message, history).await?;
                    if garbage::is_garbage(&retried) {
                        return Ok((fallback_message(), GENERAL_QUESTION_LABEL.to_string(), 0.0, Vec::new()));
                    }
                    Ok((retried, GENERAL_QUESTION_LABEL.to_string(), 0.0, Vec::new()))
                } else {
                    Ok((answer, COURSE_QUERY_LABEL.to_string(), classification.confidence, sources))
                }
            }
            _ => {
                let answer = self.answer_general(message, history).await?;
                if garbage::is_garbage(&answer) {
                    warn!(session_id, "general_question produced garbage output, retrying once");
                    let retried = self.answer_general(message, history).await?;
                    if garbage::is_garbage(&retried) {
                        return Ok((fallback_message(), GENERAL_QUESTION_LABEL.to_string(), 0.0, Vec::new()));
                    }
                    return Ok((retried, GENERAL_QUESTION_LABEL.to_string(), classification.confidence, Vec::new()));
                }
                Ok((answer, GENERAL_QUESTION_LABEL.to_string(), classification.confidence, Vec::new()))
            }
        }
    }

    async fn answer_general(&self, message: &str, history: &[Message]) -> Result<String> {
        let messages = build_transcript(history, message, None);
        let response = self
            .llm
            .complete(&messages, &CompleteOptions::default())
            .await
            .map_err(ChatError::Provider)?;
        Ok(response.content)
    }

    async fn answer_course_query(&self, current_course_id: &Option<String>, message: &str, history: &[Message]) -> Result<(String, Vec<Source>)> {
        let Some(course_id) = current_course_id else {
            return Ok((String::new(), Vec::new()));
        };
        let Some(course) = self.drs.get_course(course_id)? else {
            return Ok((String::new(), Vec::new()));
        };

        let collection = format!("tutor-{}", course.owner_id);
        let filter = RetrievalFilter {
            course_id: Some(course_id.clone()),
            module_id: None,
            language: Some(course.language.clone()),
        };

        let (chunks, _level) = self.retriever.retrieve(&collection, message, &filter).await?;

        if chunks.is_empty() {
            return Ok((String::new(), Vec::new()));
        }

        let grounding = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c.text))
            .collect::<Vec<_>>()
            .join("\n\n");

        let messages = build_transcript(history, message, Some(&grounding));
        let response = self
            .llm
            .complete(&messages, &CompleteOptions::default())
            .await
            .map_err(ChatError::Provider)?;

        let sources = chunks
            .into_iter()
            .map(|c| Source {
                chunk_id: c.chunk_id,
                document_id: c.document_id,
                score: c.score,
            })
            .collect();

        Ok((response.content, sources))
    }
}

fn build_transcript(history: &[Message], user_message: &str, grounding: Option<&str>) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    let system_content = match grounding {
        Some(g) => format!("{SYSTEM_PROMPT}\n\nGround your answer in these excerpts, and cite them as [n]:\n\n{g}"),
        None => SYSTEM_PROMPT.to_string(),
    };
    messages.push(ChatMessage {
        role: Role::System,
        content: system_content,
    });

    for m in history {
        let role = match m.role {
            MessageRole::User => Role::User,
            MessageRole::Assistant => Role::Assistant,
            MessageRole::System => Role::System,
        };
        messages.push(ChatMessage {
            role,
            content: m.content.clone(),
        });
    }

    messages.push(ChatMessage {
        role: Role::User,
        content: user_message.to_string(),
    });

    messages
}

fn precanned_greeting() -> String {
    "Hello! I'm ready to help you study. What would you like to work on?".to_string()
}

fn fallback_message() -> String {
    "Sorry, I wasn't able to put together a good answer to that. Could you rephrase your question?".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_transcript_includes_grounding_in_system_message() {
        let messages = build_transcript(&[], "what is X?", Some("excerpt one"));
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.contains("excerpt one"));
        assert_eq!(messages.last().unwrap().content, "what is X?");
    }

    #[test]
    fn build_transcript_preserves_history_order() {
        let history = vec![
            Message {
                id: 1,
                session_id: "s".to_string(),
                user_id: "u".to_string(),
                role: MessageRole::User,
                content: "first".to_string(),
                message_type: MessageType::Text,
                course_id: None,
                module_id: None,
                topic_id: None,
                metadata: HashMap::new(),
                created_at: "now".to_string(),
            },
            Message {
                id: 2,
                session_id: "s".to_string(),
                user_id: "u".to_string(),
                role: MessageRole::Assistant,
                content: "second".to_string(),
                message_type: MessageType::Text,
                course_id: None,
                module_id: None,
                topic_id: None,
                metadata: HashMap::new(),
                created_at: "now".to_string(),
            },
        ];
        let messages = build_transcript(&history, "third", None);
        assert_eq!(messages[1].content, "first");
        assert_eq!(messages[2].content, "second");
        assert_eq!(messages[3].content, "third");
    }
}
