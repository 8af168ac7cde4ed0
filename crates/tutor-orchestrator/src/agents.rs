//! The four sub-agents the supervisor dispatches to (§4.8).

use std::sync::Arc;

use tutor_drs::types::QuizQuestion;
use tutor_drs::Drs;
use tutor_providers::llm::{ChatMessage, CompleteOptions, Role};
use tutor_providers::router::LlmRouter;
use tutor_retrieval::{HybridRetriever, RetrievalFilter};

use crate::error::Result;

const TEACHING_CHUNK_CHARS: usize = 400;

#[derive(Debug, Clone)]
pub struct TeachingChunk {
    pub text: String,
    pub next_cursor: usize,
    pub topic_complete: bool,
}

/// Delivers `topic_content` a chunk at a time, resuming from
/// `position.cursor_chars` rather than restarting (§4.8 barge-in resume
/// semantics).
pub struct TeachingAgent;

impl TeachingAgent {
    pub fn advance(topic_content: &str, cursor_chars: usize) -> TeachingChunk {
        let total = topic_content.chars().count();
        let start = cursor_chars.min(total);
        let end = (start + TEACHING_CHUNK_CHARS).min(total);

        let text: String = topic_content.chars().skip(start).take(end - start).collect();
        TeachingChunk {
            text,
            next_cursor: end,
            topic_complete: end >= total,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QaOutcome {
    pub answer: String,
    pub source_chunk_ids: Vec<String>,
}

/// Answers an interrupting question with retrieval (§4.8 "reuses F"). The
/// embedding call lives inside `HybridRetriever::retrieve`; this agent just
/// wraps the retrieved chunks in a grounded completion.
pub struct QaAgent {
    llm: Arc<LlmRouter>,
    retriever: Arc<HybridRetriever>,
}

impl QaAgent {
    pub fn new(llm: Arc<LlmRouter>, retriever: Arc<HybridRetriever>) -> Self {
        Self { llm, retriever }
    }

    pub async fn answer(&self, collection: &str, course_id: &str, question: &str) -> Result<QaOutcome> {
        let filter = RetrievalFilter {
            course_id: Some(course_id.to_string()),
            module_id: None,
            language: None,
        };
        let (chunks, _level) = self.retriever.retrieve(collection, question, &filter).await?;

        let grounding = chunks.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let messages = vec![
            ChatMessage {
                role: Role::System,
                content: format!("Answer the student's question using only these excerpts:\n\n{grounding}"),
            },
            ChatMessage {
                role: Role::User,
                content: question.to_string(),
            },
        ];
        let response = self.llm.complete(&messages, &CompleteOptions::default()).await.map_err(crate::error::OrchestratorError::Provider)?;

        Ok(QaOutcome {
            answer: response.content,
            source_chunk_ids: chunks.into_iter().map(|c| c.chunk_id).collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum AssessmentOutcome {
    Question { question: QuizQuestion },
    Graded { correct: bool, explanation: Option<String> },
    NoQuizAvailable,
}

/// Generates or grades a quiz item, pulled from an already-authored quiz for
/// the current module (voice-driven quizzing, not quiz authoring — that's
/// the `/quiz/generate` HTTP endpoint).
pub struct AssessmentAgent {
    drs: Arc<Drs>,
}

impl AssessmentAgent {
    pub fn new(drs: Arc<Drs>) -> Self {
        Self { drs }
    }

    pub fn next_question(&self, quiz_id: &str, asked_so_far: usize) -> Result<AssessmentOutcome> {
        let questions = self.drs.get_quiz_questions(quiz_id)?;
        match questions.into_iter().nth(asked_so_far) {
            Some(question) => Ok(AssessmentOutcome::Question { question }),
            None => Ok(AssessmentOutcome::NoQuizAvailable),
        }
    }

    pub fn grade_spoken_answer(&self, question: &QuizQuestion, spoken_answer: &str) -> AssessmentOutcome {
        let normalised = spoken_answer.trim().to_uppercase();
        let correct = normalised == question.correct_answer.trim().to_uppercase();
        AssessmentOutcome::Graded {
            correct,
            explanation: question.explanation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn teaching_agent_advances_and_detects_completion() {
        let content = "a".repeat(1000);
        let first = TeachingAgent::advance(&content, 0);
        assert_eq!(first.text.len(), TEACHING_CHUNK_CHARS);
        assert!(!first.topic_complete);

        let last = TeachingAgent::advance(&content, 900);
        assert_eq!(last.next_cursor, 1000);
        assert!(last.topic_complete);
    }

    #[test]
    fn teaching_agent_resumes_from_given_cursor_not_from_zero() {
        let content = "0123456789".repeat(100);
        let chunk = TeachingAgent::advance(&content, 50);
        assert!(chunk.text.starts_with('0'));
        assert_eq!(chunk.next_cursor, 50 + TEACHING_CHUNK_CHARS);
    }

    #[test]
    fn grade_spoken_answer_is_case_insensitive() {
        let drs_conn = rusqlite::Connection::open_in_memory().unwrap();
        tutor_drs::db::init_db(&drs_conn).unwrap();
        let drs = Arc::new(Drs::new(drs_conn));
        let agent = AssessmentAgent::new(drs);

        let question = QuizQuestion {
            quiz_id: "quiz-1".to_string(),
            question_number: 1,
            question_text: "2 + 2?".to_string(),
            options: vec!["A".to_string(), "B".to_string()],
            correct_answer: "a".to_string(),
            explanation: None,
            difficulty: None,
        };
        match agent.grade_spoken_answer(&question, "A") {
            AssessmentOutcome::Graded { correct, .. } => assert!(correct),
            _ => panic!("expected Graded"),
        }
    }
}
