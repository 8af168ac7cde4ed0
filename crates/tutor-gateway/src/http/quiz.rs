use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use tutor_core::TutorError;
use tutor_drs::types::{QuizQuestion, QuizType};
use tutor_protocol::http::{ChoiceDto, QuizDto, QuizGenerateRequest, QuizQuestionDto, QuizSubmitRequest, QuizSubmitResponse};
use tutor_providers::llm::{ChatMessage, CompleteOptions, Role};

use crate::app::AppState;
use crate::error::ApiError;

const QUESTIONS_PER_QUIZ: usize = 5;
const DEFAULT_PASSING_SCORE: i64 = 70;

const SYSTEM_PROMPT: &str = "You write multiple-choice quiz questions from course material. \
Given topic content, produce a JSON array of exactly 5 objects, each with fields: \
question_text, options (array of 4 strings), correct_answer (the single-letter key \
A, B, C, or D of the option at that position in the options array — never the \
option text itself), explanation. Respond with JSON only.";

#[derive(Debug, Deserialize)]
struct DraftQuestion {
    question_text: String,
    options: Vec<String>,
    correct_answer: String,
    #[serde(default)]
    explanation: Option<String>,
}

fn extract_json_array(raw: &str) -> &str {
    let start = raw.find('[');
    let end = raw.rfind(']');
    match (start, end) {
        (Some(s), Some(e)) if e >= s => &raw[s..=e],
        _ => raw,
    }
}

/// "A", "B", "C", ... for `options[index]` (§3 "single-letter key into options").
fn letter_for_index(index: usize) -> Option<String> {
    let letter = u8::try_from(index).ok().and_then(|i| i.checked_add(b'A'))?;
    if letter.is_ascii_uppercase() {
        Some((letter as char).to_string())
    } else {
        None
    }
}

/// Normalises the LLM's `correct_answer` into the single-letter key that's
/// actually persisted, rejecting anything that isn't a valid option letter.
fn normalise_correct_answer(correct_answer: &str, option_count: usize) -> Option<String> {
    let candidate = correct_answer.trim().to_uppercase();
    (0..option_count).find_map(|i| letter_for_index(i).filter(|letter| *letter == candidate))
}

pub async fn generate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuizGenerateRequest>,
) -> Result<Json<QuizDto>, ApiError> {
    let course = state
        .drs
        .get_course(&req.course_ref)?
        .ok_or_else(|| ApiError(TutorError::NotFound(format!("course {}", req.course_ref))))?;

    let modules = state.drs.list_modules(&course.course_id)?;

    let (quiz_type, module_id, content) = if let Some(week) = req.module_week {
        let module = modules
            .iter()
            .find(|m| m.week == week)
            .ok_or_else(|| ApiError(TutorError::NotFound(format!("module week {week} in course {}", course.course_id))))?;
        let topics = state.drs.list_topics(&module.module_id)?;
        let content = topics.iter().map(|t| t.content.as_str()).collect::<Vec<_>>().join("\n\n");
        (QuizType::Module, Some(module.module_id.clone()), content)
    } else {
        let mut content = String::new();
        for module in &modules {
            for topic in state.drs.list_topics(&module.module_id)? {
                content.push_str(&topic.content);
                content.push_str("\n\n");
            }
        }
        (QuizType::Course, None, content)
    };

    if content.trim().is_empty() {
        return Err(ApiError(TutorError::InvalidInput("course has no ingested content to quiz on".to_string())));
    }

    let messages = vec![
        ChatMessage {
            role: Role::System,
            content: SYSTEM_PROMPT.to_string(),
        },
        ChatMessage {
            role: Role::User,
            content,
        },
    ];
    let response = state.llm.complete(&messages, &CompleteOptions::default()).await?;
    let drafts: Vec<DraftQuestion> = serde_json::from_str(extract_json_array(&response.content))
        .map_err(|e| ApiError(TutorError::GarbageOutput(format!("quiz generation returned invalid JSON: {e}"))))?;

    if drafts.is_empty() {
        return Err(ApiError(TutorError::GarbageOutput("quiz generation returned no questions".to_string())));
    }

    let mut questions = Vec::with_capacity(QUESTIONS_PER_QUIZ.min(drafts.len()));
    for (i, d) in drafts.into_iter().take(QUESTIONS_PER_QUIZ).enumerate() {
        let correct_answer = normalise_correct_answer(&d.correct_answer, d.options.len()).ok_or_else(|| {
            ApiError(TutorError::GarbageOutput(format!(
                "quiz generation returned correct_answer {:?} that isn't a valid option letter",
                d.correct_answer
            )))
        })?;
        questions.push(QuizQuestion {
            quiz_id: String::new(),
            question_number: (i as i64) + 1,
            question_text: d.question_text,
            options: d.options,
            correct_answer,
            explanation: d.explanation,
            difficulty: None,
        });
    }

    let quiz = state.drs.create_quiz(
        &course.course_id,
        module_id.as_deref(),
        &course.title,
        quiz_type,
        DEFAULT_PASSING_SCORE,
        None,
        &questions,
    )?;
    let questions = state.drs.get_quiz_questions(&quiz.quiz_id)?;

    Ok(Json(QuizDto {
        quiz_id: quiz.quiz_id,
        questions: questions
            .into_iter()
            .map(|q| QuizQuestionDto {
                question_id: q.question_number.to_string(),
                prompt: q.question_text,
                choices: q
                    .options
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, text)| letter_for_index(i).map(|label| ChoiceDto { label, text }))
                    .collect(),
            })
            .collect(),
    }))
}

pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QuizSubmitRequest>,
) -> Result<Json<QuizSubmitResponse>, ApiError> {
    let answers: HashMap<i64, String> = req
        .answers
        .into_iter()
        .filter_map(|(k, v)| k.parse::<i64>().ok().map(|n| (n, v.trim().to_uppercase())))
        .collect();

    let questions = state.drs.get_quiz_questions(&req.quiz_id)?;
    let response = state.drs.submit_quiz_response(&req.quiz_id, &req.user_id, &answers, None)?;

    let correct = questions
        .into_iter()
        .filter(|q| {
            answers
                .get(&q.question_number)
                .is_some_and(|a| a.trim().eq_ignore_ascii_case(q.correct_answer.trim()))
        })
        .map(|q| q.question_number.to_string())
        .collect();

    Ok(Json(QuizSubmitResponse {
        score: response.score as u32,
        total: response.total_questions as u32,
        correct,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letter_for_index_follows_option_order() {
        assert_eq!(letter_for_index(0).as_deref(), Some("A"));
        assert_eq!(letter_for_index(1).as_deref(), Some("B"));
        assert_eq!(letter_for_index(3).as_deref(), Some("D"));
    }

    #[test]
    fn normalise_correct_answer_accepts_letter_case_insensitively() {
        assert_eq!(normalise_correct_answer("b", 4).as_deref(), Some("B"));
        assert_eq!(normalise_correct_answer(" C ", 4).as_deref(), Some("C"));
    }

    #[test]
    fn normalise_correct_answer_rejects_full_option_text() {
        assert_eq!(normalise_correct_answer("Paris", 4), None);
    }

    #[test]
    fn normalise_correct_answer_rejects_letter_past_option_count() {
        assert_eq!(normalise_correct_answer("D", 2), None);
    }
}
