use std::collections::HashMap;

use rusqlite::params;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{DrsError, Result};
use crate::types::{Quiz, QuizQuestion, QuizResponse, QuizType};
use crate::Drs;

impl Drs {
    /// Insert a quiz and its gapless 1..K questions in one transaction
    /// (§3 "question_number 1..K gapless").
    #[instrument(skip(self, title, questions))]
    pub fn create_quiz(
        &self,
        course_id: &str,
        module_id: Option<&str>,
        title: &str,
        quiz_type: QuizType,
        passing_score: i64,
        time_limit_minutes: Option<i64>,
        questions: &[QuizQuestion],
    ) -> Result<Quiz> {
        for (i, q) in questions.iter().enumerate() {
            if q.question_number != (i as i64) + 1 {
                return Err(DrsError::InvalidInput(
                    "quiz questions must be numbered 1..K gapless".into(),
                ));
            }
        }

        let db = self.db.lock().unwrap();
        let quiz_id = Uuid::now_v7().to_string();
        let tx = db.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO quizzes (quiz_id, course_id, module_id, title, quiz_type, passing_score, time_limit_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![quiz_id, course_id, module_id, title, quiz_type.to_string(), passing_score, time_limit_minutes],
        )?;
        for q in questions {
            let options_json = serde_json::to_string(&q.options)
                .map_err(|e| DrsError::InvalidInput(e.to_string()))?;
            tx.execute(
                "INSERT INTO quiz_questions
                 (quiz_id, question_number, question_text, options, correct_answer, explanation, difficulty)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    quiz_id,
                    q.question_number,
                    q.question_text,
                    options_json,
                    q.correct_answer,
                    q.explanation,
                    q.difficulty,
                ],
            )?;
        }
        tx.commit()?;

        Ok(Quiz {
            quiz_id,
            course_id: course_id.to_string(),
            module_id: module_id.map(str::to_string),
            title: title.to_string(),
            quiz_type,
            passing_score,
            time_limit_minutes,
        })
    }

    #[instrument(skip(self))]
    pub fn get_quiz_questions(&self, quiz_id: &str) -> Result<Vec<QuizQuestion>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT quiz_id, question_number, question_text, options, correct_answer, explanation, difficulty
             FROM quiz_questions WHERE quiz_id = ?1 ORDER BY question_number ASC",
        )?;
        let rows = stmt.query_map(params![quiz_id], row_to_question)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Score and persist a submission. Rejects answer keys that aren't a
    /// subset of the quiz's question numbers (§3 invariant).
    #[instrument(skip(self, answers))]
    pub fn submit_quiz_response(
        &self,
        quiz_id: &str,
        user_id: &str,
        answers: &HashMap<i64, String>,
        time_taken_seconds: Option<i64>,
    ) -> Result<QuizResponse> {
        let questions = self.get_quiz_questions(quiz_id)?;
        if questions.is_empty() {
            return Err(DrsError::NotFound(format!("quiz {quiz_id}")));
        }
        let valid_numbers: std::collections::HashSet<i64> =
            questions.iter().map(|q| q.question_number).collect();
        if answers.keys().any(|k| !valid_numbers.contains(k)) {
            return Err(DrsError::InvalidInput(
                "answer keys must be a subset of the quiz's question numbers".into(),
            ));
        }

        let score = questions
            .iter()
            .filter(|q| {
                answers
                    .get(&q.question_number)
                    .is_some_and(|a| a.trim().eq_ignore_ascii_case(q.correct_answer.trim()))
            })
            .count() as i64;

        let db = self.db.lock().unwrap();
        let now = chrono::Utc::now().to_rfc3339();
        let answers_json =
            serde_json::to_string(answers).map_err(|e| DrsError::InvalidInput(e.to_string()))?;
        db.execute(
            "INSERT INTO quiz_responses
             (quiz_id, user_id, answers, score, total_questions, time_taken_seconds, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![quiz_id, user_id, answers_json, score, questions.len() as i64, time_taken_seconds, now],
        )?;

        Ok(QuizResponse {
            quiz_id: quiz_id.to_string(),
            user_id: user_id.to_string(),
            answers: answers.clone(),
            score,
            total_questions: questions.len() as i64,
            time_taken_seconds,
            submitted_at: now,
        })
    }
}

fn row_to_question(row: &rusqlite::Row<'_>) -> rusqlite::Result<QuizQuestion> {
    let options_json: String = row.get(3)?;
    Ok(QuizQuestion {
        quiz_id: row.get(0)?,
        question_number: row.get(1)?,
        question_text: row.get(2)?,
        options: serde_json::from_str(&options_json).unwrap_or_default(),
        correct_answer: row.get(4)?,
        explanation: row.get(5)?,
        difficulty: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;

    fn drs() -> Drs {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        Drs::new(conn)
    }

    fn question(n: i64, correct: &str) -> QuizQuestion {
        QuizQuestion {
            quiz_id: String::new(),
            question_number: n,
            question_text: format!("question {n}"),
            options: vec!["A".into(), "B".into(), "C".into()],
            correct_answer: correct.to_string(),
            explanation: None,
            difficulty: None,
        }
    }

    #[test]
    fn submit_scores_correct_answers() {
        let drs = drs();
        let course = drs.create_course("A", "", "en", "US", "owner").unwrap();
        let quiz = drs
            .create_quiz(
                &course.course_id,
                None,
                "Quiz 1",
                QuizType::Course,
                70,
                None,
                &[question(1, "A"), question(2, "B")],
            )
            .unwrap();

        let mut answers = HashMap::new();
        answers.insert(1, "A".to_string());
        answers.insert(2, "C".to_string());

        let response = drs
            .submit_quiz_response(&quiz.quiz_id, "user-1", &answers, None)
            .unwrap();
        assert_eq!(response.score, 1);
        assert_eq!(response.total_questions, 2);
    }

    #[test]
    fn submit_scores_correct_answers_case_insensitively() {
        let drs = drs();
        let course = drs.create_course("A", "", "en", "US", "owner").unwrap();
        let quiz = drs
            .create_quiz(&course.course_id, None, "Quiz 1", QuizType::Course, 70, None, &[question(1, "A")])
            .unwrap();

        let mut answers = HashMap::new();
        answers.insert(1, "a".to_string());

        let response = drs.submit_quiz_response(&quiz.quiz_id, "user-1", &answers, None).unwrap();
        assert_eq!(response.score, 1);
    }

    #[test]
    fn submit_rejects_unknown_question_number() {
        let drs = drs();
        let course = drs.create_course("A", "", "en", "US", "owner").unwrap();
        let quiz = drs
            .create_quiz(
                &course.course_id,
                None,
                "Quiz 1",
                QuizType::Course,
                70,
                None,
                &[question(1, "A")],
            )
            .unwrap();

        let mut answers = HashMap::new();
        answers.insert(99, "A".to_string());

        assert!(drs.submit_quiz_response(&quiz.quiz_id, "user-1", &answers, None).is_err());
    }

    #[test]
    fn create_quiz_rejects_non_gapless_numbering() {
        let drs = drs();
        let course = drs.create_course("A", "", "en", "US", "owner").unwrap();
        let result = drs.create_quiz(
            &course.course_id,
            None,
            "Quiz 1",
            QuizType::Course,
            70,
            None,
            &[question(1, "A"), question(3, "B")],
        );
        assert!(result.is_err());
    }
}
