//! Embedding-nearest-neighbour intent router (component K, §4.6).
//!
//! Exemplars are embedded once at startup; classification at request time is
//! pure cosine similarity plus a keyword fallback, never another LLM or
//! embedding call, which is what keeps it inside the sub-100ms budget.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use tutor_core::TutorError;
use tutor_providers::router::EmbeddingRouter;

pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.30;
pub const FALLBACK_LABEL: &str = "general_question";

/// One labelled exemplar utterance, pre-embedding.
#[derive(Debug, Clone)]
pub struct Exemplar {
    pub label: String,
    pub text: String,
}

struct EmbeddedExemplar {
    label: String,
    vector: Vec<f32>,
}

/// A keyword/length heuristic tried when nothing clears the embedding
/// similarity threshold (§4.6 "rule-based classification").
#[derive(Debug, Clone)]
pub struct HeuristicRule {
    pub label: String,
    pub keywords: Vec<String>,
    pub max_word_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub label: String,
    pub confidence: f32,
    pub latency_ms: u64,
}

pub struct IntentRouter {
    exemplars: Vec<EmbeddedExemplar>,
    heuristics: Vec<HeuristicRule>,
    threshold: f32,
}

impl IntentRouter {
    /// Embed every exemplar once (§4.6 "exemplars are embedded once at
    /// startup using the same embedding client used for retrieval").
    pub async fn new(embeddings: &EmbeddingRouter, exemplars: Vec<Exemplar>, heuristics: Vec<HeuristicRule>, threshold: f32) -> Result<Self, TutorError> {
        let texts: Vec<String> = exemplars.iter().map(|e| e.text.clone()).collect();
        let vectors = embeddings.embed(&texts).await?;

        let embedded = exemplars
            .into_iter()
            .zip(vectors)
            .map(|(exemplar, vector)| EmbeddedExemplar {
                label: exemplar.label,
                vector,
            })
            .collect();

        Ok(Self {
            exemplars: embedded,
            heuristics,
            threshold,
        })
    }

    /// Classify `query_vector` (already embedded by the caller, since the
    /// chat service needs that same embedding for other purposes too) into
    /// `(label, confidence, latency_ms)` (§4.6).
    #[instrument(skip(self, query_vector, raw_text))]
    pub fn classify(&self, query_vector: &[f32], raw_text: &str) -> IntentResult {
        let start = Instant::now();

        if let Some((label, score)) = self.nearest_exemplar(query_vector) {
            if score >= self.threshold {
                return IntentResult {
                    label,
                    confidence: score,
                    latency_ms: elapsed_ms(start),
                };
            }
        }

        if let Some(label) = self.match_heuristic(raw_text) {
            return IntentResult {
                label,
                confidence: 0.0,
                latency_ms: elapsed_ms(start),
            };
        }

        IntentResult {
            label: FALLBACK_LABEL.to_string(),
            confidence: 0.0,
            latency_ms: elapsed_ms(start),
        }
    }

    fn nearest_exemplar(&self, query_vector: &[f32]) -> Option<(String, f32)> {
        self.exemplars
            .iter()
            .map(|e| (e.label.clone(), cosine_similarity(query_vector, &e.vector)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
    }

    fn match_heuristic(&self, raw_text: &str) -> Option<String> {
        let lower = raw_text.to_lowercase();
        let word_count = raw_text.split_whitespace().count();

        for rule in &self.heuristics {
            let keyword_hit = rule.keywords.iter().any(|kw| lower.contains(kw.as_str()));
            let length_hit = rule.max_word_count.map(|max| word_count <= max).unwrap_or(false);
            if keyword_hit || length_hit {
                return Some(rule.label.clone());
            }
        }
        None
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// A reasonable default label set (§4.6 "example default labels:
/// greeting, general_question, course_query").
pub fn default_heuristics() -> Vec<HeuristicRule> {
    vec![
        HeuristicRule {
            label: "greeting".to_string(),
            keywords: vec!["hello".to_string(), "hi ".to_string(), "hey".to_string(), "good morning".to_string()],
            max_word_count: Some(3),
        },
        HeuristicRule {
            label: "course_query".to_string(),
            keywords: vec!["module".to_string(), "topic".to_string(), "course".to_string(), "quiz".to_string()],
            max_word_count: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router_with_exemplars(exemplars: Vec<(&str, Vec<f32>)>, heuristics: Vec<HeuristicRule>, threshold: f32) -> IntentRouter {
        IntentRouter {
            exemplars: exemplars
                .into_iter()
                .map(|(label, vector)| EmbeddedExemplar {
                    label: label.to_string(),
                    vector,
                })
                .collect(),
            heuristics,
            threshold,
        }
    }

    #[test]
    fn classify_picks_nearest_exemplar_above_threshold() {
        let router = router_with_exemplars(vec![("greeting", vec![1.0, 0.0]), ("course_query", vec![0.0, 1.0])], vec![], 0.30);
        let result = router.classify(&[0.9, 0.1], "hi there");
        assert_eq!(result.label, "greeting");
        assert!(result.confidence >= 0.30);
    }

    #[test]
    fn classify_falls_back_to_heuristic_below_threshold() {
        let router = router_with_exemplars(vec![("greeting", vec![1.0, 0.0])], default_heuristics(), 0.99);
        let result = router.classify(&[0.1, 0.9], "tell me about module 3");
        assert_eq!(result.label, "course_query");
    }

    #[test]
    fn classify_falls_back_to_general_question_when_nothing_matches() {
        let router = router_with_exemplars(vec![("greeting", vec![1.0, 0.0])], default_heuristics(), 0.99);
        let result = router.classify(&[0.1, 0.9], "what is the meaning of life in great detail");
        assert_eq!(result.label, FALLBACK_LABEL);
    }

    #[test]
    fn cosine_similarity_is_one_for_identical_vectors() {
        assert!((cosine_similarity(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-6);
    }
}
