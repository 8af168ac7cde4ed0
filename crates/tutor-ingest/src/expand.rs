use std::collections::HashSet;

use tutor_providers::llm::{ChatMessage, CompleteOptions, Role};
use tutor_providers::router::LlmRouter;

use crate::error::{IngestError, Result};
use crate::pipeline::DocumentChunkDraft;
use crate::types::SynthesisedCourse;

const TOP_K_GROUNDING_CHUNKS: usize = 3;

/// Per-topic LLM expansion grounded in the source chunks lexically closest
/// to the topic (§4.3 "content-expansion (optional, per-topic LLM expansion
/// grounded in top-K retrieval)"). This runs before persist, over the
/// in-memory draft chunks, rather than the hybrid retriever — the course
/// and its vector records don't exist yet at this point in the pipeline.
pub async fn expand_topics(llm: &LlmRouter, course: &mut SynthesisedCourse, drafts: &[DocumentChunkDraft]) -> Result<()> {
    for module in &mut course.modules {
        for topic in &mut module.topics {
            let grounding = top_k_by_overlap(&topic.title, drafts, TOP_K_GROUNDING_CHUNKS);
            if grounding.is_empty() {
                continue;
            }

            let expanded = expand_one_topic(llm, &topic.title, &topic.content, &grounding).await?;
            topic.content = expanded;
        }
    }

    Ok(())
}

async fn expand_one_topic(llm: &LlmRouter, title: &str, current_content: &str, grounding: &[&str]) -> Result<String> {
    let grounding_block = grounding.join("\n---\n");
    let prompt = format!(
        "Topic: {title}\n\nCurrent outline:\n{current_content}\n\nSource excerpts:\n{grounding_block}\n\n\
         Expand the outline into a fuller topic write-up, using only the source excerpts above as grounding. \
         Respond with plain text, no headers about this prompt."
    );

    let messages = vec![
        ChatMessage {
            role: Role::System,
            content: "You expand course topic outlines into full teaching content grounded strictly in provided source excerpts.".to_string(),
        },
        ChatMessage {
            role: Role::User,
            content: prompt,
        },
    ];

    let response = llm
        .complete(&messages, &CompleteOptions::default())
        .await
        .map_err(|e| IngestError::Transient(e.to_string()))?;

    Ok(response.content)
}

/// Cheap lexical relevance: rank draft chunks by the number of title words
/// they contain. Good enough to ground expansion without needing the
/// embedding/vector stack before the course even has ids.
fn top_k_by_overlap<'a>(title: &str, drafts: &'a [DocumentChunkDraft], k: usize) -> Vec<&'a str> {
    let title_words: HashSet<String> = title.split_whitespace().map(|w| w.to_lowercase()).collect();
    if title_words.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(usize, &str)> = drafts
        .iter()
        .map(|d| {
            let text_lower = d.text.to_lowercase();
            let score = title_words.iter().filter(|w| text_lower.contains(w.as_str())).count();
            (score, d.text.as_str())
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(k).map(|(_, text)| text).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(document_id: &str, text: &str) -> DocumentChunkDraft {
        DocumentChunkDraft {
            document_id: document_id.to_string(),
            page: None,
            char_start: 0,
            char_end: text.len() as i64,
            text: text.to_string(),
        }
    }

    #[test]
    fn top_k_by_overlap_ranks_by_title_word_matches() {
        let drafts = vec![
            draft("d1", "this chunk discusses photosynthesis in depth"),
            draft("d2", "this chunk is about unrelated topics entirely"),
        ];
        let results = top_k_by_overlap("Photosynthesis", &drafts, 2);
        assert_eq!(results.len(), 1);
        assert!(results[0].contains("photosynthesis"));
    }

    #[test]
    fn top_k_by_overlap_returns_empty_for_no_matches() {
        let drafts = vec![draft("d1", "completely unrelated content")];
        let results = top_k_by_overlap("Quantum Mechanics", &drafts, 3);
        assert!(results.is_empty());
    }
}
