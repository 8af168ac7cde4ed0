use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use tutor_drs::types::DocumentChunk;
use tutor_drs::Drs;
use tutor_providers::router::{EmbeddingRouter, LlmRouter};
use tutor_vector::{MetadataValue, VectorIndex, VectorRecord};

use crate::chunk::chunk_pages;
use crate::curriculum::synthesise_course;
use crate::error::{IngestError, Result};
use crate::extract::{detect_file_kind, extract_text};
use crate::types::{IngestFile, IngestRequest, IngestStage, SynthesisedCourse};

/// Callback invoked at stage boundaries so the worker process (component H)
/// can turn it into a broker heartbeat (§4.2 "heartbeat carries a percent
/// and a message").
pub type ProgressFn = Arc<dyn Fn(IngestStage, u8, &str) + Send + Sync>;

/// A chunk with text and provenance, prior to the embedding it still needs.
pub struct DocumentChunkDraft {
    pub document_id: String,
    pub page: Option<i64>,
    pub char_start: i64,
    pub char_end: i64,
    pub text: String,
}

/// Outcome of a full ingest batch: the persisted course plus any per-file
/// failures that were skipped rather than aborting the run.
pub struct IngestOutcome {
    pub course_id: String,
    pub chunk_count: usize,
    pub partial_failures: Vec<(String, IngestError)>,
}

pub struct IngestPipeline {
    embeddings: Arc<EmbeddingRouter>,
    llm: Arc<LlmRouter>,
    vector_index: Arc<dyn VectorIndex>,
    drs: Arc<Drs>,
}

impl IngestPipeline {
    pub fn new(embeddings: Arc<EmbeddingRouter>, llm: Arc<LlmRouter>, vector_index: Arc<dyn VectorIndex>, drs: Arc<Drs>) -> Self {
        Self {
            embeddings,
            llm,
            vector_index,
            drs,
        }
    }

    /// Run the full seven-stage pipeline for one ingest batch (§4.3:
    /// extract, chunk, embed, index-upsert, curriculum-synthesis,
    /// content-expansion, persist). `cancel` is checked between phases so a
    /// worker can honour an external cancel request (§4.2).
    #[instrument(skip(self, request, progress, cancel), fields(title = %request.title, files = request.files.len()))]
    pub async fn run(&self, request: IngestRequest, progress: ProgressFn, cancel: CancellationToken) -> Result<IngestOutcome> {
        progress(IngestStage::Extract, IngestStage::Extract.progress_band().0, "extracting text from uploaded files");
        let (drafts, partial_failures) = self.extract_and_chunk(&request.files);

        if drafts.is_empty() {
            return Err(IngestError::EmptyDocument {
                filename: "<batch>".to_string(),
            });
        }

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        progress(IngestStage::Embed, IngestStage::Embed.progress_band().0, "embedding chunks");
        let embedded = self.embed_chunks(&drafts).await?;

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        progress(
            IngestStage::CurriculumSynthesis,
            IngestStage::CurriculumSynthesis.progress_band().0,
            "synthesising curriculum structure",
        );
        let corpus_text: String = drafts.iter().map(|d| d.text.as_str()).collect::<Vec<_>>().join("\n\n");
        let mut synthesised = synthesise_course(&self.llm, &corpus_text).await?;

        if request.expand_content {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            progress(
                IngestStage::ContentExpansion,
                IngestStage::ContentExpansion.progress_band().0,
                "expanding topic content from source grounding",
            );
            crate::expand::expand_topics(&self.llm, &mut synthesised, &drafts).await?;
        }

        if cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        progress(IngestStage::Persist, IngestStage::Persist.progress_band().0, "persisting course structure and chunks");
        let course_id = self
            .persist(&request, &synthesised, &embedded, &drafts)
            .await?;

        progress(IngestStage::Persist, 100, "ingest complete");

        Ok(IngestOutcome {
            course_id,
            chunk_count: embedded.len(),
            partial_failures,
        })
    }

    fn extract_and_chunk(&self, files: &[IngestFile]) -> (Vec<DocumentChunkDraft>, Vec<(String, IngestError)>) {
        let mut drafts = Vec::new();
        let mut failures = Vec::new();

        for file in files {
            match extract_and_chunk_one(file) {
                Ok(mut file_drafts) => drafts.append(&mut file_drafts),
                Err(e) => {
                    warn!(filename = %file.filename, error = %e, "file failed extraction, skipping");
                    failures.push((file.filename.clone(), e));
                }
            }
        }

        (drafts, failures)
    }

    async fn embed_chunks(&self, drafts: &[DocumentChunkDraft]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        self.embeddings
            .embed(&texts)
            .await
            .map_err(|e| IngestError::Embedding(e.to_string()))
    }

    async fn persist(
        &self,
        request: &IngestRequest,
        synthesised: &SynthesisedCourse,
        embeddings: &[Vec<f32>],
        drafts: &[DocumentChunkDraft],
    ) -> Result<String> {
        let course = self
            .drs
            .create_course(&synthesised.title, &synthesised.description, &request.language, &request.country, &request.owner_id)?;

        // (module_id, topic_id, title) for every persisted topic, used below
        // to place each chunk by lexical overlap (§3 chunk metadata must
        // include course/module/topic/language).
        let mut topics_for_matching: Vec<(String, String, String)> = Vec::new();

        for module in &synthesised.modules {
            let created_module = self.drs.create_module(&course.course_id, module.week, &module.title, &module.description, &module.objectives)?;

            for topic in &module.topics {
                let created_topic = self
                    .drs
                    .create_topic(&created_module.module_id, topic.order_index, &topic.title, &topic.content, topic.estimated_duration_minutes)?;
                topics_for_matching.push((created_module.module_id.clone(), created_topic.topic_id, topic.title.clone()));
            }
        }

        let collection = collection_name(&request.owner_id);
        let mut records = Vec::with_capacity(drafts.len());

        for (draft, embedding) in drafts.iter().zip(embeddings.iter()) {
            // Deterministic chunk ids from document/offset keep re-ingest
            // idempotent (§8 testable property: "idempotent re-ingest").
            let chunk_id = deterministic_chunk_id(&draft.document_id, draft.char_start, draft.char_end);
            let placement = best_matching_topic(&draft.text, &topics_for_matching);
            let (module_id, topic_id) = match &placement {
                Some((m, t)) => (Some(m.clone()), Some(t.clone())),
                None => (None, None),
            };

            let mut metadata = HashMap::new();
            metadata.insert("document_id".to_string(), MetadataValue::Str(draft.document_id.clone()));
            metadata.insert("course_id".to_string(), MetadataValue::Str(course.course_id.clone()));
            metadata.insert("language".to_string(), MetadataValue::Str(request.language.clone()));
            if let Some(module_id) = &module_id {
                metadata.insert("module_id".to_string(), MetadataValue::Str(module_id.clone()));
            }
            if let Some(topic_id) = &topic_id {
                metadata.insert("topic_id".to_string(), MetadataValue::Str(topic_id.clone()));
            }

            records.push(VectorRecord {
                id: chunk_id.clone(),
                embedding: embedding.clone(),
                text: draft.text.clone(),
                metadata,
            });

            let chunk = DocumentChunk {
                chunk_id,
                document_id: draft.document_id.clone(),
                course_id: course.course_id.clone(),
                module_id,
                topic_id,
                page: draft.page,
                char_start: draft.char_start,
                char_end: draft.char_end,
                text: draft.text.clone(),
                language: request.language.clone(),
            };
            self.drs.upsert_chunk(&chunk)?;
        }

        let upserted_count = records.len();
        self.vector_index
            .upsert(&collection, records)
            .await
            .map_err(|e| IngestError::VectorIndex(e.to_string()))?;

        let indexed_count = self
            .vector_index
            .count(&collection)
            .await
            .map_err(|e| IngestError::VectorIndex(e.to_string()))?;
        if indexed_count < upserted_count {
            warn!(collection = %collection, upserted_count, indexed_count, "vector index count below upserted count after upsert");
        }

        info!(course_id = %course.course_id, chunk_count = upserted_count, "ingest persisted");
        Ok(course.course_id)
    }
}

fn extract_and_chunk_one(file: &IngestFile) -> Result<Vec<DocumentChunkDraft>> {
    let kind = detect_file_kind(&file.filename, &file.bytes)?;
    let pages = extract_text(&file.filename, kind, &file.bytes)?;

    let document_id = Uuid::new_v5(&Uuid::NAMESPACE_URL, file.filename.as_bytes()).to_string();
    let pending = chunk_pages(&document_id, &pages);

    Ok(pending
        .into_iter()
        .map(|p| DocumentChunkDraft {
            document_id: p.document_id,
            page: p.page,
            char_start: p.char_start,
            char_end: p.char_end,
            text: p.text,
        })
        .collect())
}

/// Places a chunk under the topic whose title shares the most words with its
/// text, the same lexical-overlap technique `expand::top_k_by_overlap` uses
/// to ground topic expansion, inverted to score topics against a chunk
/// instead of drafts against a topic title. `None` when no topic title has
/// any word in common with the chunk.
fn best_matching_topic(text: &str, topics: &[(String, String, String)]) -> Option<(String, String)> {
    let lower = text.to_lowercase();
    topics
        .iter()
        .map(|(module_id, topic_id, title)| {
            let score = title
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .filter(|w| w.len() > 2 && lower.contains(w.as_str()))
                .count();
            (score, module_id, topic_id)
        })
        .filter(|(score, _, _)| *score > 0)
        .max_by_key(|(score, _, _)| *score)
        .map(|(_, module_id, topic_id)| (module_id.clone(), topic_id.clone()))
}

fn collection_name(owner_id: &str) -> String {
    format!("tutor-{owner_id}")
}

fn deterministic_chunk_id(document_id: &str, char_start: i64, char_end: i64) -> String {
    let key = format!("{document_id}:{char_start}:{char_end}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_chunk_id_is_stable_across_calls() {
        let a = deterministic_chunk_id("doc-1", 0, 100);
        let b = deterministic_chunk_id("doc-1", 0, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn deterministic_chunk_id_differs_by_offset() {
        let a = deterministic_chunk_id("doc-1", 0, 100);
        let b = deterministic_chunk_id("doc-1", 100, 200);
        assert_ne!(a, b);
    }

    #[test]
    fn extract_and_chunk_one_rejects_unknown_file_type() {
        let file = IngestFile {
            filename: "mystery.bin".to_string(),
            bytes: vec![0xff, 0xfe, 0x00, 0x01],
        };
        assert!(extract_and_chunk_one(&file).is_err());
    }

    #[test]
    fn best_matching_topic_picks_highest_word_overlap() {
        let topics = vec![
            ("mod-1".to_string(), "topic-1".to_string(), "Kalman Filters".to_string()),
            ("mod-2".to_string(), "topic-2".to_string(), "Linear Regression".to_string()),
        ];
        let placement = best_matching_topic("this section introduces the kalman filter in detail", &topics);
        assert_eq!(placement, Some(("mod-1".to_string(), "topic-1".to_string())));
    }

    #[test]
    fn best_matching_topic_is_none_without_overlap() {
        let topics = vec![("mod-1".to_string(), "topic-1".to_string(), "Kalman Filters".to_string())];
        assert_eq!(best_matching_topic("unrelated text about cooking", &topics), None);
    }

    #[test]
    fn extract_and_chunk_one_succeeds_for_plain_text() {
        let file = IngestFile {
            filename: "notes.txt".to_string(),
            bytes: b"a document with some content in it".to_vec(),
        };
        let drafts = extract_and_chunk_one(&file).unwrap();
        assert_eq!(drafts.len(), 1);
    }
}
