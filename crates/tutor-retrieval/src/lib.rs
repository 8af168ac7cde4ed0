//! Hybrid retriever (component F, §4.4): dense + BM25 + RRF fusion +
//! optional cross-encoder rerank, with a degradation ladder that never
//! fails a query outright — it only returns fewer, lower-confidence chunks.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tutor_core::config::{RETRIEVAL_DENSE_K, RETRIEVAL_SPARSE_K, RETRIEVAL_TOP_R, RRF_DEFAULT_ALPHA, RRF_KAPPA};
use tutor_core::degradation::OnceFlag;
use tutor_core::TutorError;
use tutor_drs::Drs;
use tutor_providers::router::EmbeddingRouter;
use tutor_vector::{MetadataFilter, VectorIndex};

/// A chunk plus its fused relevance score, ready for prompt grounding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub course_id: String,
    pub module_id: Option<String>,
    pub topic_id: Option<String>,
    pub text: String,
    pub score: f32,
}

/// Optional filters narrowing the corpus searched (§4.4).
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    pub course_id: Option<String>,
    pub module_id: Option<String>,
    pub language: Option<String>,
}

/// Cross-encoder reranker contract. Absence (or failure) never fails the
/// query — the ladder drops to `dense only` instead (§4.4).
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, candidates: Vec<RetrievedChunk>) -> Result<Vec<RetrievedChunk>, TutorError>;
}

/// Which rung of the degradation ladder a query actually used. Surfaced for
/// observability, not returned to the end user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradationLevel {
    FullHybrid,
    DenseAndRerank,
    DenseOnly,
    Empty,
}

pub struct HybridRetriever {
    embeddings: Arc<EmbeddingRouter>,
    vector_index: Arc<dyn VectorIndex>,
    drs: Arc<Drs>,
    reranker: Option<Arc<dyn Reranker>>,
    sparse_degraded: OnceFlag,
    rerank_degraded: OnceFlag,
}

impl HybridRetriever {
    pub fn new(
        embeddings: Arc<EmbeddingRouter>,
        vector_index: Arc<dyn VectorIndex>,
        drs: Arc<Drs>,
        reranker: Option<Arc<dyn Reranker>>,
    ) -> Self {
        Self {
            embeddings,
            vector_index,
            drs,
            reranker,
            sparse_degraded: OnceFlag::new(),
            rerank_degraded: OnceFlag::new(),
        }
    }

    /// Run the full pipeline for `collection` (the tenant's vector
    /// collection, §6.3) and return the top-R chunks (§4.4).
    pub async fn retrieve(
        &self,
        collection: &str,
        query: &str,
        filter: &RetrievalFilter,
    ) -> Result<(Vec<RetrievedChunk>, DegradationLevel), TutorError> {
        let vectors = self.embeddings.embed(std::slice::from_ref(&query.to_string())).await?;
        let Some(query_vector) = vectors.into_iter().next() else {
            return Ok((Vec::new(), DegradationLevel::Empty));
        };

        let metadata_filter = build_metadata_filter(filter);
        let dense = self
            .vector_index
            .query(collection, &query_vector, RETRIEVAL_DENSE_K, &metadata_filter)
            .await?;

        if dense.is_empty() {
            return Ok((Vec::new(), DegradationLevel::Empty));
        }

        let sparse = match self
            .drs
            .search_chunks(query, filter.course_id.as_deref(), RETRIEVAL_SPARSE_K)
        {
            Ok(chunks) => {
                self.sparse_degraded.reset();
                Some(chunks)
            }
            Err(e) => {
                if self.sparse_degraded.fire() {
                    warn!(error = %e, "lexical search degraded, falling back to dense-only fusion");
                }
                None
            }
        };

        let sparse_used = sparse.is_some();
        let fused = if let Some(sparse) = sparse {
            fuse_rrf(&dense, &sparse, RRF_KAPPA, RRF_DEFAULT_ALPHA)
        } else {
            dense
                .into_iter()
                .map(|r| RetrievedChunk {
                    chunk_id: r.record.id,
                    document_id: metadata_str(&r.record.metadata, "document_id"),
                    course_id: metadata_str(&r.record.metadata, "course_id"),
                    module_id: metadata_opt_str(&r.record.metadata, "module_id"),
                    topic_id: metadata_opt_str(&r.record.metadata, "topic_id"),
                    text: r.record.text,
                    score: r.score,
                })
                .collect()
        };

        let (reranked, level) = match &self.reranker {
            Some(reranker) => match reranker.rerank(query, fused.clone()).await {
                Ok(results) => {
                    self.rerank_degraded.reset();
                    let level = if sparse_used {
                        DegradationLevel::FullHybrid
                    } else {
                        DegradationLevel::DenseAndRerank
                    };
                    (results, level)
                }
                Err(e) => {
                    if self.rerank_degraded.fire() {
                        warn!(error = %e, "reranker degraded, serving fused results unranked");
                    }
                    (fused, DegradationLevel::DenseOnly)
                }
            },
            None => (fused, DegradationLevel::DenseOnly),
        };

        let mut results = reranked;
        results.truncate(RETRIEVAL_TOP_R);
        Ok((results, level))
    }
}

fn build_metadata_filter(filter: &RetrievalFilter) -> MetadataFilter {
    let mut map = HashMap::new();
    if let Some(course_id) = &filter.course_id {
        map.insert("course_id".to_string(), tutor_vector::MetadataValue::Str(course_id.clone()));
    }
    if let Some(module_id) = &filter.module_id {
        map.insert("module_id".to_string(), tutor_vector::MetadataValue::Str(module_id.clone()));
    }
    if let Some(language) = &filter.language {
        map.insert("language".to_string(), tutor_vector::MetadataValue::Str(language.clone()));
    }
    MetadataFilter(map)
}

fn metadata_str(metadata: &HashMap<String, tutor_vector::MetadataValue>, key: &str) -> String {
    metadata_opt_str(metadata, key).unwrap_or_default()
}

fn metadata_opt_str(metadata: &HashMap<String, tutor_vector::MetadataValue>, key: &str) -> Option<String> {
    match metadata.get(key) {
        Some(tutor_vector::MetadataValue::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Reciprocal Rank Fusion (§4.4): score = Σ 1/(κ + rank) over the lists a
/// chunk appears in, weighted `alpha` for the dense leg and `1 - alpha` for
/// the sparse leg. De-duplicated by chunk id, union of both lists.
fn fuse_rrf(
    dense: &[tutor_vector::ScoredRecord],
    sparse: &[tutor_drs::types::DocumentChunk],
    kappa: f64,
    alpha: f64,
) -> Vec<RetrievedChunk> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    let mut chunks: HashMap<String, RetrievedChunk> = HashMap::new();

    for (rank, record) in dense.iter().enumerate() {
        let contribution = alpha / (kappa + rank as f64 + 1.0);
        *scores.entry(record.record.id.clone()).or_insert(0.0) += contribution;
        chunks.entry(record.record.id.clone()).or_insert_with(|| RetrievedChunk {
            chunk_id: record.record.id.clone(),
            document_id: metadata_str(&record.record.metadata, "document_id"),
            course_id: metadata_str(&record.record.metadata, "course_id"),
            module_id: metadata_opt_str(&record.record.metadata, "module_id"),
            topic_id: metadata_opt_str(&record.record.metadata, "topic_id"),
            text: record.record.text.clone(),
            score: 0.0,
        });
    }

    for (rank, chunk) in sparse.iter().enumerate() {
        let contribution = (1.0 - alpha) / (kappa + rank as f64 + 1.0);
        *scores.entry(chunk.chunk_id.clone()).or_insert(0.0) += contribution;
        chunks.entry(chunk.chunk_id.clone()).or_insert_with(|| RetrievedChunk {
            chunk_id: chunk.chunk_id.clone(),
            document_id: chunk.document_id.clone(),
            course_id: chunk.course_id.clone(),
            module_id: chunk.module_id.clone(),
            topic_id: chunk.topic_id.clone(),
            text: chunk.text.clone(),
            score: 0.0,
        });
    }

    let mut results: Vec<RetrievedChunk> = chunks
        .into_iter()
        .map(|(id, mut c)| {
            c.score = *scores.get(&id).unwrap_or(&0.0) as f32;
            c
        })
        .collect();
    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutor_vector::{MetadataValue, ScoredRecord, VectorRecord};

    fn dense_record(id: &str, score: f32) -> ScoredRecord {
        let mut metadata = HashMap::new();
        metadata.insert("document_id".to_string(), MetadataValue::Str("doc-1".into()));
        metadata.insert("course_id".to_string(), MetadataValue::Str("course-1".into()));
        ScoredRecord {
            record: VectorRecord {
                id: id.to_string(),
                embedding: vec![1.0],
                text: format!("text {id}"),
                metadata,
            },
            score,
        }
    }

    fn sparse_chunk(id: &str) -> tutor_drs::types::DocumentChunk {
        tutor_drs::types::DocumentChunk {
            chunk_id: id.to_string(),
            document_id: "doc-1".to_string(),
            course_id: "course-1".to_string(),
            module_id: None,
            topic_id: None,
            page: None,
            char_start: 0,
            char_end: 10,
            text: format!("text {id}"),
            language: "en".to_string(),
        }
    }

    #[test]
    fn fuse_rrf_favours_chunks_ranked_highly_in_both_lists() {
        let dense = vec![dense_record("a", 0.9), dense_record("b", 0.8), dense_record("c", 0.7)];
        let sparse = vec![sparse_chunk("b"), sparse_chunk("a")];

        let fused = fuse_rrf(&dense, &sparse, 60.0, 0.6);
        assert_eq!(fused[0].chunk_id, "a");
        assert!(fused.iter().any(|c| c.chunk_id == "c"));
    }

    #[test]
    fn fuse_rrf_deduplicates_by_chunk_id() {
        let dense = vec![dense_record("a", 0.9)];
        let sparse = vec![sparse_chunk("a")];
        let fused = fuse_rrf(&dense, &sparse, 60.0, 0.6);
        assert_eq!(fused.len(), 1);
    }
}
