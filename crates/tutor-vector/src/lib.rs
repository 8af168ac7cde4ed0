//! Vector index client interface (component B, §6.1, §6.3).
//!
//! One collection per tenant; record schema
//! `{id, embedding, text, metadata: map<string, string|number>}`. This crate
//! owns the interface and an in-memory reference implementation good enough
//! for tests and small deployments; a production backend is a drop-in
//! implementor of [`VectorIndex`].

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tutor_core::TutorError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetadataValue {
    Str(String),
    Num(f64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, MetadataValue>,
}

#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: VectorRecord,
    pub score: f32,
}

/// A metadata equality filter; an empty filter matches every record.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter(pub HashMap<String, MetadataValue>);

impl MetadataFilter {
    pub fn matches(&self, record: &VectorRecord) -> bool {
        self.0
            .iter()
            .all(|(k, v)| record.metadata.get(k) == Some(v))
    }
}

/// `upsert`, `query`, `count`, `delete` (§6.1), one collection per tenant.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<(), TutorError>;

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>, TutorError>;

    async fn count(&self, collection: &str) -> Result<usize, TutorError>;

    async fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<usize, TutorError>;
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

/// Brute-force cosine-similarity index, one `Vec<VectorRecord>` per
/// collection. Adequate for tests and small tenants; swap for an ANN-backed
/// implementation of [`VectorIndex`] at scale.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    collections: DashMap<String, RwLock<Vec<VectorRecord>>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self {
            collections: DashMap::new(),
        }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, collection: &str, records: Vec<VectorRecord>) -> Result<(), TutorError> {
        let entry = self
            .collections
            .entry(collection.to_string())
            .or_insert_with(|| RwLock::new(Vec::new()));
        let mut guard = entry.write().map_err(|_| TutorError::Internal("vector index lock poisoned".into()))?;
        for record in records {
            if let Some(existing) = guard.iter_mut().find(|r| r.id == record.id) {
                *existing = record;
            } else {
                guard.push(record);
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        vector: &[f32],
        k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<ScoredRecord>, TutorError> {
        let Some(entry) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        let guard = entry.read().map_err(|_| TutorError::Internal("vector index lock poisoned".into()))?;

        let mut scored: Vec<ScoredRecord> = guard
            .iter()
            .filter(|r| filter.matches(r))
            .map(|r| ScoredRecord {
                record: r.clone(),
                score: cosine_similarity(vector, &r.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    async fn count(&self, collection: &str) -> Result<usize, TutorError> {
        Ok(self
            .collections
            .get(collection)
            .map(|e| e.read().map(|g| g.len()).unwrap_or(0))
            .unwrap_or(0))
    }

    async fn delete(&self, collection: &str, filter: &MetadataFilter) -> Result<usize, TutorError> {
        let Some(entry) = self.collections.get(collection) else {
            return Ok(0);
        };
        let mut guard = entry.write().map_err(|_| TutorError::Internal("vector index lock poisoned".into()))?;
        let before = guard.len();
        guard.retain(|r| !filter.matches(r));
        Ok(before - guard.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            text: format!("text for {id}"),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn upsert_then_query_returns_nearest_first() {
        let index = InMemoryVectorIndex::new();
        index
            .upsert(
                "tenant-a",
                vec![rec("a", vec![1.0, 0.0]), rec("b", vec![0.0, 1.0])],
            )
            .await
            .unwrap();

        let results = index
            .query("tenant-a", &[1.0, 0.0], 2, &MetadataFilter::default())
            .await
            .unwrap();

        assert_eq!(results[0].record.id, "a");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_id() {
        let index = InMemoryVectorIndex::new();
        index.upsert("t", vec![rec("a", vec![1.0, 0.0])]).await.unwrap();
        index.upsert("t", vec![rec("a", vec![0.0, 1.0])]).await.unwrap();
        assert_eq!(index.count("t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_removes_matching_records() {
        let index = InMemoryVectorIndex::new();
        index.upsert("t", vec![rec("a", vec![1.0, 0.0])]).await.unwrap();
        let mut filter = HashMap::new();
        filter.insert("id".to_string(), MetadataValue::Str("nope".to_string()));
        let removed = index.delete("t", &MetadataFilter(filter)).await.unwrap();
        assert_eq!(removed, 0);
        assert_eq!(index.count("t").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_on_unknown_collection_returns_empty() {
        let index = InMemoryVectorIndex::new();
        let results = index
            .query("missing", &[1.0, 0.0], 5, &MetadataFilter::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
