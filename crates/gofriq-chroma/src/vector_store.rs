//! Vector-store and embedder seams.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use gofriq::{Error, Result};

use crate::chunker::Chunk;

/// Metadata filters applied to a similarity search. Provided sets are
/// intersected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorFilter {
    pub group_guids: Option<Vec<Uuid>>,
    pub source_guids: Option<Vec<Uuid>>,
    pub languages: Option<Vec<String>>,
}

impl VectorFilter {
    /// Filter scoped to a set of permitted groups.
    #[must_use]
    pub fn for_groups(groups: &[Uuid]) -> Self {
        Self { group_guids: Some(groups.to_vec()), ..Self::default() }
    }
}

/// One similarity hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub document_guid: Uuid,
    pub chunk_id: String,
    pub content: String,
    /// Cosine similarity mapped to [0, 1]: `1 − distance`.
    pub score: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

/// Chunked embedding storage with cosine similarity search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Chunk, embed and upsert a document. Returns the chunk ids written.
    async fn embed_document(
        &self,
        doc_guid: Uuid,
        content: &str,
        group_guid: Uuid,
        source_guid: Uuid,
        language: &str,
        metadata: Option<&BTreeMap<String, Value>>,
    ) -> Result<Vec<String>>;

    /// Search for chunks similar to `query`, most similar first.
    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filter: &VectorFilter,
        include_content: bool,
    ) -> Result<Vec<SimilarityResult>>;

    /// Delete every chunk of a document. Returns the number removed.
    async fn delete_document(&self, doc_guid: Uuid) -> Result<usize>;

    /// Fetch a document's chunks in index order.
    async fn get_document_chunks(&self, doc_guid: Uuid) -> Result<Vec<Chunk>>;

    /// Count stored chunks, optionally for one group.
    async fn count(&self, group_guid: Option<Uuid>) -> Result<usize>;

    /// Drop everything. Test/reset tooling only.
    async fn clear(&self) -> Result<()>;

    /// Cheap probe for health checks.
    async fn verify_connectivity(&self) -> Result<()>;
}

/// Batch text embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| Error::vector("embedder returned no vector"))
    }
}

/// Cosine similarity of two vectors. Zero when either has no magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Deterministic embedder for tests and embedded mode.
///
/// Hash-derived vectors: consistent for identical text, no semantic
/// meaning. Not suitable for production search quality.
#[derive(Debug, Clone)]
pub struct DeterministicEmbedder {
    dimensions: usize,
}

impl Default for DeterministicEmbedder {
    fn default() -> Self {
        Self { dimensions: 384 }
    }
}

impl DeterministicEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let digest = Sha256::digest(text.as_bytes());
        (0..self.dimensions)
            .map(|i| {
                let byte = digest[i % digest.len()];
                (f32::from(byte) / 255.0) * 2.0 - 1.0
            })
            .collect()
    }
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Flatten metadata for chunk storage: scalars pass through, lists and
/// maps become JSON-encoded strings.
#[must_use]
pub fn flatten_metadata(metadata: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    metadata
        .iter()
        .map(|(key, value)| {
            let flat = match value {
                Value::Array(_) | Value::Object(_) => {
                    Value::from(serde_json::to_string(value).unwrap_or_default())
                }
                scalar => scalar.clone(),
            };
            (key.clone(), flat)
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_deterministic_embedder_is_stable() {
        let embedder = DeterministicEmbedder::default();
        let a = embedder.embed_query("same text").await.unwrap();
        let b = embedder.embed_query("same text").await.unwrap();
        let c = embedder.embed_query("different text").await.unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 384);
    }

    #[tokio::test]
    async fn test_batch_order_preserved() {
        let embedder = DeterministicEmbedder::new(16);
        let texts = vec!["one".to_string(), "two".to_string()];
        let vectors = embedder.embed_documents(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], embedder.embed_query("one").await.unwrap());
    }

    #[test]
    fn test_cosine_identical_is_one() {
        let v = vec![0.5, -0.25, 0.75];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_orthogonal_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-9);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_flatten_metadata() {
        let mut metadata = BTreeMap::new();
        metadata.insert("plain".to_string(), json!("value"));
        metadata.insert("count".to_string(), json!(3));
        metadata.insert("tags".to_string(), json!(["a", "b"]));
        metadata.insert("nested".to_string(), json!({"k": "v"}));

        let flat = flatten_metadata(&metadata);
        assert_eq!(flat["plain"], json!("value"));
        assert_eq!(flat["count"], json!(3));
        assert_eq!(flat["tags"], json!("[\"a\",\"b\"]"));
        assert_eq!(flat["nested"], json!("{\"k\":\"v\"}"));
    }
}
