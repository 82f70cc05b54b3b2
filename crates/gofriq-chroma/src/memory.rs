//! In-memory [`VectorStore`] implementation.
//!
//! Brute-force cosine search over stored chunk embeddings. Backs embedded
//! deployments (no `GOFR_IQ_CHROMADB_HOST`) and the test suite; the data
//! model (chunk ids, flattened metadata, score = 1 − distance) matches
//! the Chroma backend exactly.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{json, Value};
use uuid::Uuid;

use gofriq::Result;

use crate::chunker::{chunk_document, Chunk, ChunkConfig};
use crate::vector_store::{
    cosine_similarity, flatten_metadata, Embedder, SimilarityResult, VectorFilter, VectorStore,
};

#[derive(Debug, Clone)]
struct StoredChunk {
    chunk_id: String,
    document_guid: Uuid,
    content: String,
    embedding: Vec<f32>,
    metadata: BTreeMap<String, Value>,
    chunk_index: usize,
    start_char: usize,
    end_char: usize,
}

/// Brute-force in-memory vector index.
pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
    chunks: RwLock<Vec<StoredChunk>>,
}

impl MemoryIndex {
    /// Index with the default chunking configuration.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self::with_config(embedder, ChunkConfig::default())
    }

    /// Index with an explicit chunking configuration.
    pub fn with_config(embedder: Arc<dyn Embedder>, chunk_config: ChunkConfig) -> Self {
        Self { embedder, chunk_config, chunks: RwLock::new(Vec::new()) }
    }

    fn matches_filter(chunk: &StoredChunk, filter: &VectorFilter) -> bool {
        if let Some(groups) = &filter.group_guids {
            let group = chunk.metadata.get("group_guid").and_then(Value::as_str);
            if !groups.iter().any(|g| Some(g.to_string().as_str()) == group) {
                return false;
            }
        }
        if let Some(sources) = &filter.source_guids {
            let source = chunk.metadata.get("source_guid").and_then(Value::as_str);
            if !sources.iter().any(|s| Some(s.to_string().as_str()) == source) {
                return false;
            }
        }
        if let Some(languages) = &filter.languages {
            let language = chunk.metadata.get("language").and_then(Value::as_str);
            if !languages.iter().any(|l| Some(l.as_str()) == language) {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl VectorStore for MemoryIndex {
    async fn embed_document(
        &self,
        doc_guid: Uuid,
        content: &str,
        group_guid: Uuid,
        source_guid: Uuid,
        language: &str,
        metadata: Option<&BTreeMap<String, Value>>,
    ) -> Result<Vec<String>> {
        let chunks = chunk_document(&doc_guid.to_string(), content, &self.chunk_config)?;
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_documents(&texts).await?;

        let mut store = self.chunks.write();
        let mut ids = Vec::with_capacity(chunks.len());
        for (chunk, embedding) in chunks.into_iter().zip(embeddings) {
            let mut chunk_meta = BTreeMap::new();
            chunk_meta.insert("document_guid".to_string(), json!(doc_guid.to_string()));
            chunk_meta.insert("group_guid".to_string(), json!(group_guid.to_string()));
            chunk_meta.insert("source_guid".to_string(), json!(source_guid.to_string()));
            chunk_meta.insert("language".to_string(), json!(language));
            chunk_meta.insert("chunk_index".to_string(), json!(chunk.chunk_index));
            chunk_meta.insert("start_char".to_string(), json!(chunk.start_char));
            chunk_meta.insert("end_char".to_string(), json!(chunk.end_char));
            if let Some(extra) = metadata {
                chunk_meta.extend(flatten_metadata(extra));
            }

            // Upsert: a re-embedded chunk id replaces the old entry.
            store.retain(|c| c.chunk_id != chunk.chunk_id);
            ids.push(chunk.chunk_id.clone());
            store.push(StoredChunk {
                chunk_id: chunk.chunk_id,
                document_guid: doc_guid,
                content: chunk.content,
                embedding,
                metadata: chunk_meta,
                chunk_index: chunk.chunk_index,
                start_char: chunk.start_char,
                end_char: chunk.end_char,
            });
        }
        Ok(ids)
    }

    async fn search(
        &self,
        query: &str,
        n_results: usize,
        filter: &VectorFilter,
        include_content: bool,
    ) -> Result<Vec<SimilarityResult>> {
        let query_embedding = self.embedder.embed_query(query).await?;
        let store = self.chunks.read();

        let mut scored: Vec<SimilarityResult> = store
            .iter()
            .filter(|chunk| Self::matches_filter(chunk, filter))
            .map(|chunk| {
                let similarity = cosine_similarity(&query_embedding, &chunk.embedding);
                SimilarityResult {
                    document_guid: chunk.document_guid,
                    chunk_id: chunk.chunk_id.clone(),
                    content: if include_content { chunk.content.clone() } else { String::new() },
                    // Cosine distance is 1 − similarity, so the reported
                    // score round-trips back to the similarity.
                    score: similarity,
                    metadata: chunk.metadata.clone(),
                }
            })
            .collect();

        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(n_results);
        Ok(scored)
    }

    async fn delete_document(&self, doc_guid: Uuid) -> Result<usize> {
        let mut store = self.chunks.write();
        let before = store.len();
        store.retain(|c| c.document_guid != doc_guid);
        Ok(before - store.len())
    }

    async fn get_document_chunks(&self, doc_guid: Uuid) -> Result<Vec<Chunk>> {
        let store = self.chunks.read();
        let mut chunks: Vec<Chunk> = store
            .iter()
            .filter(|c| c.document_guid == doc_guid)
            .map(|c| Chunk {
                chunk_id: c.chunk_id.clone(),
                document_guid: c.document_guid.to_string(),
                content: c.content.clone(),
                chunk_index: c.chunk_index,
                start_char: c.start_char,
                end_char: c.end_char,
            })
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn count(&self, group_guid: Option<Uuid>) -> Result<usize> {
        let store = self.chunks.read();
        Ok(match group_guid {
            Some(group) => {
                let group = group.to_string();
                store
                    .iter()
                    .filter(|c| {
                        c.metadata.get("group_guid").and_then(Value::as_str)
                            == Some(group.as_str())
                    })
                    .count()
            }
            None => store.len(),
        })
    }

    async fn clear(&self) -> Result<()> {
        self.chunks.write().clear();
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::vector_store::DeterministicEmbedder;

    fn index() -> MemoryIndex {
        MemoryIndex::new(Arc::new(DeterministicEmbedder::default()))
    }

    #[tokio::test]
    async fn test_embed_and_search_same_text() {
        let index = index();
        let doc = Uuid::new_v4();
        let group = Uuid::new_v4();
        let source = Uuid::new_v4();
        let content = "Central bank raises rates amid inflation pressure.";
        index.embed_document(doc, content, group, source, "en", None).await.unwrap();

        let hits = index
            .search(content, 5, &VectorFilter::for_groups(&[group]), true)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document_guid, doc);
        assert!(hits[0].score > 0.99);
        assert_eq!(hits[0].content, content);
    }

    #[tokio::test]
    async fn test_group_filter_excludes() {
        let index = index();
        let doc = Uuid::new_v4();
        let group = Uuid::new_v4();
        index
            .embed_document(doc, "some content here", group, Uuid::new_v4(), "en", None)
            .await
            .unwrap();

        let other = Uuid::new_v4();
        let hits = index
            .search("some content here", 5, &VectorFilter::for_groups(&[other]), true)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_language_filter() {
        let index = index();
        let group = Uuid::new_v4();
        index
            .embed_document(Uuid::new_v4(), "english text body", group, Uuid::new_v4(), "en", None)
            .await
            .unwrap();
        index
            .embed_document(Uuid::new_v4(), "japanese text body", group, Uuid::new_v4(), "ja", None)
            .await
            .unwrap();

        let filter = VectorFilter {
            group_guids: Some(vec![group]),
            languages: Some(vec!["ja".to_string()]),
            ..VectorFilter::default()
        };
        let hits = index.search("text body", 5, &filter, false).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].metadata["language"], json!("ja"));
        assert!(hits[0].content.is_empty());
    }

    #[tokio::test]
    async fn test_reembed_upserts() {
        let index = index();
        let doc = Uuid::new_v4();
        let group = Uuid::new_v4();
        index
            .embed_document(doc, "first version", group, Uuid::new_v4(), "en", None)
            .await
            .unwrap();
        index
            .embed_document(doc, "second version", group, Uuid::new_v4(), "en", None)
            .await
            .unwrap();

        assert_eq!(index.count(None).await.unwrap(), 1);
        let chunks = index.get_document_chunks(doc).await.unwrap();
        assert_eq!(chunks[0].content, "second version");
    }

    #[tokio::test]
    async fn test_delete_document() {
        let index = index();
        let doc = Uuid::new_v4();
        let group = Uuid::new_v4();
        index
            .embed_document(doc, "to be deleted", group, Uuid::new_v4(), "en", None)
            .await
            .unwrap();
        assert_eq!(index.delete_document(doc).await.unwrap(), 1);
        assert_eq!(index.count(None).await.unwrap(), 0);
        assert_eq!(index.delete_document(doc).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_by_group() {
        let index = index();
        let alpha = Uuid::new_v4();
        let beta = Uuid::new_v4();
        index
            .embed_document(Uuid::new_v4(), "alpha doc", alpha, Uuid::new_v4(), "en", None)
            .await
            .unwrap();
        index
            .embed_document(Uuid::new_v4(), "beta doc", beta, Uuid::new_v4(), "en", None)
            .await
            .unwrap();
        assert_eq!(index.count(Some(alpha)).await.unwrap(), 1);
        assert_eq!(index.count(None).await.unwrap(), 2);

        index.clear().await.unwrap();
        assert_eq!(index.count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_long_document_multiple_chunks() {
        let index = index();
        let doc = Uuid::new_v4();
        let content = "A sentence about markets and rates. ".repeat(60);
        index
            .embed_document(doc, &content, Uuid::new_v4(), Uuid::new_v4(), "en", None)
            .await
            .unwrap();
        let chunks = index.get_document_chunks(doc).await.unwrap();
        assert!(chunks.len() > 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert!(chunks.windows(2).all(|w| w[0].chunk_index < w[1].chunk_index));
    }
}
