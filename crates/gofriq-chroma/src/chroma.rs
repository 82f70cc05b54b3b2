//! ChromaDB server implementation of [`VectorStore`].
//!
//! Embeddings are computed client-side through the configured
//! [`Embedder`] and upserted alongside chunk text and flattened metadata.
//! The collection is created with cosine space, and scores are reported
//! as `1 − distance`.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chromadb::client::{ChromaClient, ChromaClientOptions};
use chromadb::collection::{ChromaCollection, CollectionEntries, GetOptions, QueryOptions};
use serde_json::{json, Value};
use uuid::Uuid;

use gofriq::{Error, Result};

use crate::chunker::{chunk_document, Chunk, ChunkConfig};
use crate::vector_store::{
    flatten_metadata, Embedder, SimilarityResult, VectorFilter, VectorStore,
};

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "documents";

/// ChromaDB-backed chunk index.
pub struct ChromaIndex {
    _client: ChromaClient,
    collection: ChromaCollection,
    _collection_name: String,
    embedder: Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
}

impl ChromaIndex {
    /// Connect to a ChromaDB server and open (or create) the collection.
    pub async fn connect(
        host: &str,
        port: u16,
        collection_name: &str,
        embedder: Arc<dyn Embedder>,
        chunk_config: ChunkConfig,
    ) -> Result<Self> {
        chunk_config.validate()?;
        let options = ChromaClientOptions {
            url: Some(format!("http://{host}:{port}")),
            ..Default::default()
        };
        let client = ChromaClient::new(options)
            .await
            .map_err(|e| Error::vector(format!("failed to connect to ChromaDB: {e}")))?;

        let mut metadata = serde_json::Map::new();
        metadata.insert("hnsw:space".to_string(), json!("cosine"));
        let collection = client
            .get_or_create_collection(collection_name, Some(metadata))
            .await
            .map_err(|e| Error::vector(format!("failed to open collection: {e}")))?;

        Ok(Self {
            _client: client,
            collection,
            _collection_name: collection_name.to_string(),
            embedder,
            chunk_config,
        })
    }

    fn build_where_clause(filter: &VectorFilter) -> Option<Value> {
        let mut conditions: Vec<Value> = Vec::new();
        if let Some(groups) = &filter.group_guids {
            let ids: Vec<String> = groups.iter().map(Uuid::to_string).collect();
            conditions.push(json!({"group_guid": {"$in": ids}}));
        }
        if let Some(sources) = &filter.source_guids {
            let ids: Vec<String> = sources.iter().map(Uuid::to_string).collect();
            conditions.push(json!({"source_guid": {"$in": ids}}));
        }
        if let Some(languages) = &filter.languages {
            conditions.push(json!({"language": {"$in": languages}}));
        }
        match conditions.len() {
            0 => None,
            1 => conditions.pop(),
            _ => Some(json!({"$and": conditions})),
        }
    }

    fn doc_where(doc_guid: Uuid) -> Value {
        json!({"document_guid": {"$eq": doc_guid.to_string()}})
    }
}

#[async_trait]
impl VectorStore for ChromaIndex {
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

        let ids: Vec<String> = chunks.iter().map(|c| c.chunk_id.clone()).collect();
        let metadatas: Vec<serde_json::Map<String, Value>> = chunks
            .iter()
            .map(|chunk| {
                let mut meta = serde_json::Map::new();
                meta.insert("document_guid".to_string(), json!(doc_guid.to_string()));
                meta.insert("group_guid".to_string(), json!(group_guid.to_string()));
                meta.insert("source_guid".to_string(), json!(source_guid.to_string()));
                meta.insert("language".to_string(), json!(language));
                meta.insert("chunk_index".to_string(), json!(chunk.chunk_index));
                meta.insert("start_char".to_string(), json!(chunk.start_char));
                meta.insert("end_char".to_string(), json!(chunk.end_char));
                if let Some(extra) = metadata {
                    for (key, value) in flatten_metadata(extra) {
                        meta.insert(key, value);
                    }
                }
                meta
            })
            .collect();

        let ids_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let docs_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let entries = CollectionEntries {
            ids: ids_refs,
            embeddings: Some(embeddings),
            documents: Some(docs_refs),
            metadatas: Some(metadatas),
        };

        self.collection
            .upsert(entries, None)
            .await
            .map_err(|e| Error::vector(format!("Chroma upsert failed: {e}")))?;
        tracing::debug!(doc = %doc_guid, chunks = ids.len(), "document embedded");
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

        let mut include = vec!["metadatas", "distances"];
        if include_content {
            include.push("documents");
        }
        let query_options = QueryOptions {
            query_embeddings: Some(vec![query_embedding]),
            query_texts: None,
            n_results: Some(n_results),
            where_metadata: Self::build_where_clause(filter),
            where_document: None,
            include: Some(include),
        };

        let result = self
            .collection
            .query(query_options, None)
            .await
            .map_err(|e| Error::vector(format!("Chroma query failed: {e}")))?;

        let Some(ids) = result.ids.first() else {
            return Ok(Vec::new());
        };
        let distances = result.distances.as_ref().and_then(|d| d.first());
        let metadatas = result.metadatas.as_ref().and_then(|m| m.first());
        let documents = result.documents.as_ref().and_then(|d| d.first());

        let mut hits = Vec::with_capacity(ids.len());
        for (i, chunk_id) in ids.iter().enumerate() {
            let metadata: BTreeMap<String, Value> = metadatas
                .and_then(|m| m.get(i))
                .and_then(|m| m.as_ref())
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();

            let Some(document_guid) = metadata
                .get("document_guid")
                .and_then(Value::as_str)
                .and_then(|s| s.parse().ok())
            else {
                continue;
            };

            let distance = distances.and_then(|d| d.get(i)).copied().unwrap_or(1.0);
            let content = documents
                .and_then(|d| d.get(i))
                .cloned()
                .unwrap_or_default();

            hits.push(SimilarityResult {
                document_guid,
                chunk_id: chunk_id.clone(),
                content,
                score: 1.0 - f64::from(distance),
                metadata,
            });
        }
        Ok(hits)
    }

    async fn delete_document(&self, doc_guid: Uuid) -> Result<usize> {
        let existing = self
            .collection
            .get(GetOptions {
                ids: vec![],
                limit: None,
                offset: None,
                where_metadata: Some(Self::doc_where(doc_guid)),
                where_document: None,
                include: None,
            })
            .await
            .map_err(|e| Error::vector(format!("Chroma get failed: {e}")))?;

        if existing.ids.is_empty() {
            return Ok(0);
        }
        let ids_refs: Vec<&str> = existing.ids.iter().map(String::as_str).collect();
        self.collection
            .delete(Some(ids_refs), None, None)
            .await
            .map_err(|e| Error::vector(format!("Chroma delete failed: {e}")))?;
        Ok(existing.ids.len())
    }

    async fn get_document_chunks(&self, doc_guid: Uuid) -> Result<Vec<Chunk>> {
        let result = self
            .collection
            .get(GetOptions {
                ids: vec![],
                limit: None,
                offset: None,
                where_metadata: Some(Self::doc_where(doc_guid)),
                where_document: None,
                include: Some(vec!["documents".to_string(), "metadatas".to_string()]),
            })
            .await
            .map_err(|e| Error::vector(format!("Chroma get failed: {e}")))?;

        let mut chunks = Vec::with_capacity(result.ids.len());
        for (i, chunk_id) in result.ids.iter().enumerate() {
            let metadata: HashMap<String, Value> = result
                .metadatas
                .as_ref()
                .and_then(|m| m.get(i))
                .and_then(|m| m.as_ref())
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default();
            let content = result
                .documents
                .as_ref()
                .and_then(|d| d.get(i))
                .and_then(|d| d.as_ref())
                .cloned()
                .unwrap_or_default();

            let as_usize = |key: &str| {
                metadata.get(key).and_then(Value::as_u64).unwrap_or(0) as usize
            };
            chunks.push(Chunk {
                chunk_id: chunk_id.clone(),
                document_guid: doc_guid.to_string(),
                content,
                chunk_index: as_usize("chunk_index"),
                start_char: as_usize("start_char"),
                end_char: as_usize("end_char"),
            });
        }
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn count(&self, group_guid: Option<Uuid>) -> Result<usize> {
        match group_guid {
            Some(group) => {
                let result = self
                    .collection
                    .get(GetOptions {
                        ids: vec![],
                        limit: None,
                        offset: None,
                        where_metadata: Some(
                            json!({"group_guid": {"$eq": group.to_string()}}),
                        ),
                        where_document: None,
                        include: None,
                    })
                    .await
                    .map_err(|e| Error::vector(format!("Chroma get failed: {e}")))?;
                Ok(result.ids.len())
            }
            None => self
                .collection
                .count()
                .await
                .map(|c| c as usize)
                .map_err(|e| Error::vector(format!("Chroma count failed: {e}"))),
        }
    }

    async fn clear(&self) -> Result<()> {
        let existing = self
            .collection
            .get(GetOptions {
                ids: vec![],
                limit: None,
                offset: None,
                where_metadata: None,
                where_document: None,
                include: None,
            })
            .await
            .map_err(|e| Error::vector(format!("Chroma get failed: {e}")))?;
        if existing.ids.is_empty() {
            return Ok(());
        }
        let ids_refs: Vec<&str> = existing.ids.iter().map(String::as_str).collect();
        self.collection
            .delete(Some(ids_refs), None, None)
            .await
            .map_err(|e| Error::vector(format!("Chroma delete failed: {e}")))?;
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<()> {
        self.collection
            .count()
            .await
            .map(|_| ())
            .map_err(|e| Error::vector(format!("ChromaDB unreachable: {e}")))
    }
}
