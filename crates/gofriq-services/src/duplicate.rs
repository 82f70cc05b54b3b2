//! Duplicate detection.
//!
//! Three checks run in order, short-circuiting on the first hit:
//!
//! 1. exact content hash against the group's documents in the graph,
//! 2. story fingerprint (sorted tickers + event type + quarter bucket)
//!    when extraction data is available,
//! 3. embedding similarity against the group's recent chunks, when a
//!    vector index is configured.
//!
//! Duplicates are never rejected; the ingest pipeline persists them with
//! `duplicate_of` and `duplicate_score` populated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use gofriq::hashing::{compute_content_hash, compute_story_fingerprint};
use gofriq::models::ExtractionResult;
use gofriq::Result;
use gofriq_chroma::{VectorFilter, VectorStore};
use gofriq_neo4j::GraphStore;

/// Default cosine-similarity threshold for the embedding check.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Which check fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateMethod {
    Hash,
    Fingerprint,
    Embedding,
    None,
}

/// Outcome of a duplicate check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateCheck {
    pub is_duplicate: bool,
    pub duplicate_of: Option<Uuid>,
    pub score: f64,
    pub method: DuplicateMethod,
}

impl DuplicateCheck {
    fn clean() -> Self {
        Self { is_duplicate: false, duplicate_of: None, score: 0.0, method: DuplicateMethod::None }
    }

    fn hit(original: Uuid, score: f64, method: DuplicateMethod) -> Self {
        Self { is_duplicate: true, duplicate_of: Some(original), score, method }
    }
}

/// Hash / fingerprint / embedding duplicate detector.
#[derive(Debug, Clone)]
pub struct DuplicateDetector {
    similarity_threshold: f64,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplicateDetector {
    #[must_use]
    pub fn new() -> Self {
        Self { similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD }
    }

    /// Override the embedding-similarity threshold (clamped to [0, 1]).
    #[must_use]
    pub fn with_similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    /// Run the check for a prospective document.
    pub async fn check(
        &self,
        title: &str,
        content: &str,
        group_guid: Uuid,
        graph: &dyn GraphStore,
        vector: Option<&dyn VectorStore>,
        created_at: DateTime<Utc>,
        extraction: Option<&ExtractionResult>,
    ) -> Result<DuplicateCheck> {
        // 1. Exact content hash.
        let content_hash = compute_content_hash(title, content);
        if let Some(original) = graph.find_document_by_content_hash(group_guid, &content_hash).await? {
            tracing::debug!(%original, "duplicate by content hash");
            return Ok(DuplicateCheck::hit(original, 1.0, DuplicateMethod::Hash));
        }

        // 2. Story fingerprint, when the extractor found tickers and an
        // event.
        if let Some(extraction) = extraction {
            let tickers = extraction.tickers();
            if let (false, Some(event_type)) = (tickers.is_empty(), extraction.primary_event_type())
            {
                let fingerprint = compute_story_fingerprint(&tickers, event_type, created_at);
                if let Some(original) =
                    graph.find_document_by_fingerprint(group_guid, &fingerprint).await?
                {
                    tracing::debug!(%original, "duplicate by story fingerprint");
                    return Ok(DuplicateCheck::hit(original, 1.0, DuplicateMethod::Fingerprint));
                }
            }
        }

        // 3. Embedding similarity against the group's recent chunks.
        if let Some(vector) = vector {
            let query = format!("{title} {content}");
            let hits = vector
                .search(&query, 5, &VectorFilter::for_groups(&[group_guid]), false)
                .await?;
            if let Some(best) = hits.first() {
                if best.score >= self.similarity_threshold {
                    tracing::debug!(original = %best.document_guid, score = best.score,
                        "duplicate by embedding similarity");
                    return Ok(DuplicateCheck::hit(
                        best.document_guid,
                        best.score,
                        DuplicateMethod::Embedding,
                    ));
                }
            }
        }

        Ok(DuplicateCheck::clean())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use gofriq::models::{Direction, EventDetection, ImpactTier, InstrumentMention};
    use gofriq_chroma::{DeterministicEmbedder, MemoryIndex};
    use gofriq_neo4j::{DocumentNodeSpec, MemoryGraph};

    fn node_spec(group: Uuid, hash: &str, fingerprint: Option<&str>) -> DocumentNodeSpec {
        DocumentNodeSpec {
            doc_guid: Uuid::new_v4(),
            source_guid: Uuid::new_v4(),
            group_guid: group,
            title: "Existing".to_string(),
            language: "en".to_string(),
            created_at: Utc::now(),
            impact_score: None,
            impact_tier: None,
            event_type: None,
            themes: vec![],
            regions: vec![],
            sectors: vec![],
            content_hash: Some(hash.to_string()),
            story_fingerprint: fingerprint.map(str::to_string),
            is_duplicate: false,
            metadata: BTreeMap::new(),
        }
    }

    fn earnings_extraction(ticker: &str) -> ExtractionResult {
        ExtractionResult {
            impact_score: 60.0,
            impact_tier: Some(ImpactTier::Silver),
            events: vec![EventDetection {
                event_type: "EARNINGS".to_string(),
                confidence: 0.9,
                details: None,
            }],
            instruments: vec![InstrumentMention {
                ticker: ticker.to_string(),
                name: None,
                direction: Direction::Positive,
                magnitude: 0.5,
            }],
            ..ExtractionResult::default()
        }
    }

    #[tokio::test]
    async fn test_hash_hit() {
        let graph = MemoryGraph::new();
        let group = Uuid::new_v4();
        let hash = compute_content_hash("Same Title", "Same content body.");
        let existing = node_spec(group, &hash, None);
        graph.create_document_node(&existing).await.unwrap();

        let check = DuplicateDetector::new()
            .check("Same Title", "Same content body.", group, &graph, None, Utc::now(), None)
            .await
            .unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.method, DuplicateMethod::Hash);
        assert_eq!(check.duplicate_of, Some(existing.doc_guid));
        assert!((check.score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_hash_scoped_to_group() {
        let graph = MemoryGraph::new();
        let hash = compute_content_hash("T", "C");
        graph.create_document_node(&node_spec(Uuid::new_v4(), &hash, None)).await.unwrap();

        let check = DuplicateDetector::new()
            .check("T", "C", Uuid::new_v4(), &graph, None, Utc::now(), None)
            .await
            .unwrap();
        assert!(!check.is_duplicate);
        assert_eq!(check.method, DuplicateMethod::None);
    }

    #[tokio::test]
    async fn test_fingerprint_hit_same_quarter() {
        let graph = MemoryGraph::new();
        let group = Uuid::new_v4();
        let at = Utc::now();
        let extraction = earnings_extraction("AAPL");
        let fingerprint =
            compute_story_fingerprint(&extraction.tickers(), "EARNINGS", at);
        graph
            .create_document_node(&node_spec(group, "other-hash", Some(&fingerprint)))
            .await
            .unwrap();

        let check = DuplicateDetector::new()
            .check("Rewritten Story", "Different words.", group, &graph, None, at, Some(&extraction))
            .await
            .unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.method, DuplicateMethod::Fingerprint);
    }

    #[tokio::test]
    async fn test_fingerprint_misses_across_quarters() {
        let graph = MemoryGraph::new();
        let group = Uuid::new_v4();
        let first_at = Utc::now();
        let extraction = earnings_extraction("AAPL");
        let fingerprint =
            compute_story_fingerprint(&extraction.tickers(), "EARNINGS", first_at);
        graph
            .create_document_node(&node_spec(group, "other-hash", Some(&fingerprint)))
            .await
            .unwrap();

        // 95 days later lands in a different quarter.
        let later = first_at + chrono::Duration::days(95);
        let check = DuplicateDetector::new()
            .check("Next Quarter", "New words.", group, &graph, None, later, Some(&extraction))
            .await
            .unwrap();
        assert!(!check.is_duplicate);
    }

    #[tokio::test]
    async fn test_embedding_hit() {
        let graph = MemoryGraph::new();
        let vector = MemoryIndex::new(Arc::new(DeterministicEmbedder::default()));
        let group = Uuid::new_v4();
        let original = Uuid::new_v4();
        let text = "Central bank raises rates amid inflation concern.";
        vector
            .embed_document(original, &format!("Rate Hike {text}"), group, Uuid::new_v4(), "en", None)
            .await
            .unwrap();

        let check = DuplicateDetector::new()
            .check("Rate Hike", text, group, &graph, Some(&vector), Utc::now(), None)
            .await
            .unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.method, DuplicateMethod::Embedding);
        assert_eq!(check.duplicate_of, Some(original));
        assert!(check.score >= DEFAULT_SIMILARITY_THRESHOLD);
    }

    #[tokio::test]
    async fn test_embedding_below_threshold_is_clean() {
        let graph = MemoryGraph::new();
        let vector = MemoryIndex::new(Arc::new(DeterministicEmbedder::default()));
        let group = Uuid::new_v4();
        vector
            .embed_document(
                Uuid::new_v4(),
                "Totally unrelated story about shipping lanes.",
                group,
                Uuid::new_v4(),
                "en",
                None,
            )
            .await
            .unwrap();

        let check = DuplicateDetector::new()
            .with_similarity_threshold(0.999)
            .check("Rate Hike", "Rates up again.", group, &graph, Some(&vector), Utc::now(), None)
            .await
            .unwrap();
        assert!(!check.is_duplicate);
    }
}
