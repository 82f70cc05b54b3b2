//! Document ingestion pipeline.
//!
//! Order of operations:
//!
//! 1. validate the source (exists, active, owned by the write group),
//! 2. validate word count,
//! 3. resolve language (caller-provided or detected),
//! 4. run extraction when a language model is configured (failures
//!    degrade: the document is kept without impact data or edges),
//! 5. duplicate check (hash → fingerprint → embedding),
//! 6. persist the canonical file — the commit point,
//! 7. index: vector first, then graph; entity edges only for
//!    non-duplicates and only through resolved aliases,
//! 8. audit.
//!
//! Failures after the commit point roll back with compensating deletes in
//! reverse order (vector, graph, file) and surface as `INGEST_ERROR`.
//! Extraction runs before the duplicate check so the story fingerprint
//! can participate in deduplication.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use gofriq::hashing::{compute_content_hash, compute_story_fingerprint};
use gofriq::language::LanguageDetector;
use gofriq::models::{validate_word_count, Document, ExtractionResult, ImpactTier, MAX_WORD_COUNT};
use gofriq::{Error, Result};
use gofriq_chroma::VectorStore;
use gofriq_neo4j::{AliasResolver, DocumentNodeSpec, GraphStore, NodeLabel};
use gofriq_openrouter::ExtractionService;
use gofriq_store::{AuditLog, DocumentStore, SourceRegistry};

use crate::duplicate::{DuplicateCheck, DuplicateDetector};

/// Ingest input.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub title: String,
    pub content: String,
    pub source_guid: Uuid,
    pub group_guid: Uuid,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, Value>>,
}

/// Outcome classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Duplicate,
    Failed,
}

/// Ingest outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResult {
    pub doc_guid: Uuid,
    pub status: IngestStatus,
    pub language: String,
    pub word_count: usize,
    #[serde(default)]
    pub duplicate_of: Option<Uuid>,
}

/// Dry-run outcome for the `validate_document` tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub source_valid: bool,
    pub word_count_valid: bool,
    pub word_count: usize,
    pub language: String,
    pub is_duplicate: bool,
    pub issues: Vec<String>,
}

/// What still has to be undone if a later step fails.
enum RollbackStep {
    Vector(Uuid),
    GraphNode(Uuid),
    File(Uuid, Uuid),
}

/// Orchestrates the ingest pipeline.
pub struct IngestService {
    store: Arc<DocumentStore>,
    registry: Arc<SourceRegistry>,
    graph: Arc<dyn GraphStore>,
    vector: Arc<dyn VectorStore>,
    audit: Arc<AuditLog>,
    aliases: Arc<AliasResolver>,
    extraction: Option<Arc<ExtractionService>>,
    language_detector: LanguageDetector,
    duplicate_detector: DuplicateDetector,
}

impl IngestService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<DocumentStore>,
        registry: Arc<SourceRegistry>,
        graph: Arc<dyn GraphStore>,
        vector: Arc<dyn VectorStore>,
        audit: Arc<AuditLog>,
        aliases: Arc<AliasResolver>,
        extraction: Option<Arc<ExtractionService>>,
    ) -> Self {
        Self {
            store,
            registry,
            graph,
            vector,
            audit,
            aliases,
            extraction,
            language_detector: LanguageDetector::new(),
            duplicate_detector: DuplicateDetector::new(),
        }
    }

    /// Override the duplicate detector (custom thresholds).
    #[must_use]
    pub fn with_duplicate_detector(mut self, detector: DuplicateDetector) -> Self {
        self.duplicate_detector = detector;
        self
    }

    fn validate_source(&self, request: &IngestRequest) -> Result<String> {
        let source = self.registry.get(request.source_guid, None)?;
        if !source.active {
            return Err(Error::InvalidSource(format!(
                "source {} is inactive",
                request.source_guid
            )));
        }
        if source.group_guid != request.group_guid {
            return Err(Error::InvalidSource(format!(
                "source {} belongs to group {}, not {}",
                request.source_guid, source.group_guid, request.group_guid
            )));
        }
        Ok(source.name)
    }

    fn resolve_language(&self, request: &IngestRequest) -> (String, bool) {
        match &request.language {
            Some(language) if !language.trim().is_empty() => {
                (gofriq::language::canonical_code(language), false)
            }
            _ => {
                let detected = self
                    .language_detector
                    .detect_from_title_and_content(&request.title, &request.content);
                (detected.language, true)
            }
        }
    }

    async fn run_extraction(
        &self,
        request: &IngestRequest,
        source_name: &str,
    ) -> Option<ExtractionResult> {
        let service = self.extraction.as_ref()?;
        match service
            .extract(&request.title, &request.content, Some(source_name), None)
            .await
        {
            Ok(result) => Some(result),
            Err(Error::ExtractionParse(reason)) => {
                // The document is still worth keeping; it just loses
                // impact data and entity edges.
                tracing::warn!(reason, "extraction returned malformed JSON; continuing without it");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "extraction unavailable; continuing without it");
                None
            }
        }
    }

    async fn rollback(&self, steps: Vec<RollbackStep>) {
        for step in steps.into_iter().rev() {
            let outcome = match step {
                RollbackStep::Vector(doc) => {
                    self.vector.delete_document(doc).await.map(|_| ())
                }
                RollbackStep::GraphNode(doc) => self
                    .graph
                    .delete_node(NodeLabel::Document, &doc.to_string())
                    .await
                    .map(|_| ()),
                RollbackStep::File(doc, group) => self.store.delete(doc, group),
            };
            if let Err(e) = outcome {
                tracing::error!(error = %e, "rollback step failed; manual cleanup may be needed");
            }
        }
    }

    /// Ingest one document.
    ///
    /// # Errors
    ///
    /// Validation failures (`INVALID_SOURCE`, `SOURCE_NOT_FOUND`,
    /// `WORD_COUNT_EXCEEDED`, `VALIDATION_ERROR`) abort before anything is
    /// written. Failures after the commit point roll all three backends
    /// back and surface as [`Error::Ingest`].
    pub async fn ingest(
        &self,
        request: IngestRequest,
        actor_groups: &[String],
    ) -> Result<IngestResult> {
        // 1-2. Source and length gates.
        let source_name = self.validate_source(&request)?;
        let (ok, word_count) = validate_word_count(&request.content);
        if !ok {
            return Err(Error::WordCountExceeded { count: word_count, max: MAX_WORD_COUNT });
        }

        // 3. Language.
        let (language, language_detected) = self.resolve_language(&request);

        // 4. Extraction (degrades to None).
        let extraction = self.run_extraction(&request, &source_name).await;

        // 5. Duplicate check.
        let created_at = Utc::now();
        let duplicate = self
            .duplicate_detector
            .check(
                &request.title,
                &request.content,
                request.group_guid,
                self.graph.as_ref(),
                Some(self.vector.as_ref()),
                created_at,
                extraction.as_ref(),
            )
            .await?;

        // 6. Build and persist the canonical document - the commit point.
        let document =
            self.build_document(&request, created_at, &language, language_detected, &duplicate, extraction.as_ref())?;
        self.store.save(&document)?;

        let mut undo = vec![RollbackStep::File(document.guid, document.group_guid)];

        // 7a. Vector index.
        let embed = self
            .vector
            .embed_document(
                document.guid,
                &document.content,
                document.group_guid,
                document.source_guid,
                &document.language,
                request.metadata.as_ref(),
            )
            .await;
        if let Err(e) = embed {
            tracing::error!(error = %e, doc = %document.guid, "vector indexing failed; rolling back");
            self.rollback(undo).await;
            return Err(Error::Ingest(format!("vector indexing failed: {e}")));
        }
        undo.push(RollbackStep::Vector(document.guid));

        // 7b. Graph node and entity edges.
        if let Err(e) = self.index_graph(&document, extraction.as_ref()).await {
            tracing::error!(error = %e, doc = %document.guid, "graph indexing failed; rolling back");
            undo.push(RollbackStep::GraphNode(document.guid));
            self.rollback(undo).await;
            return Err(Error::Ingest(format!("graph indexing failed: {e}")));
        }

        // 8. Audit.
        let status = if duplicate.is_duplicate { IngestStatus::Duplicate } else { IngestStatus::Success };
        let status_text = if duplicate.is_duplicate { "duplicate" } else { "success" };
        if let Err(e) = self.audit.log_document_ingest(
            actor_groups,
            document.guid,
            document.source_guid,
            status_text,
        ) {
            tracing::warn!(error = %e, "audit append failed");
        }

        tracing::info!(
            doc = %document.guid,
            group = %document.group_guid,
            status = status_text,
            words = word_count,
            "document ingested"
        );

        Ok(IngestResult {
            doc_guid: document.guid,
            status,
            language: document.language,
            word_count,
            duplicate_of: duplicate.duplicate_of,
        })
    }

    fn build_document(
        &self,
        request: &IngestRequest,
        created_at: chrono::DateTime<Utc>,
        language: &str,
        language_detected: bool,
        duplicate: &DuplicateCheck,
        extraction: Option<&ExtractionResult>,
    ) -> Result<Document> {
        let mut builder =
            Document::builder(&request.title, &request.content, request.source_guid, request.group_guid)
                .with_created_at(created_at)
                .with_language(language, language_detected)
                .with_content_hash(compute_content_hash(&request.title, &request.content));

        if let Some(metadata) = &request.metadata {
            builder = builder.with_metadata(metadata.clone());
        }
        if let (Some(original), score) = (duplicate.duplicate_of, duplicate.score) {
            builder = builder.with_duplicate_of(original, score);
        }
        if let Some(extraction) = extraction {
            let tier = extraction
                .impact_tier
                .unwrap_or_else(|| ImpactTier::from_score(extraction.impact_score));
            builder = builder
                .with_impact(extraction.impact_score, tier)
                .with_themes(extraction.themes.clone());
            let tickers = extraction.tickers();
            if let (false, Some(event_type)) = (tickers.is_empty(), extraction.primary_event_type())
            {
                builder = builder.with_story_fingerprint(compute_story_fingerprint(
                    &tickers, event_type, created_at,
                ));
            }
        }
        builder.build()
    }

    async fn index_graph(
        &self,
        document: &Document,
        extraction: Option<&ExtractionResult>,
    ) -> Result<()> {
        let spec = DocumentNodeSpec {
            doc_guid: document.guid,
            source_guid: document.source_guid,
            group_guid: document.group_guid,
            title: document.title.clone(),
            language: document.language.clone(),
            created_at: document.created_at,
            impact_score: document.impact_score,
            impact_tier: document.impact_tier,
            event_type: extraction.and_then(|e| e.primary_event_type().map(str::to_string)),
            themes: document.themes.clone(),
            regions: extraction.map(|e| e.regions.clone()).unwrap_or_default(),
            sectors: extraction.map(|e| e.sectors.clone()).unwrap_or_default(),
            content_hash: document.content_hash.clone(),
            story_fingerprint: document.story_fingerprint.clone(),
            is_duplicate: document.is_duplicate(),
            metadata: document.metadata.clone(),
        };
        self.graph.create_document_node(&spec).await?;

        // Duplicates are indexed but get no entity edges; the original
        // already carries them.
        if document.is_duplicate() {
            return Ok(());
        }
        let Some(extraction) = extraction else { return Ok(()) };

        for mention in &extraction.instruments {
            // Phantom-instrument ban: only alias-resolved instruments get
            // AFFECTS edges; everything else stays extraction metadata.
            let resolved = match self.aliases.resolve_ticker(&mention.ticker).await? {
                Some(guid) => Some(guid),
                None => match &mention.name {
                    Some(name) => self.aliases.resolve(name, Some("NAME_VARIANT")).await?,
                    None => None,
                },
            };
            match resolved {
                Some(instrument_guid) => {
                    self.graph
                        .add_affects_edge(
                            document.guid,
                            NodeLabel::Instrument,
                            &instrument_guid,
                            mention.direction,
                            mention.magnitude,
                        )
                        .await?;
                }
                None => {
                    tracing::debug!(ticker = %mention.ticker, "unresolved instrument mention skipped");
                }
            }
        }

        if let Some(event_type) = extraction.primary_event_type() {
            self.graph.add_triggered_by_edge(document.guid, event_type).await?;
        }

        for company in &extraction.companies {
            if let Some(company_guid) =
                self.aliases.resolve(company, Some("NAME_VARIANT")).await?
            {
                self.graph.add_mentions_edge(document.guid, &company_guid).await?;
            }
        }

        Ok(())
    }

    /// Dry-run validation for the `validate_document` tool: reports what
    /// an ingest would decide, persists nothing.
    pub async fn validate(&self, request: &IngestRequest) -> Result<ValidationReport> {
        let mut issues = Vec::new();

        let source_valid = match self.validate_source(request) {
            Ok(_) => true,
            Err(e) => {
                issues.push(e.to_string());
                false
            }
        };

        let (word_count_valid, word_count) = validate_word_count(&request.content);
        if !word_count_valid {
            issues.push(format!("word count {word_count} exceeds maximum {MAX_WORD_COUNT}"));
        }
        if request.title.trim().is_empty() {
            issues.push("title must not be empty".to_string());
        }
        if request.content.trim().is_empty() {
            issues.push("content must not be empty".to_string());
        }

        let (language, _) = self.resolve_language(request);

        let duplicate = self
            .duplicate_detector
            .check(
                &request.title,
                &request.content,
                request.group_guid,
                self.graph.as_ref(),
                Some(self.vector.as_ref()),
                Utc::now(),
                None,
            )
            .await?;
        if duplicate.is_duplicate {
            issues.push(format!(
                "duplicate of {}",
                duplicate.duplicate_of.map(|g| g.to_string()).unwrap_or_default()
            ));
        }

        Ok(ValidationReport {
            valid: issues.is_empty(),
            source_valid,
            word_count_valid,
            word_count,
            language,
            is_duplicate: duplicate.is_duplicate,
            issues,
        })
    }
}
