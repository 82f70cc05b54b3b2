//! Hybrid retrieval.
//!
//! Stages: group gate → vector search → graph enrichment and optional
//! expansion → metadata filtering → blended scoring → duplicate
//! filtering → ranking. Every returned result carries its score
//! breakdown and how it was discovered (`semantic`, `graph` or `both`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use uuid::Uuid;

use gofriq::models::{DiscoveredVia, QueryFilters, QueryResponse, QueryResult, ScoringWeights};
use gofriq::scoring::recency_decay;
use gofriq::Result;
use gofriq_chroma::{VectorFilter, VectorStore};
use gofriq_neo4j::{DocumentRecord, GraphStore};
use gofriq_store::{AuditLog, SourceRegistry};

/// Default recency half-life for query ranking, in minutes.
pub const DEFAULT_QUERY_HALF_LIFE_MINUTES: f64 = 60.0;

/// How many semantic hits seed graph expansion.
const EXPANSION_SEEDS: usize = 5;

/// How many related documents each seed may pull in.
const EXPANSION_PER_SEED: usize = 5;

struct Candidate {
    record: DocumentRecord,
    similarity: f64,
    snippet: Option<String>,
    via: DiscoveredVia,
}

/// Hybrid query engine over the vector and graph indexes.
pub struct QueryService {
    vector: Arc<dyn VectorStore>,
    graph: Arc<dyn GraphStore>,
    registry: Arc<SourceRegistry>,
    audit: Arc<AuditLog>,
    recency_half_life_minutes: f64,
}

impl QueryService {
    pub fn new(
        vector: Arc<dyn VectorStore>,
        graph: Arc<dyn GraphStore>,
        registry: Arc<SourceRegistry>,
        audit: Arc<AuditLog>,
    ) -> Self {
        Self {
            vector,
            graph,
            registry,
            audit,
            recency_half_life_minutes: DEFAULT_QUERY_HALF_LIFE_MINUTES,
        }
    }

    /// Override the recency half-life.
    #[must_use]
    pub fn with_recency_half_life(mut self, minutes: f64) -> Self {
        self.recency_half_life_minutes = minutes.max(1.0);
        self
    }

    /// Run a hybrid query within the caller's permitted groups.
    pub async fn query(
        &self,
        query_text: &str,
        group_guids: &[Uuid],
        n_results: usize,
        filters: &QueryFilters,
        weights: &ScoringWeights,
        enable_graph_expansion: bool,
        actor_groups: &[String],
    ) -> Result<QueryResponse> {
        let started = Instant::now();

        // An empty permitted set yields an empty result, never an error.
        if group_guids.is_empty() || query_text.trim().is_empty() {
            return Ok(QueryResponse::empty(query_text));
        }
        filters.validate()?;
        weights.validate()?;

        // Vector search, over-fetched so chunk collapsing and filtering
        // still leave enough candidates.
        let vector_filter = VectorFilter {
            group_guids: Some(group_guids.to_vec()),
            source_guids: filters.sources.clone(),
            languages: filters.languages.clone(),
        };
        let hits = self
            .vector
            .search(query_text, n_results.max(1) * 3, &vector_filter, true)
            .await?;

        // Collapse chunks to their best-scoring document.
        let mut candidates: HashMap<Uuid, Candidate> = HashMap::new();
        for hit in hits {
            let keep_existing = candidates
                .get(&hit.document_guid)
                .map_or(false, |c| c.similarity >= hit.score);
            if keep_existing {
                continue;
            }
            let Some(record) = self.graph.get_document_record(hit.document_guid).await? else {
                // Vector entry without a graph node: a partially
                // rolled-back ingest; skip it.
                continue;
            };
            candidates.insert(
                hit.document_guid,
                Candidate {
                    record,
                    similarity: hit.score.clamp(0.0, 1.0),
                    snippet: Some(hit.content),
                    via: DiscoveredVia::Semantic,
                },
            );
        }

        // Graph expansion from the strongest semantic hits.
        if enable_graph_expansion {
            let mut seeds: Vec<(Uuid, f64)> =
                candidates.iter().map(|(guid, c)| (*guid, c.similarity)).collect();
            seeds.sort_by(|a, b| b.1.total_cmp(&a.1));
            seeds.truncate(EXPANSION_SEEDS);

            for (seed, _) in seeds {
                for related in self.graph.get_related_documents(seed, EXPANSION_PER_SEED).await? {
                    match candidates.get_mut(&related.record.guid) {
                        Some(existing) => existing.via = DiscoveredVia::Both,
                        None => {
                            // Respect group scoping for expanded results.
                            if related
                                .record
                                .group_guid
                                .map_or(false, |g| group_guids.contains(&g))
                            {
                                candidates.insert(
                                    related.record.guid,
                                    Candidate {
                                        record: related.record,
                                        similarity: 0.0,
                                        snippet: None,
                                        via: DiscoveredVia::Graph,
                                    },
                                );
                            }
                        }
                    }
                }
            }
        }

        // Metadata filters that need graph-side fields.
        let allowed_by_company = self.company_filter(filters).await?;
        let total_candidates = candidates.len();
        let now = Utc::now();

        let mut results = Vec::new();
        for candidate in candidates.into_values() {
            if !self.passes_filters(&candidate.record, filters, allowed_by_company.as_ref()) {
                continue;
            }
            if candidate.record.is_duplicate && !filters.include_duplicates {
                continue;
            }

            let trust_boost = self.source_boost(candidate.record.source_guid);
            let age_minutes = candidate
                .record
                .created_at
                .map(|at| (now - at).num_seconds() as f64 / 60.0)
                .unwrap_or(f64::MAX);
            let recency = recency_decay(age_minutes, self.recency_half_life_minutes);
            let graph_bonus = match candidate.via {
                DiscoveredVia::Semantic => 0.0,
                DiscoveredVia::Graph | DiscoveredVia::Both => 1.0,
            };

            // Trust boosts live in [0.6, 1.2]; normalized by the maximum
            // so every component stays in [0, 1].
            let trust_score = trust_boost / 1.2;
            let score = weights.semantic * candidate.similarity
                + weights.trust * trust_score
                + weights.recency * recency
                + weights.graph_boost * graph_bonus;

            results.push(QueryResult {
                document_guid: candidate.record.guid,
                title: candidate.record.title,
                snippet: candidate.snippet,
                score,
                similarity_score: candidate.similarity,
                trust_score,
                recency_score: recency,
                graph_score: graph_bonus,
                source_guid: candidate.record.source_guid,
                source_name: None,
                language: candidate.record.language,
                created_at: candidate.record.created_at,
                impact_score: candidate.record.impact_score,
                impact_tier: candidate.record.impact_tier,
                event_type: candidate.record.event_type,
                themes: candidate.record.themes,
                is_duplicate: candidate.record.is_duplicate,
                discovered_via: candidate.via,
                metadata: Default::default(),
            });
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(n_results);

        // Attach source names for display.
        for result in &mut results {
            if let Some(source_guid) = result.source_guid {
                if let Ok(source) = self.registry.get(source_guid, None) {
                    result.source_name = Some(source.name);
                }
            }
        }

        if let Err(e) = self.audit.log_document_query(actor_groups, query_text, results.len()) {
            tracing::warn!(error = %e, "audit append failed");
        }

        let execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        tracing::debug!(
            results = results.len(),
            candidates = total_candidates,
            elapsed_ms = execution_time_ms,
            "query served"
        );

        Ok(QueryResponse {
            query: query_text.to_string(),
            results,
            total_found: total_candidates,
            filters_applied: filters.has_filters().then(|| filters.clone()),
            execution_time_ms,
        })
    }

    /// When a companies filter is present, resolve it to the set of
    /// documents reaching those tickers.
    async fn company_filter(&self, filters: &QueryFilters) -> Result<Option<HashSet<Uuid>>> {
        let Some(companies) = &filters.companies else { return Ok(None) };
        let mut allowed = HashSet::new();
        for company in companies {
            for record in self.graph.get_documents_mentioning(company, 200).await? {
                allowed.insert(record.guid);
            }
        }
        Ok(Some(allowed))
    }

    fn passes_filters(
        &self,
        record: &DocumentRecord,
        filters: &QueryFilters,
        allowed_by_company: Option<&HashSet<Uuid>>,
    ) -> bool {
        if let Some(allowed) = allowed_by_company {
            if !allowed.contains(&record.guid) {
                return false;
            }
        }
        if let Some(from) = filters.date_from {
            if record.created_at.map_or(true, |at| at < from) {
                return false;
            }
        }
        if let Some(to) = filters.date_to {
            if record.created_at.map_or(true, |at| at > to) {
                return false;
            }
        }
        if let Some(min) = filters.min_impact_score {
            if record.impact_score.map_or(true, |score| score < min) {
                return false;
            }
        }
        if let Some(tiers) = &filters.impact_tiers {
            if record.impact_tier.map_or(true, |tier| !tiers.contains(&tier)) {
                return false;
            }
        }
        if let Some(event_types) = &filters.event_types {
            if record
                .event_type
                .as_deref()
                .map_or(true, |e| !event_types.iter().any(|w| w.eq_ignore_ascii_case(e)))
            {
                return false;
            }
        }
        if let Some(regions) = &filters.regions {
            if !record.regions.iter().any(|r| regions.iter().any(|w| w.eq_ignore_ascii_case(r))) {
                return false;
            }
        }
        if let Some(sectors) = &filters.sectors {
            if !record.sectors.iter().any(|s| sectors.iter().any(|w| w.eq_ignore_ascii_case(s))) {
                return false;
            }
        }
        true
    }

    fn source_boost(&self, source_guid: Option<Uuid>) -> f64 {
        source_guid
            .and_then(|guid| self.registry.get(guid, None).ok())
            .map_or(1.0, |source| source.boost_factor())
    }
}
