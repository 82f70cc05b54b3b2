//! In-memory [`GraphStore`] implementation.
//!
//! Backs embedded deployments (no `GOFR_IQ_NEO4J_URI`) and the test
//! suite. Node identity is `(label, guid)`, matching the uniqueness
//! constraints the Bolt implementation declares; relationships are merged
//! by `(type, from, to)` so repeated upserts stay idempotent.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use uuid::Uuid;

use gofriq::models::{Client, ClientProfile, Direction, Horizon, Restrictions, Source};
use gofriq::models::ImpactTier;
use gofriq::{Error, Result};

use crate::graph_store::GraphStore;
use crate::schema;
use crate::types::{
    ClientContext, CompanySpec, DocumentNodeSpec, DocumentRecord, ExploreRelationship,
    ExploreResult, FactorExposure, FeedCandidate, GraphNode, Holding, InstrumentOverview,
    InstrumentSpec, NodeLabel, PropMap, RelatedDocument, RelationType, WatchEntry,
};

#[derive(Debug, Clone)]
struct EdgeRec {
    rel: RelationType,
    from: (NodeLabel, String),
    to: (NodeLabel, String),
    props: PropMap,
}

#[derive(Default)]
struct State {
    nodes: HashMap<(NodeLabel, String), PropMap>,
    edges: Vec<EdgeRec>,
}

/// In-memory property graph.
#[derive(Default)]
pub struct MemoryGraph {
    state: RwLock<State>,
}

fn prop_str(props: &PropMap, key: &str) -> Option<String> {
    props.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn prop_f64(props: &PropMap, key: &str) -> Option<f64> {
    props.get(key).and_then(Value::as_f64)
}

fn prop_bool(props: &PropMap, key: &str) -> Option<bool> {
    props.get(key).and_then(Value::as_bool)
}

fn prop_str_list(props: &PropMap, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items.iter().filter_map(|v| v.as_str()).map(str::to_string).collect()
        })
        .unwrap_or_default()
}

fn prop_datetime(props: &PropMap, key: &str) -> Option<DateTime<Utc>> {
    prop_str(props, key)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn document_record(guid: &str, props: &PropMap) -> Option<DocumentRecord> {
    let guid = guid.parse().ok()?;
    Some(DocumentRecord {
        guid,
        title: prop_str(props, "title").unwrap_or_default(),
        source_guid: prop_str(props, "source_guid").and_then(|s| s.parse().ok()),
        group_guid: prop_str(props, "group_guid").and_then(|s| s.parse().ok()),
        language: prop_str(props, "language").unwrap_or_default(),
        created_at: prop_datetime(props, "created_at"),
        impact_score: prop_f64(props, "impact_score"),
        impact_tier: prop_str(props, "impact_tier").as_deref().and_then(ImpactTier::parse),
        event_type: prop_str(props, "event_type"),
        themes: prop_str_list(props, "themes"),
        regions: prop_str_list(props, "regions"),
        sectors: prop_str_list(props, "sectors"),
        is_duplicate: prop_bool(props, "is_duplicate").unwrap_or(false),
    })
}

fn portfolio_guid(client_guid: Uuid) -> String {
    format!("{client_guid}-portfolio")
}

fn watchlist_guid(client_guid: Uuid) -> String {
    format!("{client_guid}-watchlist")
}

fn profile_guid(client_guid: Uuid) -> String {
    format!("{client_guid}-profile")
}

fn alias_guid(scheme: &str, value: &str) -> String {
    format!("{}:{}", scheme.to_uppercase(), value.trim().to_lowercase())
}

impl MemoryGraph {
    /// Fresh, empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn merge_edge(
        state: &mut State,
        rel: RelationType,
        from: (NodeLabel, String),
        to: (NodeLabel, String),
        props: PropMap,
    ) {
        if let Some(existing) = state
            .edges
            .iter_mut()
            .find(|e| e.rel == rel && e.from == from && e.to == to)
        {
            existing.props = props;
        } else {
            state.edges.push(EdgeRec { rel, from, to, props });
        }
    }

    /// Documents in the permitted groups created since `since`, with their
    /// affected tickers and sectors, filtered by `keep`.
    fn feed_candidates<F>(
        &self,
        group_guids: &[Uuid],
        since: DateTime<Utc>,
        keep: F,
    ) -> Vec<FeedCandidate>
    where
        F: Fn(&DocumentRecord, &[String]) -> bool,
    {
        let state = self.state.read();
        let groups: HashSet<String> = group_guids.iter().map(Uuid::to_string).collect();
        let mut candidates = Vec::new();

        for ((label, guid), props) in &state.nodes {
            if *label != NodeLabel::Document {
                continue;
            }
            let Some(record) = document_record(guid, props) else { continue };
            if record.created_at.map_or(true, |at| at < since) {
                continue;
            }
            if !prop_str(props, "group_guid").is_some_and(|g| groups.contains(&g)) {
                continue;
            }

            let mut affected_tickers = Vec::new();
            let mut affected_sectors = Vec::new();
            for edge in &state.edges {
                if edge.rel != RelationType::Affects
                    || edge.from != (NodeLabel::Document, guid.clone())
                    || edge.to.0 != NodeLabel::Instrument
                {
                    continue;
                }
                let ticker = edge.to.1.clone();
                if let Some(company) =
                    state.nodes.get(&(NodeLabel::Company, ticker.clone()))
                {
                    if let Some(sector) = prop_str(company, "sector") {
                        if !affected_sectors.contains(&sector) {
                            affected_sectors.push(sector);
                        }
                    }
                }
                affected_tickers.push(ticker);
            }

            if keep(&record, &affected_tickers) {
                candidates.push(FeedCandidate { record, affected_tickers, affected_sectors });
            }
        }

        candidates.sort_by(|a, b| b.record.created_at.cmp(&a.record.created_at));
        candidates
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn init_schema(&self) -> Result<()> {
        // Uniqueness is structural here: the node map is keyed by
        // (label, guid).
        Ok(())
    }

    async fn seed_taxonomy(&self) -> Result<()> {
        for region in schema::REGIONS {
            self.upsert_node(
                NodeLabel::Region,
                region.code,
                PropMap::from([
                    ("code".to_string(), json!(region.code)),
                    ("name".to_string(), json!(region.name)),
                ]),
            )
            .await?;
        }
        for sector in schema::SECTORS {
            self.upsert_node(
                NodeLabel::Sector,
                sector.code,
                PropMap::from([
                    ("code".to_string(), json!(sector.code)),
                    ("name".to_string(), json!(sector.name)),
                ]),
            )
            .await?;
        }
        for event in schema::EVENT_TYPES {
            self.upsert_node(
                NodeLabel::EventType,
                event.code,
                PropMap::from([
                    ("code".to_string(), json!(event.code)),
                    ("name".to_string(), json!(event.name)),
                    ("category".to_string(), json!(event.category)),
                    ("base_impact".to_string(), json!(event.base_impact)),
                    ("default_tier".to_string(), json!(event.default_tier.as_str())),
                ]),
            )
            .await?;
        }
        for factor in schema::FACTORS {
            self.upsert_node(
                NodeLabel::Factor,
                factor.factor_id,
                PropMap::from([
                    ("factor_id".to_string(), json!(factor.factor_id)),
                    ("name".to_string(), json!(factor.name)),
                    ("category".to_string(), json!(factor.category)),
                ]),
            )
            .await?;
        }
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<()> {
        Ok(())
    }

    async fn upsert_node(&self, label: NodeLabel, guid: &str, props: PropMap) -> Result<()> {
        let mut state = self.state.write();
        let entry = state.nodes.entry((label, guid.to_string())).or_default();
        entry.extend(props);
        entry.insert("guid".to_string(), json!(guid));
        Ok(())
    }

    async fn get_node(&self, label: NodeLabel, guid: &str) -> Result<Option<GraphNode>> {
        let state = self.state.read();
        Ok(state.nodes.get(&(label, guid.to_string())).map(|props| GraphNode {
            label,
            guid: guid.to_string(),
            properties: props.clone(),
        }))
    }

    async fn delete_node(&self, label: NodeLabel, guid: &str) -> Result<bool> {
        let mut state = self.state.write();
        let key = (label, guid.to_string());
        let removed = state.nodes.remove(&key).is_some();
        if removed {
            state.edges.retain(|e| e.from != key && e.to != key);
        }
        Ok(removed)
    }

    async fn create_relationship(
        &self,
        rel: RelationType,
        from: (NodeLabel, &str),
        to: (NodeLabel, &str),
        props: PropMap,
    ) -> Result<bool> {
        let from = (from.0, from.1.to_string());
        let to = (to.0, to.1.to_string());
        let mut state = self.state.write();
        if !state.nodes.contains_key(&from) || !state.nodes.contains_key(&to) {
            return Ok(false);
        }
        Self::merge_edge(&mut state, rel, from, to, props);
        Ok(true)
    }

    async fn count_nodes(&self, label: Option<NodeLabel>) -> Result<usize> {
        let state = self.state.read();
        Ok(match label {
            Some(label) => state.nodes.keys().filter(|(l, _)| *l == label).count(),
            None => state.nodes.len(),
        })
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.write();
        state.nodes.clear();
        state.edges.clear();
        Ok(())
    }

    async fn create_document_node(&self, spec: &DocumentNodeSpec) -> Result<()> {
        let mut props = PropMap::new();
        props.insert("title".to_string(), json!(spec.title));
        props.insert("language".to_string(), json!(spec.language));
        props.insert("created_at".to_string(), json!(spec.created_at.to_rfc3339()));
        props.insert("source_guid".to_string(), json!(spec.source_guid.to_string()));
        props.insert("group_guid".to_string(), json!(spec.group_guid.to_string()));
        props.insert("is_duplicate".to_string(), json!(spec.is_duplicate));
        if let Some(score) = spec.impact_score {
            props.insert("impact_score".to_string(), json!(score));
        }
        if let Some(tier) = spec.impact_tier {
            props.insert("impact_tier".to_string(), json!(tier.as_str()));
        }
        if let Some(event) = &spec.event_type {
            props.insert("event_type".to_string(), json!(event));
        }
        if !spec.themes.is_empty() {
            props.insert("themes".to_string(), json!(spec.themes));
        }
        if !spec.regions.is_empty() {
            props.insert("regions".to_string(), json!(spec.regions));
        }
        if !spec.sectors.is_empty() {
            props.insert("sectors".to_string(), json!(spec.sectors));
        }
        if let Some(hash) = &spec.content_hash {
            props.insert("content_hash".to_string(), json!(hash));
        }
        if let Some(fingerprint) = &spec.story_fingerprint {
            props.insert("story_fingerprint".to_string(), json!(fingerprint));
        }
        for (key, value) in &spec.metadata {
            match value {
                Value::Object(_) => {
                    props.insert(
                        format!("meta_{key}"),
                        json!(serde_json::to_string(value).unwrap_or_default()),
                    );
                }
                other => {
                    props.insert(format!("meta_{key}"), other.clone());
                }
            }
        }

        let doc_guid = spec.doc_guid.to_string();
        self.upsert_node(NodeLabel::Document, &doc_guid, props).await?;

        // Best-effort links; the source or group node may not exist yet.
        self.create_relationship(
            RelationType::ProducedBy,
            (NodeLabel::Document, &doc_guid),
            (NodeLabel::Source, &spec.source_guid.to_string()),
            PropMap::new(),
        )
        .await?;
        self.create_relationship(
            RelationType::InGroup,
            (NodeLabel::Document, &doc_guid),
            (NodeLabel::Group, &spec.group_guid.to_string()),
            PropMap::new(),
        )
        .await?;
        Ok(())
    }

    async fn find_document_by_content_hash(
        &self,
        group_guid: Uuid,
        content_hash: &str,
    ) -> Result<Option<Uuid>> {
        let state = self.state.read();
        let group = group_guid.to_string();
        let mut matches: Vec<(Option<DateTime<Utc>>, Uuid)> = state
            .nodes
            .iter()
            .filter(|((label, _), props)| {
                *label == NodeLabel::Document
                    && prop_str(props, "group_guid").as_deref() == Some(group.as_str())
                    && prop_str(props, "content_hash").as_deref() == Some(content_hash)
            })
            .filter_map(|((_, guid), props)| {
                guid.parse().ok().map(|g| (prop_datetime(props, "created_at"), g))
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches.first().map(|(_, guid)| *guid))
    }

    async fn find_document_by_fingerprint(
        &self,
        group_guid: Uuid,
        fingerprint: &str,
    ) -> Result<Option<Uuid>> {
        let state = self.state.read();
        let group = group_guid.to_string();
        let mut matches: Vec<(Option<DateTime<Utc>>, Uuid)> = state
            .nodes
            .iter()
            .filter(|((label, _), props)| {
                *label == NodeLabel::Document
                    && prop_str(props, "group_guid").as_deref() == Some(group.as_str())
                    && prop_str(props, "story_fingerprint").as_deref() == Some(fingerprint)
            })
            .filter_map(|((_, guid), props)| {
                guid.parse().ok().map(|g| (prop_datetime(props, "created_at"), g))
            })
            .collect();
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(matches.first().map(|(_, guid)| *guid))
    }

    async fn add_affects_edge(
        &self,
        doc_guid: Uuid,
        target_label: NodeLabel,
        target_guid: &str,
        direction: Direction,
        magnitude: f64,
    ) -> Result<bool> {
        self.create_relationship(
            RelationType::Affects,
            (NodeLabel::Document, &doc_guid.to_string()),
            (target_label, target_guid),
            PropMap::from([
                ("direction".to_string(), json!(direction.as_str())),
                ("magnitude".to_string(), json!(magnitude)),
            ]),
        )
        .await
    }

    async fn add_triggered_by_edge(&self, doc_guid: Uuid, event_code: &str) -> Result<bool> {
        self.create_relationship(
            RelationType::TriggeredBy,
            (NodeLabel::Document, &doc_guid.to_string()),
            (NodeLabel::EventType, &event_code.to_uppercase()),
            PropMap::new(),
        )
        .await
    }

    async fn add_mentions_edge(&self, doc_guid: Uuid, company_guid: &str) -> Result<bool> {
        self.create_relationship(
            RelationType::Mentions,
            (NodeLabel::Document, &doc_guid.to_string()),
            (NodeLabel::Company, company_guid),
            PropMap::new(),
        )
        .await
    }

    async fn get_document_record(&self, doc_guid: Uuid) -> Result<Option<DocumentRecord>> {
        let state = self.state.read();
        Ok(state
            .nodes
            .get(&(NodeLabel::Document, doc_guid.to_string()))
            .and_then(|props| document_record(&doc_guid.to_string(), props)))
    }

    async fn get_documents_by_source(
        &self,
        source_guid: Uuid,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let state = self.state.read();
        let source = source_guid.to_string();
        let mut records: Vec<DocumentRecord> = state
            .nodes
            .iter()
            .filter(|((label, _), props)| {
                *label == NodeLabel::Document
                    && prop_str(props, "source_guid").as_deref() == Some(source.as_str())
            })
            .filter_map(|((_, guid), props)| document_record(guid, props))
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_documents_mentioning(
        &self,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let state = self.state.read();
        let mut guids: Vec<String> = Vec::new();
        for edge in &state.edges {
            let reaches = match edge.rel {
                RelationType::Affects => {
                    edge.to.0 == NodeLabel::Instrument && edge.to.1 == ticker
                }
                RelationType::Mentions => {
                    edge.to.0 == NodeLabel::Company && edge.to.1 == ticker
                }
                _ => false,
            };
            if reaches && edge.from.0 == NodeLabel::Document && !guids.contains(&edge.from.1) {
                guids.push(edge.from.1.clone());
            }
        }
        let mut records: Vec<DocumentRecord> = guids
            .iter()
            .filter_map(|guid| {
                state
                    .nodes
                    .get(&(NodeLabel::Document, guid.clone()))
                    .and_then(|props| document_record(guid, props))
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(limit);
        Ok(records)
    }

    async fn get_related_documents(
        &self,
        doc_guid: Uuid,
        limit: usize,
    ) -> Result<Vec<RelatedDocument>> {
        let state = self.state.read();
        let start = (NodeLabel::Document, doc_guid.to_string());

        // Companies and instruments this document touches, and its source.
        let mut shared_entities: Vec<(NodeLabel, String)> = Vec::new();
        let mut source: Option<String> = None;
        for edge in &state.edges {
            if edge.from != start {
                continue;
            }
            match edge.rel {
                RelationType::Mentions | RelationType::Affects => {
                    shared_entities.push(edge.to.clone());
                }
                RelationType::ProducedBy => source = Some(edge.to.1.clone()),
                _ => {}
            }
        }

        let mut related: Vec<RelatedDocument> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(doc_guid.to_string());

        for edge in &state.edges {
            if related.len() >= limit {
                break;
            }
            if edge.from.0 != NodeLabel::Document || seen.contains(&edge.from.1) {
                continue;
            }
            let via = match edge.rel {
                RelationType::Mentions | RelationType::Affects
                    if shared_entities.contains(&edge.to) =>
                {
                    "company"
                }
                RelationType::ProducedBy
                    if source.as_deref() == Some(edge.to.1.as_str()) =>
                {
                    "source"
                }
                _ => continue,
            };
            if let Some(record) = state
                .nodes
                .get(&(NodeLabel::Document, edge.from.1.clone()))
                .and_then(|props| document_record(&edge.from.1, props))
            {
                seen.insert(edge.from.1.clone());
                related.push(RelatedDocument { record, via: via.to_string() });
            }
        }

        Ok(related)
    }

    async fn lookup_alias(&self, value: &str, scheme: Option<&str>) -> Result<Option<String>> {
        let state = self.state.read();
        let normalized = value.trim().to_lowercase();
        let scheme = scheme.map(str::to_uppercase);
        for ((label, _), props) in &state.nodes {
            if *label != NodeLabel::Alias {
                continue;
            }
            if prop_str(props, "value_normalized").as_deref() != Some(normalized.as_str()) {
                continue;
            }
            if let Some(wanted) = &scheme {
                if prop_str(props, "scheme").as_deref() != Some(wanted.as_str()) {
                    continue;
                }
            }
            return Ok(prop_str(props, "canonical_guid"));
        }
        Ok(None)
    }

    async fn add_alias(&self, value: &str, scheme: &str, canonical_guid: &str) -> Result<()> {
        let scheme = scheme.to_uppercase();
        let guid = alias_guid(&scheme, value);
        self.upsert_node(
            NodeLabel::Alias,
            &guid,
            PropMap::from([
                ("value".to_string(), json!(value)),
                ("value_normalized".to_string(), json!(value.trim().to_lowercase())),
                ("scheme".to_string(), json!(scheme)),
                ("canonical_guid".to_string(), json!(canonical_guid)),
            ]),
        )
        .await
    }

    async fn upsert_instrument(&self, spec: &InstrumentSpec) -> Result<()> {
        let ticker = spec.ticker.trim().to_uppercase();
        let mut props = PropMap::from([
            ("ticker".to_string(), json!(ticker)),
            ("name".to_string(), json!(spec.name)),
        ]);
        if let Some(t) = &spec.instrument_type {
            props.insert("type".to_string(), json!(t));
        }
        if let Some(exchange) = &spec.exchange {
            props.insert("exchange".to_string(), json!(exchange));
        }
        if let Some(currency) = &spec.currency {
            props.insert("currency".to_string(), json!(currency));
        }
        if let Some(country) = &spec.country {
            props.insert("country".to_string(), json!(country));
        }
        self.upsert_node(NodeLabel::Instrument, &ticker, props).await?;
        self.add_alias(&ticker, "TICKER", &ticker).await
    }

    async fn upsert_company(&self, spec: &CompanySpec) -> Result<()> {
        let ticker = spec.ticker.trim().to_uppercase();
        let mut props = PropMap::from([
            ("ticker".to_string(), json!(ticker)),
            ("name".to_string(), json!(spec.name)),
        ]);
        if let Some(sector) = &spec.sector {
            props.insert("sector".to_string(), json!(sector));
        }
        self.upsert_node(NodeLabel::Company, &ticker, props).await?;

        self.create_relationship(
            RelationType::IssuedBy,
            (NodeLabel::Instrument, &ticker),
            (NodeLabel::Company, &ticker),
            PropMap::new(),
        )
        .await?;
        if let Some(sector) = &spec.sector {
            self.create_relationship(
                RelationType::BelongsTo,
                (NodeLabel::Company, &ticker),
                (NodeLabel::Sector, sector),
                PropMap::new(),
            )
            .await?;
        }
        for alias in &spec.aliases {
            self.add_alias(alias, "NAME_VARIANT", &ticker).await?;
        }
        self.add_alias(&spec.name, "NAME_VARIANT", &ticker).await
    }

    async fn upsert_group_node(&self, group_guid: Uuid, name: &str) -> Result<()> {
        self.upsert_node(
            NodeLabel::Group,
            &group_guid.to_string(),
            PropMap::from([("name".to_string(), json!(name))]),
        )
        .await
    }

    async fn upsert_source_node(&self, source: &Source) -> Result<()> {
        let guid = source.source_guid.to_string();
        self.upsert_node(
            NodeLabel::Source,
            &guid,
            PropMap::from([
                ("name".to_string(), json!(source.name)),
                ("type".to_string(), json!(source.source_type.as_str())),
                ("trust_level".to_string(), json!(source.trust_level.as_str())),
                ("active".to_string(), json!(source.active)),
                ("group_guid".to_string(), json!(source.group_guid.to_string())),
            ]),
        )
        .await?;
        self.create_relationship(
            RelationType::InGroup,
            (NodeLabel::Source, &guid),
            (NodeLabel::Group, &source.group_guid.to_string()),
            PropMap::new(),
        )
        .await?;
        Ok(())
    }

    async fn relate_companies(
        &self,
        rel: RelationType,
        from_ticker: &str,
        to_ticker: &str,
    ) -> Result<bool> {
        self.create_relationship(
            rel,
            (NodeLabel::Company, &from_ticker.to_uppercase()),
            (NodeLabel::Company, &to_ticker.to_uppercase()),
            PropMap::new(),
        )
        .await
    }

    async fn set_factor_exposure(
        &self,
        company_ticker: &str,
        factor_id: &str,
        beta: f64,
    ) -> Result<bool> {
        self.create_relationship(
            RelationType::ExposedTo,
            (NodeLabel::Company, &company_ticker.to_uppercase()),
            (NodeLabel::Factor, factor_id),
            PropMap::from([("beta".to_string(), json!(beta))]),
        )
        .await
    }

    async fn upsert_client(&self, client: &Client) -> Result<()> {
        let guid = client.client_guid.to_string();
        let mut props = PropMap::from([
            ("name".to_string(), json!(client.name)),
            ("group_guid".to_string(), json!(client.group_guid.to_string())),
        ]);
        if let Some(code) = &client.client_type_code {
            props.insert("client_type_code".to_string(), json!(code));
        }
        if let Some(contact) = &client.primary_contact {
            props.insert("primary_contact".to_string(), json!(contact));
        }
        if let Some(freq) = &client.alert_frequency {
            props.insert("alert_frequency".to_string(), json!(freq));
        }
        self.upsert_node(NodeLabel::Client, &guid, props).await?;

        let portfolio = portfolio_guid(client.client_guid);
        let watchlist = watchlist_guid(client.client_guid);
        self.upsert_node(NodeLabel::Portfolio, &portfolio, PropMap::new()).await?;
        self.upsert_node(NodeLabel::Watchlist, &watchlist, PropMap::new()).await?;
        self.create_relationship(
            RelationType::HasPortfolio,
            (NodeLabel::Client, &guid),
            (NodeLabel::Portfolio, &portfolio),
            PropMap::new(),
        )
        .await?;
        self.create_relationship(
            RelationType::HasWatchlist,
            (NodeLabel::Client, &guid),
            (NodeLabel::Watchlist, &watchlist),
            PropMap::new(),
        )
        .await?;
        self.create_relationship(
            RelationType::InGroup,
            (NodeLabel::Client, &guid),
            (NodeLabel::Group, &client.group_guid.to_string()),
            PropMap::new(),
        )
        .await?;
        Ok(())
    }

    async fn add_portfolio_holding(
        &self,
        client_guid: Uuid,
        ticker: &str,
        weight: f64,
        sentiment: Option<&str>,
        shares: Option<f64>,
        avg_cost: Option<f64>,
    ) -> Result<bool> {
        if !(0.0..=1.0).contains(&weight) {
            return Err(Error::validation("holding weight must be within [0, 1]"));
        }
        let mut props = PropMap::from([("weight".to_string(), json!(weight))]);
        if let Some(sentiment) = sentiment {
            props.insert("sentiment".to_string(), json!(sentiment.to_uppercase()));
        }
        if let Some(shares) = shares {
            props.insert("shares".to_string(), json!(shares));
        }
        if let Some(avg_cost) = avg_cost {
            props.insert("avg_cost".to_string(), json!(avg_cost));
        }
        self.create_relationship(
            RelationType::Holds,
            (NodeLabel::Portfolio, &portfolio_guid(client_guid)),
            (NodeLabel::Instrument, &ticker.to_uppercase()),
            props,
        )
        .await
    }

    async fn add_watchlist_entry(
        &self,
        client_guid: Uuid,
        ticker: &str,
        alert_threshold: Option<f64>,
    ) -> Result<bool> {
        let mut props = PropMap::new();
        if let Some(threshold) = alert_threshold {
            props.insert("alert_threshold".to_string(), json!(threshold));
        }
        self.create_relationship(
            RelationType::Watches,
            (NodeLabel::Watchlist, &watchlist_guid(client_guid)),
            (NodeLabel::Instrument, &ticker.to_uppercase()),
            props,
        )
        .await
    }

    async fn upsert_client_profile(
        &self,
        client_guid: Uuid,
        profile: &ClientProfile,
    ) -> Result<()> {
        let guid = profile
            .profile_guid
            .map(|g| g.to_string())
            .unwrap_or_else(|| profile_guid(client_guid));

        let mut props = PropMap::new();
        if let Some(mandate_type) = &profile.mandate_type {
            props.insert("mandate_type".to_string(), json!(mandate_type));
        }
        if let Some(mandate_text) = &profile.mandate_text {
            props.insert("mandate_text".to_string(), json!(mandate_text));
        }
        if !profile.mandate_themes.is_empty() {
            props.insert("mandate_themes".to_string(), json!(profile.mandate_themes));
        }
        if !profile.mandate_embedding.is_empty() {
            props.insert("mandate_embedding".to_string(), json!(profile.mandate_embedding));
        }
        if let Some(horizon) = profile.horizon {
            props.insert("horizon".to_string(), serde_json::to_value(horizon).unwrap_or(Value::Null));
        }
        if let Some(esg) = profile.esg_constrained {
            props.insert("esg_constrained".to_string(), json!(esg));
        }
        if let Some(restrictions) = &profile.restrictions {
            props.insert(
                "restrictions".to_string(),
                json!(serde_json::to_string(restrictions).unwrap_or_default()),
            );
        }
        if let Some(threshold) = profile.impact_threshold {
            props.insert("impact_threshold".to_string(), json!(threshold));
        }
        if let Some(benchmark) = &profile.benchmark {
            props.insert("benchmark".to_string(), json!(benchmark));
        }
        if let Some(freq) = &profile.alert_frequency {
            props.insert("alert_frequency".to_string(), json!(freq));
        }
        if let Some(contact) = &profile.primary_contact {
            props.insert("primary_contact".to_string(), json!(contact));
        }

        self.upsert_node(NodeLabel::ClientProfile, &guid, props).await?;
        self.create_relationship(
            RelationType::HasProfile,
            (NodeLabel::Client, &client_guid.to_string()),
            (NodeLabel::ClientProfile, &guid),
            PropMap::new(),
        )
        .await?;
        Ok(())
    }

    async fn get_client_context(&self, client_guid: Uuid) -> Result<Option<ClientContext>> {
        let state = self.state.read();
        let client_key = (NodeLabel::Client, client_guid.to_string());
        let Some(client_props) = state.nodes.get(&client_key) else {
            return Ok(None);
        };

        let client = Client {
            client_guid,
            name: prop_str(client_props, "name").unwrap_or_default(),
            client_type_code: prop_str(client_props, "client_type_code"),
            group_guid: prop_str(client_props, "group_guid")
                .and_then(|g| g.parse().ok())
                .unwrap_or_else(Uuid::nil),
            primary_contact: prop_str(client_props, "primary_contact"),
            alert_frequency: prop_str(client_props, "alert_frequency"),
        };

        let portfolio_key = (NodeLabel::Portfolio, portfolio_guid(client_guid));
        let watchlist_key = (NodeLabel::Watchlist, watchlist_guid(client_guid));

        let mut holdings = Vec::new();
        let mut watchlist = Vec::new();
        for edge in &state.edges {
            if edge.rel == RelationType::Holds && edge.from == portfolio_key {
                holdings.push(Holding {
                    ticker: edge.to.1.clone(),
                    weight: prop_f64(&edge.props, "weight").unwrap_or(0.0),
                    sentiment: prop_str(&edge.props, "sentiment"),
                    shares: prop_f64(&edge.props, "shares"),
                    avg_cost: prop_f64(&edge.props, "avg_cost"),
                });
            } else if edge.rel == RelationType::Watches && edge.from == watchlist_key {
                watchlist.push(WatchEntry {
                    ticker: edge.to.1.clone(),
                    alert_threshold: prop_f64(&edge.props, "alert_threshold"),
                });
            }
        }

        let profile = state
            .edges
            .iter()
            .find(|e| e.rel == RelationType::HasProfile && e.from == client_key)
            .and_then(|e| state.nodes.get(&e.to))
            .map(|props| ClientProfile {
                profile_guid: None,
                mandate_type: prop_str(props, "mandate_type"),
                mandate_text: prop_str(props, "mandate_text"),
                mandate_themes: prop_str_list(props, "mandate_themes"),
                mandate_embedding: props
                    .get("mandate_embedding")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items.iter().filter_map(Value::as_f64).map(|f| f as f32).collect()
                    })
                    .unwrap_or_default(),
                horizon: prop_str(props, "horizon").as_deref().and_then(Horizon::parse),
                esg_constrained: prop_bool(props, "esg_constrained"),
                restrictions: prop_str(props, "restrictions")
                    .and_then(|raw| Restrictions::from_json(&raw).ok()),
                impact_threshold: prop_f64(props, "impact_threshold"),
                benchmark: prop_str(props, "benchmark"),
                alert_frequency: prop_str(props, "alert_frequency"),
                primary_contact: prop_str(props, "primary_contact"),
            });

        Ok(Some(ClientContext { client, holdings, watchlist, profile }))
    }

    async fn list_clients(&self, group_guid: Option<Uuid>) -> Result<Vec<Client>> {
        let state = self.state.read();
        let wanted = group_guid.map(|g| g.to_string());
        let mut clients: Vec<Client> = state
            .nodes
            .iter()
            .filter(|((label, _), props)| {
                *label == NodeLabel::Client
                    && wanted
                        .as_ref()
                        .map_or(true, |g| prop_str(props, "group_guid").as_deref() == Some(g))
            })
            .filter_map(|((_, guid), props)| {
                Some(Client {
                    client_guid: guid.parse().ok()?,
                    name: prop_str(props, "name").unwrap_or_default(),
                    client_type_code: prop_str(props, "client_type_code"),
                    group_guid: prop_str(props, "group_guid")
                        .and_then(|g| g.parse().ok())
                        .unwrap_or_else(Uuid::nil),
                    primary_contact: prop_str(props, "primary_contact"),
                    alert_frequency: prop_str(props, "alert_frequency"),
                })
            })
            .collect();
        clients.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(clients)
    }

    async fn documents_affecting(
        &self,
        tickers: &[String],
        group_guids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedCandidate>> {
        let wanted: HashSet<String> = tickers.iter().map(|t| t.to_uppercase()).collect();
        Ok(self.feed_candidates(group_guids, since, |_, affected| {
            affected.iter().any(|t| wanted.contains(t))
        }))
    }

    async fn documents_with_themes(
        &self,
        themes: &[String],
        group_guids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedCandidate>> {
        let wanted: HashSet<&str> = themes.iter().map(String::as_str).collect();
        Ok(self.feed_candidates(group_guids, since, |record, _| {
            record.themes.iter().any(|t| wanted.contains(t.as_str()))
        }))
    }

    async fn instrument_overview(&self, ticker: &str) -> Result<Option<InstrumentOverview>> {
        let state = self.state.read();
        let ticker = ticker.to_uppercase();
        if !state.nodes.contains_key(&(NodeLabel::Instrument, ticker.clone())) {
            return Ok(None);
        }

        let company_key = (NodeLabel::Company, ticker.clone());
        let company = state.nodes.get(&company_key);

        let mut overview = InstrumentOverview {
            ticker: ticker.clone(),
            company_name: company.and_then(|p| prop_str(p, "name")),
            sector: company.and_then(|p| prop_str(p, "sector")),
            ..InstrumentOverview::default()
        };

        for edge in &state.edges {
            let (other, outbound) = if edge.from == company_key {
                (&edge.to, true)
            } else if edge.to == company_key {
                (&edge.from, false)
            } else {
                continue;
            };
            match edge.rel {
                RelationType::PeerOf if other.0 == NodeLabel::Company => {
                    overview.peers.push(other.1.clone());
                }
                RelationType::CompetesWith if other.0 == NodeLabel::Company => {
                    overview.competitors.push(other.1.clone());
                }
                // Suppliers point at us: X -SUPPLIES_TO-> company.
                RelationType::SuppliesTo if !outbound && other.0 == NodeLabel::Company => {
                    overview.suppliers.push(other.1.clone());
                }
                RelationType::ExposedTo if outbound && other.0 == NodeLabel::Factor => {
                    overview.factor_exposures.push(FactorExposure {
                        factor_id: other.1.clone(),
                        beta: prop_f64(&edge.props, "beta").unwrap_or(0.0),
                    });
                }
                _ => {}
            }
        }
        overview.peers.sort();
        overview.peers.dedup();
        overview.competitors.sort();
        overview.competitors.dedup();
        overview.suppliers.sort();
        overview.suppliers.dedup();
        Ok(Some(overview))
    }

    async fn explore(
        &self,
        label: NodeLabel,
        guid: &str,
        relationship_types: Option<&[RelationType]>,
        max_depth: usize,
        limit: usize,
    ) -> Result<ExploreResult> {
        let depth = max_depth.clamp(1, 3);
        let state = self.state.read();

        let start_key = (label, guid.to_string());
        let Some(start_props) = state.nodes.get(&start_key) else {
            return Err(Error::graph(format!("node {label}:{guid} not found")));
        };
        let start_node =
            GraphNode { label, guid: guid.to_string(), properties: start_props.clone() };

        let mut relationships: Vec<ExploreRelationship> = Vec::new();
        let mut visited: HashSet<(NodeLabel, String)> = HashSet::new();
        let mut frontier: VecDeque<((NodeLabel, String), usize)> = VecDeque::new();
        visited.insert(start_key.clone());
        frontier.push_back((start_key, 0));
        let mut total_found = 0usize;

        while let Some((node, node_depth)) = frontier.pop_front() {
            if node_depth >= depth {
                continue;
            }
            for edge in &state.edges {
                if let Some(wanted) = relationship_types {
                    if !wanted.contains(&edge.rel) {
                        continue;
                    }
                }
                let other = if edge.from == node {
                    edge.to.clone()
                } else if edge.to == node {
                    edge.from.clone()
                } else {
                    continue;
                };
                total_found += 1;
                if relationships.len() < limit {
                    relationships.push(ExploreRelationship {
                        from_label: edge.from.0,
                        from_guid: edge.from.1.clone(),
                        relation: edge.rel,
                        to_label: edge.to.0,
                        to_guid: edge.to.1.clone(),
                        depth: node_depth + 1,
                    });
                }
                if visited.insert(other.clone()) {
                    frontier.push_back((other, node_depth + 1));
                }
            }
        }

        Ok(ExploreResult { start_node, relationships, total_found })
    }
}
