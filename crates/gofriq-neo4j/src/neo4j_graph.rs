//! Neo4j (Bolt) implementation of [`GraphStore`].
//!
//! Every write is a parameterized MERGE so repeated upserts are
//! idempotent, and every read RETURNs scalar columns rather than whole
//! nodes so row mapping stays explicit. Timestamps are stored as RFC 3339
//! strings, which sort correctly lexicographically.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neo4rs::{query, Graph, Query, Row};
use serde_json::Value;
use uuid::Uuid;

use gofriq::models::{Client, ClientProfile, Direction, Horizon, ImpactTier, Restrictions, Source};
use gofriq::{Error, Result};

use crate::graph_store::GraphStore;
use crate::schema;
use crate::types::{
    ClientContext, CompanySpec, DocumentNodeSpec, DocumentRecord, ExploreRelationship,
    ExploreResult, FactorExposure, FeedCandidate, GraphNode, Holding, InstrumentOverview,
    InstrumentSpec, NodeLabel, PropMap, RelatedDocument, RelationType, WatchEntry,
};

/// Labels whose natural key gets a dedicated singleton constraint.
const NATURAL_KEYS: &[(NodeLabel, &str)] = &[
    (NodeLabel::Instrument, "ticker"),
    (NodeLabel::Company, "ticker"),
    (NodeLabel::Factor, "factor_id"),
    (NodeLabel::Sector, "code"),
    (NodeLabel::Region, "code"),
    (NodeLabel::Index, "ticker"),
    (NodeLabel::EventType, "code"),
    (NodeLabel::ClientType, "code"),
];

/// Neo4j-backed property graph.
pub struct Neo4jGraph {
    graph: Arc<Graph>,
}

fn graph_err(context: &str, e: impl std::fmt::Display) -> Error {
    Error::graph(format!("{context}: {e}"))
}

fn row_str(row: &Row, column: &str) -> Option<String> {
    row.get::<String>(column).ok()
}

fn row_opt_str(row: &Row, column: &str) -> Option<String> {
    row.get::<Option<String>>(column).ok().flatten()
}

fn row_opt_f64(row: &Row, column: &str) -> Option<f64> {
    row.get::<Option<f64>>(column).ok().flatten()
}

fn row_str_list(row: &Row, column: &str) -> Vec<String> {
    row.get::<Option<Vec<String>>>(column).ok().flatten().unwrap_or_default()
}

fn row_datetime(row: &Row, column: &str) -> Option<DateTime<Utc>> {
    row_opt_str(row, column)
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn row_document_record(row: &Row) -> Option<DocumentRecord> {
    let guid: Uuid = row_str(row, "guid")?.parse().ok()?;
    Some(DocumentRecord {
        guid,
        title: row_opt_str(row, "title").unwrap_or_default(),
        source_guid: row_opt_str(row, "source_guid").and_then(|s| s.parse().ok()),
        group_guid: row_opt_str(row, "group_guid").and_then(|s| s.parse().ok()),
        language: row_opt_str(row, "language").unwrap_or_default(),
        created_at: row_datetime(row, "created_at"),
        impact_score: row_opt_f64(row, "impact_score"),
        impact_tier: row_opt_str(row, "impact_tier").as_deref().and_then(ImpactTier::parse),
        event_type: row_opt_str(row, "event_type"),
        themes: row_str_list(row, "themes"),
        regions: row_str_list(row, "regions"),
        sectors: row_str_list(row, "sectors"),
        is_duplicate: row.get::<Option<bool>>("is_duplicate").ok().flatten().unwrap_or(false),
    })
}

/// Columns shared by every query that reconstructs a [`DocumentRecord`]
/// from a bound variable `d`.
const DOC_COLUMNS: &str = "d.guid AS guid, d.title AS title, d.source_guid AS source_guid, \
     d.group_guid AS group_guid, d.language AS language, d.created_at AS created_at, \
     d.impact_score AS impact_score, d.impact_tier AS impact_tier, d.event_type AS event_type, \
     d.themes AS themes, d.regions AS regions, d.sectors AS sectors, \
     d.is_duplicate AS is_duplicate";

impl Neo4jGraph {
    /// Connect to a Bolt endpoint.
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| graph_err("failed to connect to Neo4j", e))?;
        Ok(Self { graph: Arc::new(graph) })
    }

    async fn run(&self, q: Query) -> Result<()> {
        self.graph.run(q).await.map_err(|e| graph_err("Neo4j write failed", e))
    }

    async fn fetch_rows(&self, q: Query) -> Result<Vec<Row>> {
        let mut stream =
            self.graph.execute(q).await.map_err(|e| graph_err("Neo4j query failed", e))?;
        let mut rows = Vec::new();
        while let Some(row) =
            stream.next().await.map_err(|e| graph_err("failed to read Neo4j row", e))?
        {
            rows.push(row);
        }
        Ok(rows)
    }

    async fn fetch_one(&self, q: Query) -> Result<Option<Row>> {
        Ok(self.fetch_rows(q).await?.into_iter().next())
    }

    /// Attach a JSON property bag to a query under sequential parameter
    /// names, returning the SET fragment. Nested objects are stored as
    /// JSON strings; lists of scalars pass through.
    fn bind_props(mut q: Query, var: &str, props: &PropMap) -> (Query, String) {
        let mut fragments = Vec::new();
        for (i, (key, value)) in props.iter().enumerate() {
            let param = format!("p{i}");
            fragments.push(format!("{var}.{key} = ${param}"));
            q = match value {
                Value::Null => q.param(&param, None::<String>),
                Value::Bool(b) => q.param(&param, *b),
                Value::Number(n) => {
                    if let Some(int) = n.as_i64() {
                        q.param(&param, int)
                    } else {
                        q.param(&param, n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => q.param(&param, s.as_str()),
                Value::Array(items) => {
                    let strings: Vec<String> = items
                        .iter()
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .collect();
                    q.param(&param, strings)
                }
                Value::Object(_) => q.param(&param, value.to_string()),
            };
        }
        (q, fragments.join(", "))
    }

    /// Shared shape of the two duplicate-key lookups.
    async fn find_document_by_property(
        &self,
        group_guid: Uuid,
        property: &str,
        value: &str,
    ) -> Result<Option<Uuid>> {
        let cypher = format!(
            "MATCH (d:Document {{group_guid: $group, {property}: $value}}) \
             RETURN d.guid AS guid ORDER BY d.created_at ASC LIMIT 1"
        );
        let row = self
            .fetch_one(query(&cypher).param("group", group_guid.to_string()).param("value", value))
            .await?;
        Ok(row.and_then(|r| row_str(&r, "guid")).and_then(|g| g.parse().ok()))
    }

    async fn feed_rows(&self, q: Query) -> Result<Vec<FeedCandidate>> {
        let rows = self.fetch_rows(q).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                let record = row_document_record(row)?;
                Some(FeedCandidate {
                    record,
                    affected_tickers: row_str_list(row, "affected_tickers"),
                    affected_sectors: row_str_list(row, "affected_sectors"),
                })
            })
            .collect())
    }
}

#[async_trait]
impl GraphStore for Neo4jGraph {
    async fn init_schema(&self) -> Result<()> {
        for label in NodeLabel::all() {
            let name = format!("{}_guid_unique", label.as_str().to_lowercase());
            let cypher = format!(
                "CREATE CONSTRAINT {name} IF NOT EXISTS \
                 FOR (n:{label}) REQUIRE n.guid IS UNIQUE"
            );
            self.run(query(&cypher)).await?;
        }
        for (label, key) in NATURAL_KEYS {
            let name = format!("{}_{key}_unique", label.as_str().to_lowercase());
            let cypher = format!(
                "CREATE CONSTRAINT {name} IF NOT EXISTS \
                 FOR (n:{label}) REQUIRE n.{key} IS UNIQUE",
                label = label.as_str()
            );
            self.run(query(&cypher)).await?;
        }
        for (name, label, prop) in [
            ("document_created_at", "Document", "created_at"),
            ("document_language", "Document", "language"),
            ("document_impact_tier", "Document", "impact_tier"),
            ("document_impact_score", "Document", "impact_score"),
            ("instrument_type", "Instrument", "type"),
            ("client_name", "Client", "name"),
        ] {
            let cypher =
                format!("CREATE INDEX {name} IF NOT EXISTS FOR (n:{label}) ON (n.{prop})");
            self.run(query(&cypher)).await?;
        }
        tracing::info!("graph schema initialized");
        Ok(())
    }

    async fn seed_taxonomy(&self) -> Result<()> {
        for region in schema::REGIONS {
            self.run(
                query(
                    "MERGE (r:Region {guid: $code}) \
                     SET r.code = $code, r.name = $name",
                )
                .param("code", region.code)
                .param("name", region.name),
            )
            .await?;
        }
        for sector in schema::SECTORS {
            self.run(
                query(
                    "MERGE (s:Sector {guid: $code}) \
                     SET s.code = $code, s.name = $name",
                )
                .param("code", sector.code)
                .param("name", sector.name),
            )
            .await?;
        }
        for event in schema::EVENT_TYPES {
            self.run(
                query(
                    "MERGE (e:EventType {guid: $code}) \
                     SET e.code = $code, e.name = $name, e.category = $category, \
                         e.base_impact = $base_impact, e.default_tier = $default_tier",
                )
                .param("code", event.code)
                .param("name", event.name)
                .param("category", event.category)
                .param("base_impact", event.base_impact)
                .param("default_tier", event.default_tier.as_str()),
            )
            .await?;
        }
        for factor in schema::FACTORS {
            self.run(
                query(
                    "MERGE (f:Factor {guid: $id}) \
                     SET f.factor_id = $id, f.name = $name, f.category = $category",
                )
                .param("id", factor.factor_id)
                .param("name", factor.name)
                .param("category", factor.category),
            )
            .await?;
        }
        tracing::info!("graph taxonomy seeded");
        Ok(())
    }

    async fn verify_connectivity(&self) -> Result<()> {
        self.fetch_one(query("RETURN 1 AS one")).await?;
        Ok(())
    }

    async fn upsert_node(&self, label: NodeLabel, guid: &str, props: PropMap) -> Result<()> {
        // First pass computes the SET fragment, second binds it onto the
        // final query text; parameter names are positionally stable.
        let (_, set_fragment) = Self::bind_props(query("RETURN 1"), "n", &props);
        let cypher = if set_fragment.is_empty() {
            format!("MERGE (n:{label} {{guid: $guid}})", label = label.as_str())
        } else {
            format!(
                "MERGE (n:{label} {{guid: $guid}}) SET {set_fragment}",
                label = label.as_str()
            )
        };
        let (q, _) = Self::bind_props(query(&cypher), "n", &props);
        self.run(q.param("guid", guid)).await
    }

    async fn get_node(&self, label: NodeLabel, guid: &str) -> Result<Option<GraphNode>> {
        // Properties come back as a JSON-ish map via apoc-free projection:
        // each caller-facing property is returned through properties(n)
        // serialized on the client side.
        let cypher = format!(
            "MATCH (n:{label} {{guid: $guid}}) RETURN properties(n) AS props",
            label = label.as_str()
        );
        let row = self.fetch_one(query(&cypher).param("guid", guid)).await?;
        let Some(row) = row else { return Ok(None) };
        let props: PropMap = row
            .get::<serde_json::Map<String, Value>>("props")
            .map(|m| m.into_iter().collect())
            .unwrap_or_default();
        Ok(Some(GraphNode { label, guid: guid.to_string(), properties: props }))
    }

    async fn delete_node(&self, label: NodeLabel, guid: &str) -> Result<bool> {
        let cypher = format!(
            "MATCH (n:{label} {{guid: $guid}}) DETACH DELETE n RETURN count(n) AS deleted",
            label = label.as_str()
        );
        let row = self.fetch_one(query(&cypher).param("guid", guid)).await?;
        Ok(row.and_then(|r| r.get::<i64>("deleted").ok()).unwrap_or(0) > 0)
    }

    async fn create_relationship(
        &self,
        rel: RelationType,
        from: (NodeLabel, &str),
        to: (NodeLabel, &str),
        props: PropMap,
    ) -> Result<bool> {
        let cypher = format!(
            "MATCH (a:{from_label} {{guid: $from_guid}}) \
             MATCH (b:{to_label} {{guid: $to_guid}}) \
             MERGE (a)-[r:{rel}]->(b) \
             {set_clause} \
             RETURN count(r) AS linked",
            from_label = from.0.as_str(),
            to_label = to.0.as_str(),
            rel = rel.as_str(),
            set_clause = if props.is_empty() {
                String::new()
            } else {
                let (_, fragment) = Self::bind_props(query("RETURN 1"), "r", &props);
                format!("SET {fragment}")
            },
        );
        let (q, _) = Self::bind_props(query(&cypher), "r", &props);
        let row = self
            .fetch_one(q.param("from_guid", from.1).param("to_guid", to.1))
            .await?;
        Ok(row.and_then(|r| r.get::<i64>("linked").ok()).unwrap_or(0) > 0)
    }

    async fn count_nodes(&self, label: Option<NodeLabel>) -> Result<usize> {
        let cypher = match label {
            Some(label) => format!("MATCH (n:{}) RETURN count(n) AS count", label.as_str()),
            None => "MATCH (n) RETURN count(n) AS count".to_string(),
        };
        let row = self.fetch_one(query(&cypher)).await?;
        Ok(row.and_then(|r| r.get::<i64>("count").ok()).unwrap_or(0) as usize)
    }

    async fn clear(&self) -> Result<()> {
        self.run(query("MATCH (n) DETACH DELETE n")).await
    }

    async fn create_document_node(&self, spec: &DocumentNodeSpec) -> Result<()> {
        let mut props = PropMap::new();
        props.insert("title".into(), Value::from(spec.title.clone()));
        props.insert("language".into(), Value::from(spec.language.clone()));
        props.insert("created_at".into(), Value::from(spec.created_at.to_rfc3339()));
        props.insert("source_guid".into(), Value::from(spec.source_guid.to_string()));
        props.insert("group_guid".into(), Value::from(spec.group_guid.to_string()));
        props.insert("is_duplicate".into(), Value::from(spec.is_duplicate));
        if let Some(score) = spec.impact_score {
            props.insert("impact_score".into(), Value::from(score));
        }
        if let Some(tier) = spec.impact_tier {
            props.insert("impact_tier".into(), Value::from(tier.as_str()));
        }
        if let Some(event) = &spec.event_type {
            props.insert("event_type".into(), Value::from(event.clone()));
        }
        if !spec.themes.is_empty() {
            props.insert("themes".into(), Value::from(spec.themes.clone()));
        }
        if !spec.regions.is_empty() {
            props.insert("regions".into(), Value::from(spec.regions.clone()));
        }
        if !spec.sectors.is_empty() {
            props.insert("sectors".into(), Value::from(spec.sectors.clone()));
        }
        if let Some(hash) = &spec.content_hash {
            props.insert("content_hash".into(), Value::from(hash.clone()));
        }
        if let Some(fingerprint) = &spec.story_fingerprint {
            props.insert("story_fingerprint".into(), Value::from(fingerprint.clone()));
        }
        for (key, value) in &spec.metadata {
            props.insert(format!("meta_{key}"), value.clone());
        }

        let doc_guid = spec.doc_guid.to_string();
        self.upsert_node(NodeLabel::Document, &doc_guid, props).await?;

        // Best-effort: the source or group node may not exist yet, another
        // component will backfill the link.
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
        self.find_document_by_property(group_guid, "content_hash", content_hash).await
    }

    async fn find_document_by_fingerprint(
        &self,
        group_guid: Uuid,
        fingerprint: &str,
    ) -> Result<Option<Uuid>> {
        self.find_document_by_property(group_guid, "story_fingerprint", fingerprint).await
    }

    async fn add_affects_edge(
        &self,
        doc_guid: Uuid,
        target_label: NodeLabel,
        target_guid: &str,
        direction: Direction,
        magnitude: f64,
    ) -> Result<bool> {
        let mut props = PropMap::new();
        props.insert("direction".into(), Value::from(direction.as_str()));
        props.insert("magnitude".into(), Value::from(magnitude));
        self.create_relationship(
            RelationType::Affects,
            (NodeLabel::Document, &doc_guid.to_string()),
            (target_label, target_guid),
            props,
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
        let cypher = format!("MATCH (d:Document {{guid: $guid}}) RETURN {DOC_COLUMNS}");
        let row = self.fetch_one(query(&cypher).param("guid", doc_guid.to_string())).await?;
        Ok(row.as_ref().and_then(row_document_record))
    }

    async fn get_documents_by_source(
        &self,
        source_guid: Uuid,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let cypher = format!(
            "MATCH (d:Document)-[:PRODUCED_BY]->(:Source {{guid: $source}}) \
             RETURN {DOC_COLUMNS} ORDER BY d.created_at DESC LIMIT $limit"
        );
        let rows = self
            .fetch_rows(
                query(&cypher)
                    .param("source", source_guid.to_string())
                    .param("limit", limit as i64),
            )
            .await?;
        Ok(rows.iter().filter_map(row_document_record).collect())
    }

    async fn get_documents_mentioning(
        &self,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>> {
        let cypher = format!(
            "MATCH (d:Document) \
             WHERE (d)-[:AFFECTS]->(:Instrument {{guid: $ticker}}) \
                OR (d)-[:MENTIONS]->(:Company {{guid: $ticker}}) \
             RETURN {DOC_COLUMNS} ORDER BY d.created_at DESC LIMIT $limit"
        );
        let rows = self
            .fetch_rows(query(&cypher).param("ticker", ticker.to_uppercase()).param("limit", limit as i64))
            .await?;
        Ok(rows.iter().filter_map(row_document_record).collect())
    }

    async fn get_related_documents(
        &self,
        doc_guid: Uuid,
        limit: usize,
    ) -> Result<Vec<RelatedDocument>> {
        let mut related: Vec<RelatedDocument> = Vec::new();
        let mut seen: HashSet<Uuid> = HashSet::new();
        seen.insert(doc_guid);

        // Shared companies or instruments.
        let company_cypher = format!(
            "MATCH (d1:Document {{guid: $guid}})-[:MENTIONS|AFFECTS]->(e)\
             <-[:MENTIONS|AFFECTS]-(d:Document) \
             WHERE d1 <> d \
             RETURN DISTINCT {DOC_COLUMNS} LIMIT $limit"
        );
        let rows = self
            .fetch_rows(
                query(&company_cypher)
                    .param("guid", doc_guid.to_string())
                    .param("limit", limit as i64),
            )
            .await?;
        for row in &rows {
            if let Some(record) = row_document_record(row) {
                if seen.insert(record.guid) {
                    related.push(RelatedDocument { record, via: "company".to_string() });
                }
            }
        }

        // Shared source.
        let source_cypher = format!(
            "MATCH (d1:Document {{guid: $guid}})-[:PRODUCED_BY]->(s:Source)\
             <-[:PRODUCED_BY]-(d:Document) \
             WHERE d1 <> d \
             RETURN DISTINCT {DOC_COLUMNS} LIMIT $limit"
        );
        let rows = self
            .fetch_rows(
                query(&source_cypher)
                    .param("guid", doc_guid.to_string())
                    .param("limit", limit as i64),
            )
            .await?;
        for row in &rows {
            if related.len() >= limit {
                break;
            }
            if let Some(record) = row_document_record(row) {
                if seen.insert(record.guid) {
                    related.push(RelatedDocument { record, via: "source".to_string() });
                }
            }
        }

        related.truncate(limit);
        Ok(related)
    }

    async fn lookup_alias(&self, value: &str, scheme: Option<&str>) -> Result<Option<String>> {
        let row = match scheme {
            Some(scheme) => {
                self.fetch_one(
                    query(
                        "MATCH (a:Alias {value_normalized: $value, scheme: $scheme}) \
                         RETURN a.canonical_guid AS canonical LIMIT 1",
                    )
                    .param("value", value.trim().to_lowercase())
                    .param("scheme", scheme.to_uppercase()),
                )
                .await?
            }
            None => {
                self.fetch_one(
                    query(
                        "MATCH (a:Alias {value_normalized: $value}) \
                         RETURN a.canonical_guid AS canonical LIMIT 1",
                    )
                    .param("value", value.trim().to_lowercase()),
                )
                .await?
            }
        };
        Ok(row.and_then(|r| row_opt_str(&r, "canonical")))
    }

    async fn add_alias(&self, value: &str, scheme: &str, canonical_guid: &str) -> Result<()> {
        let scheme = scheme.to_uppercase();
        let guid = format!("{scheme}:{}", value.trim().to_lowercase());
        self.run(
            query(
                "MERGE (a:Alias {guid: $guid}) \
                 SET a.value = $value, a.value_normalized = $normalized, \
                     a.scheme = $scheme, a.canonical_guid = $canonical \
                 WITH a \
                 OPTIONAL MATCH (c {guid: $canonical}) \
                 FOREACH (_ IN CASE WHEN c IS NULL THEN [] ELSE [1] END | \
                     MERGE (c)-[:HAS_ALIAS]->(a))",
            )
            .param("guid", guid)
            .param("value", value)
            .param("normalized", value.trim().to_lowercase())
            .param("scheme", scheme)
            .param("canonical", canonical_guid),
        )
        .await
    }

    async fn upsert_instrument(&self, spec: &InstrumentSpec) -> Result<()> {
        let ticker = spec.ticker.trim().to_uppercase();
        self.run(
            query(
                "MERGE (i:Instrument {guid: $ticker}) \
                 SET i.ticker = $ticker, i.name = $name, i.type = $type, \
                     i.exchange = $exchange, i.currency = $currency, i.country = $country",
            )
            .param("ticker", ticker.as_str())
            .param("name", spec.name.as_str())
            .param("type", spec.instrument_type.clone())
            .param("exchange", spec.exchange.clone())
            .param("currency", spec.currency.clone())
            .param("country", spec.country.clone()),
        )
        .await?;
        self.add_alias(&ticker, "TICKER", &ticker).await
    }

    async fn upsert_company(&self, spec: &CompanySpec) -> Result<()> {
        let ticker = spec.ticker.trim().to_uppercase();
        self.run(
            query(
                "MERGE (c:Company {guid: $ticker}) \
                 SET c.ticker = $ticker, c.name = $name, c.sector = $sector",
            )
            .param("ticker", ticker.as_str())
            .param("name", spec.name.as_str())
            .param("sector", spec.sector.clone()),
        )
        .await?;

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
        self.run(
            query("MERGE (g:Group {guid: $guid}) SET g.name = $name")
                .param("guid", group_guid.to_string())
                .param("name", name),
        )
        .await
    }

    async fn upsert_source_node(&self, source: &Source) -> Result<()> {
        self.run(
            query(
                "MERGE (s:Source {guid: $guid}) \
                 SET s.name = $name, s.type = $type, s.trust_level = $trust, \
                     s.active = $active, s.group_guid = $group \
                 MERGE (g:Group {guid: $group}) \
                 MERGE (s)-[:IN_GROUP]->(g)",
            )
            .param("guid", source.source_guid.to_string())
            .param("name", source.name.as_str())
            .param("type", source.source_type.as_str())
            .param("trust", source.trust_level.as_str())
            .param("active", source.active)
            .param("group", source.group_guid.to_string()),
        )
        .await
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
        let mut props = PropMap::new();
        props.insert("beta".into(), Value::from(beta));
        self.create_relationship(
            RelationType::ExposedTo,
            (NodeLabel::Company, &company_ticker.to_uppercase()),
            (NodeLabel::Factor, factor_id),
            props,
        )
        .await
    }

    async fn upsert_client(&self, client: &Client) -> Result<()> {
        let guid = client.client_guid.to_string();
        self.run(
            query(
                "MERGE (c:Client {guid: $guid}) \
                 SET c.name = $name, c.client_type_code = $type_code, \
                     c.group_guid = $group, c.primary_contact = $contact, \
                     c.alert_frequency = $alert \
                 MERGE (p:Portfolio {guid: $portfolio}) \
                 MERGE (w:Watchlist {guid: $watchlist}) \
                 MERGE (c)-[:HAS_PORTFOLIO]->(p) \
                 MERGE (c)-[:HAS_WATCHLIST]->(w) \
                 WITH c \
                 OPTIONAL MATCH (g:Group {guid: $group}) \
                 FOREACH (_ IN CASE WHEN g IS NULL THEN [] ELSE [1] END | \
                     MERGE (c)-[:IN_GROUP]->(g))",
            )
            .param("guid", guid.as_str())
            .param("name", client.name.as_str())
            .param("type_code", client.client_type_code.clone())
            .param("group", client.group_guid.to_string())
            .param("contact", client.primary_contact.clone())
            .param("alert", client.alert_frequency.clone())
            .param("portfolio", format!("{guid}-portfolio"))
            .param("watchlist", format!("{guid}-watchlist")),
        )
        .await
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
        let row = self
            .fetch_one(
                query(
                    "MATCH (c:Client {guid: $client})-[:HAS_PORTFOLIO]->(p:Portfolio) \
                     MATCH (i:Instrument {guid: $ticker}) \
                     MERGE (p)-[h:HOLDS]->(i) \
                     SET h.weight = $weight, h.sentiment = $sentiment, \
                         h.shares = $shares, h.avg_cost = $avg_cost \
                     RETURN count(h) AS linked",
                )
                .param("client", client_guid.to_string())
                .param("ticker", ticker.to_uppercase())
                .param("weight", weight)
                .param("sentiment", sentiment.map(str::to_uppercase))
                .param("shares", shares)
                .param("avg_cost", avg_cost),
            )
            .await?;
        Ok(row.and_then(|r| r.get::<i64>("linked").ok()).unwrap_or(0) > 0)
    }

    async fn add_watchlist_entry(
        &self,
        client_guid: Uuid,
        ticker: &str,
        alert_threshold: Option<f64>,
    ) -> Result<bool> {
        let row = self
            .fetch_one(
                query(
                    "MATCH (c:Client {guid: $client})-[:HAS_WATCHLIST]->(w:Watchlist) \
                     MATCH (i:Instrument {guid: $ticker}) \
                     MERGE (w)-[r:WATCHES]->(i) \
                     SET r.alert_threshold = $threshold \
                     RETURN count(r) AS linked",
                )
                .param("client", client_guid.to_string())
                .param("ticker", ticker.to_uppercase())
                .param("threshold", alert_threshold),
            )
            .await?;
        Ok(row.and_then(|r| r.get::<i64>("linked").ok()).unwrap_or(0) > 0)
    }

    async fn upsert_client_profile(
        &self,
        client_guid: Uuid,
        profile: &ClientProfile,
    ) -> Result<()> {
        let guid = profile
            .profile_guid
            .map(|g| g.to_string())
            .unwrap_or_else(|| format!("{client_guid}-profile"));
        let restrictions_json = profile
            .restrictions
            .as_ref()
            .map(|r| serde_json::to_string(r).unwrap_or_default());
        let horizon = profile.horizon.map(|h| match h {
            Horizon::Short => "short",
            Horizon::Medium => "medium",
            Horizon::Long => "long",
        });
        let embedding: Vec<f64> =
            profile.mandate_embedding.iter().map(|f| f64::from(*f)).collect();

        self.run(
            query(
                "MATCH (c:Client {guid: $client}) \
                 MERGE (cp:ClientProfile {guid: $guid}) \
                 SET cp.mandate_type = $mandate_type, cp.mandate_text = $mandate_text, \
                     cp.mandate_themes = $themes, cp.mandate_embedding = $embedding, \
                     cp.horizon = $horizon, cp.esg_constrained = $esg, \
                     cp.restrictions = $restrictions, cp.impact_threshold = $threshold, \
                     cp.benchmark = $benchmark, cp.alert_frequency = $alert, \
                     cp.primary_contact = $contact \
                 MERGE (c)-[:HAS_PROFILE]->(cp)",
            )
            .param("client", client_guid.to_string())
            .param("guid", guid)
            .param("mandate_type", profile.mandate_type.clone())
            .param("mandate_text", profile.mandate_text.clone())
            .param("themes", profile.mandate_themes.clone())
            .param("embedding", embedding)
            .param("horizon", horizon)
            .param("esg", profile.esg_constrained)
            .param("restrictions", restrictions_json)
            .param("threshold", profile.impact_threshold)
            .param("benchmark", profile.benchmark.clone())
            .param("alert", profile.alert_frequency.clone())
            .param("contact", profile.primary_contact.clone()),
        )
        .await
    }

    async fn get_client_context(&self, client_guid: Uuid) -> Result<Option<ClientContext>> {
        let row = self
            .fetch_one(
                query(
                    "MATCH (c:Client {guid: $client}) \
                     OPTIONAL MATCH (c)-[:HAS_PROFILE]->(cp:ClientProfile) \
                     OPTIONAL MATCH (c)-[:HAS_PORTFOLIO]->(:Portfolio)-[h:HOLDS]->(hi:Instrument) \
                     OPTIONAL MATCH (c)-[:HAS_WATCHLIST]->(:Watchlist)-[w:WATCHES]->(wi:Instrument) \
                     RETURN c.name AS name, c.client_type_code AS client_type_code, \
                            c.group_guid AS group_guid, c.primary_contact AS primary_contact, \
                            c.alert_frequency AS alert_frequency, \
                            cp.mandate_type AS mandate_type, cp.mandate_text AS mandate_text, \
                            cp.mandate_themes AS mandate_themes, cp.horizon AS horizon, \
                            cp.esg_constrained AS esg_constrained, cp.restrictions AS restrictions, \
                            cp.impact_threshold AS impact_threshold, cp.benchmark AS benchmark, \
                            cp.alert_frequency AS profile_alert_frequency, \
                            cp.primary_contact AS profile_primary_contact, \
                            collect(DISTINCT {ticker: hi.ticker, weight: h.weight, \
                                              sentiment: h.sentiment, shares: h.shares, \
                                              avg_cost: h.avg_cost}) AS holdings, \
                            collect(DISTINCT {ticker: wi.ticker, \
                                              alert_threshold: w.alert_threshold}) AS watchlist, \
                            cp IS NOT NULL AS has_profile",
                )
                .param("client", client_guid.to_string()),
            )
            .await?;
        let Some(row) = row else { return Ok(None) };

        let client = Client {
            client_guid,
            name: row_opt_str(&row, "name").unwrap_or_default(),
            client_type_code: row_opt_str(&row, "client_type_code"),
            group_guid: row_opt_str(&row, "group_guid")
                .and_then(|g| g.parse().ok())
                .unwrap_or_else(Uuid::nil),
            primary_contact: row_opt_str(&row, "primary_contact"),
            alert_frequency: row_opt_str(&row, "alert_frequency"),
        };

        // Entry maps with a null ticker come from the OPTIONAL MATCH
        // producing no rows.
        let holdings: Vec<Holding> = row
            .get::<Vec<serde_json::Map<String, Value>>>("holdings")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                Some(Holding {
                    ticker: m.get("ticker")?.as_str()?.to_string(),
                    weight: m.get("weight").and_then(Value::as_f64).unwrap_or(0.0),
                    sentiment: m.get("sentiment").and_then(Value::as_str).map(str::to_string),
                    shares: m.get("shares").and_then(Value::as_f64),
                    avg_cost: m.get("avg_cost").and_then(Value::as_f64),
                })
            })
            .collect();
        let watchlist: Vec<WatchEntry> = row
            .get::<Vec<serde_json::Map<String, Value>>>("watchlist")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                Some(WatchEntry {
                    ticker: m.get("ticker")?.as_str()?.to_string(),
                    alert_threshold: m.get("alert_threshold").and_then(Value::as_f64),
                })
            })
            .collect();

        let has_profile =
            row.get::<Option<bool>>("has_profile").ok().flatten().unwrap_or(false);
        let profile = has_profile.then(|| ClientProfile {
            profile_guid: None,
            mandate_type: row_opt_str(&row, "mandate_type"),
            mandate_text: row_opt_str(&row, "mandate_text"),
            mandate_themes: row_str_list(&row, "mandate_themes"),
            mandate_embedding: Vec::new(),
            horizon: row_opt_str(&row, "horizon").as_deref().and_then(Horizon::parse),
            esg_constrained: row.get::<Option<bool>>("esg_constrained").ok().flatten(),
            restrictions: row_opt_str(&row, "restrictions")
                .and_then(|raw| Restrictions::from_json(&raw).ok()),
            impact_threshold: row_opt_f64(&row, "impact_threshold"),
            benchmark: row_opt_str(&row, "benchmark"),
            alert_frequency: row_opt_str(&row, "profile_alert_frequency"),
            primary_contact: row_opt_str(&row, "profile_primary_contact"),
        });

        Ok(Some(ClientContext { client, holdings, watchlist, profile }))
    }

    async fn list_clients(&self, group_guid: Option<Uuid>) -> Result<Vec<Client>> {
        let rows = match group_guid {
            Some(group) => {
                self.fetch_rows(
                    query(
                        "MATCH (c:Client {group_guid: $group}) \
                         RETURN c.guid AS guid, c.name AS name, \
                                c.client_type_code AS client_type_code, \
                                c.group_guid AS group_guid, \
                                c.primary_contact AS primary_contact, \
                                c.alert_frequency AS alert_frequency \
                         ORDER BY c.name",
                    )
                    .param("group", group.to_string()),
                )
                .await?
            }
            None => {
                self.fetch_rows(query(
                    "MATCH (c:Client) \
                     RETURN c.guid AS guid, c.name AS name, \
                            c.client_type_code AS client_type_code, \
                            c.group_guid AS group_guid, \
                            c.primary_contact AS primary_contact, \
                            c.alert_frequency AS alert_frequency \
                     ORDER BY c.name",
                ))
                .await?
            }
        };
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(Client {
                    client_guid: row_str(row, "guid")?.parse().ok()?,
                    name: row_opt_str(row, "name").unwrap_or_default(),
                    client_type_code: row_opt_str(row, "client_type_code"),
                    group_guid: row_opt_str(row, "group_guid")
                        .and_then(|g| g.parse().ok())
                        .unwrap_or_else(Uuid::nil),
                    primary_contact: row_opt_str(row, "primary_contact"),
                    alert_frequency: row_opt_str(row, "alert_frequency"),
                })
            })
            .collect())
    }

    async fn documents_affecting(
        &self,
        tickers: &[String],
        group_guids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedCandidate>> {
        let cypher = format!(
            "MATCH (d:Document)-[:AFFECTS]->(i:Instrument) \
             WHERE i.ticker IN $tickers AND d.group_guid IN $groups \
               AND d.created_at >= $since \
             WITH DISTINCT d \
             OPTIONAL MATCH (d)-[:AFFECTS]->(ai:Instrument) \
             OPTIONAL MATCH (ai)-[:ISSUED_BY]->(ac:Company) \
             RETURN {DOC_COLUMNS}, \
                    collect(DISTINCT ai.ticker) AS affected_tickers, \
                    collect(DISTINCT ac.sector) AS affected_sectors \
             ORDER BY d.created_at DESC"
        );
        let tickers: Vec<String> = tickers.iter().map(|t| t.to_uppercase()).collect();
        let groups: Vec<String> = group_guids.iter().map(Uuid::to_string).collect();
        self.feed_rows(
            query(&cypher)
                .param("tickers", tickers)
                .param("groups", groups)
                .param("since", since.to_rfc3339()),
        )
        .await
    }

    async fn documents_with_themes(
        &self,
        themes: &[String],
        group_guids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedCandidate>> {
        let cypher = format!(
            "MATCH (d:Document) \
             WHERE d.group_guid IN $groups AND d.created_at >= $since \
               AND d.themes IS NOT NULL \
               AND any(t IN d.themes WHERE t IN $themes) \
             OPTIONAL MATCH (d)-[:AFFECTS]->(ai:Instrument) \
             OPTIONAL MATCH (ai)-[:ISSUED_BY]->(ac:Company) \
             RETURN {DOC_COLUMNS}, \
                    collect(DISTINCT ai.ticker) AS affected_tickers, \
                    collect(DISTINCT ac.sector) AS affected_sectors \
             ORDER BY d.created_at DESC"
        );
        let groups: Vec<String> = group_guids.iter().map(Uuid::to_string).collect();
        self.feed_rows(
            query(&cypher)
                .param("themes", themes.to_vec())
                .param("groups", groups)
                .param("since", since.to_rfc3339()),
        )
        .await
    }

    async fn instrument_overview(&self, ticker: &str) -> Result<Option<InstrumentOverview>> {
        let row = self
            .fetch_one(
                query(
                    "MATCH (i:Instrument {guid: $ticker}) \
                     OPTIONAL MATCH (i)-[:ISSUED_BY]->(c:Company) \
                     OPTIONAL MATCH (c)-[:PEER_OF]-(peer:Company) \
                     OPTIONAL MATCH (supplier:Company)-[:SUPPLIES_TO]->(c) \
                     OPTIONAL MATCH (c)-[:COMPETES_WITH]-(rival:Company) \
                     OPTIONAL MATCH (c)-[exp:EXPOSED_TO]->(f:Factor) \
                     RETURN c.name AS company_name, c.sector AS sector, \
                            collect(DISTINCT peer.ticker) AS peers, \
                            collect(DISTINCT supplier.ticker) AS suppliers, \
                            collect(DISTINCT rival.ticker) AS competitors, \
                            collect(DISTINCT {factor_id: f.factor_id, beta: exp.beta}) \
                                AS exposures",
                )
                .param("ticker", ticker.to_uppercase()),
            )
            .await?;
        let Some(row) = row else { return Ok(None) };

        let exposures: Vec<FactorExposure> = row
            .get::<Vec<serde_json::Map<String, Value>>>("exposures")
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| {
                Some(FactorExposure {
                    factor_id: m.get("factor_id")?.as_str()?.to_string(),
                    beta: m.get("beta").and_then(Value::as_f64).unwrap_or(0.0),
                })
            })
            .collect();

        Ok(Some(InstrumentOverview {
            ticker: ticker.to_uppercase(),
            company_name: row_opt_str(&row, "company_name"),
            sector: row_opt_str(&row, "sector"),
            peers: row_str_list(&row, "peers"),
            suppliers: row_str_list(&row, "suppliers"),
            competitors: row_str_list(&row, "competitors"),
            factor_exposures: exposures,
        }))
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
        let start = self
            .get_node(label, guid)
            .await?
            .ok_or_else(|| Error::graph(format!("node {label}:{guid} not found")))?;

        let rel_filter = relationship_types
            .map(|types| {
                types.iter().map(RelationType::as_str).collect::<Vec<_>>().join("|")
            })
            .unwrap_or_default();
        let rel_pattern =
            if rel_filter.is_empty() { String::new() } else { format!(":{rel_filter}") };

        // Variable-length patterns cannot be parameterized, but depth is
        // clamped to a small constant range above.
        let cypher = format!(
            "MATCH path = (start:{label} {{guid: $guid}})-[{rel_pattern}*1..{depth}]-(other) \
             WITH relationships(path) AS rels, length(path) AS hops \
             UNWIND rels AS rel \
             RETURN DISTINCT \
                 [l IN labels(startNode(rel)) | l][0] AS from_label, \
                 startNode(rel).guid AS from_guid, \
                 type(rel) AS rel_type, \
                 [l IN labels(endNode(rel)) | l][0] AS to_label, \
                 endNode(rel).guid AS to_guid, \
                 hops \
             LIMIT $limit",
            label = label.as_str(),
        );
        let rows = self
            .fetch_rows(query(&cypher).param("guid", guid).param("limit", limit as i64))
            .await?;

        let mut relationships = Vec::new();
        for row in &rows {
            let (Some(from_label), Some(to_label), Some(rel_type)) = (
                row_opt_str(row, "from_label").as_deref().and_then(NodeLabel::parse),
                row_opt_str(row, "to_label").as_deref().and_then(NodeLabel::parse),
                row_opt_str(row, "rel_type").as_deref().and_then(RelationType::parse),
            ) else {
                continue;
            };
            relationships.push(ExploreRelationship {
                from_label,
                from_guid: row_opt_str(row, "from_guid").unwrap_or_default(),
                relation: rel_type,
                to_label,
                to_guid: row_opt_str(row, "to_guid").unwrap_or_default(),
                depth: row.get::<i64>("hops").unwrap_or(1) as usize,
            });
        }

        let total_found = relationships.len();
        Ok(ExploreResult { start_node: start, relationships, total_found })
    }
}
