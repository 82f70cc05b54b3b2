//! The graph capability seam.
//!
//! Services depend on this trait, never on a concrete backend. The Bolt
//! implementation lives in [`crate::neo4j_graph`], the in-memory one in
//! [`crate::memory_graph`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use gofriq::models::{Client, ClientProfile, Direction, Source};
use gofriq::Result;

use crate::types::{
    ClientContext, CompanySpec, DocumentNodeSpec, DocumentRecord, ExploreResult, FeedCandidate,
    GraphNode, InstrumentOverview, InstrumentSpec, NodeLabel, PropMap, RelatedDocument,
    RelationType,
};

/// Typed property-graph operations over the gofr-iq schema.
#[async_trait]
pub trait GraphStore: Send + Sync {
    // ---- lifecycle ----

    /// Create uniqueness constraints and property indexes. Idempotent.
    async fn init_schema(&self) -> Result<()>;

    /// Merge the core taxonomy (regions, sectors, event types, macro
    /// factors) by stable code. Idempotent.
    async fn seed_taxonomy(&self) -> Result<()>;

    /// Cheap connectivity probe for health checks.
    async fn verify_connectivity(&self) -> Result<()>;

    // ---- generic node/edge operations ----

    /// Merge a node by `(label, guid)`, overwriting the given properties.
    async fn upsert_node(&self, label: NodeLabel, guid: &str, props: PropMap) -> Result<()>;

    /// Fetch a node.
    async fn get_node(&self, label: NodeLabel, guid: &str) -> Result<Option<GraphNode>>;

    /// Detach-delete a node. Returns whether anything was removed.
    async fn delete_node(&self, label: NodeLabel, guid: &str) -> Result<bool>;

    /// Merge a relationship between two existing nodes. Returns `false`
    /// (without creating anything) when either endpoint is missing.
    async fn create_relationship(
        &self,
        rel: RelationType,
        from: (NodeLabel, &str),
        to: (NodeLabel, &str),
        props: PropMap,
    ) -> Result<bool>;

    /// Count nodes, optionally of one label.
    async fn count_nodes(&self, label: Option<NodeLabel>) -> Result<usize>;

    /// Delete every node and relationship. Test/reset tooling only.
    async fn clear(&self) -> Result<()>;

    // ---- documents ----

    /// Create the Document node and attempt PRODUCED_BY → Source and
    /// IN_GROUP → Group links. Missing targets are skipped silently
    /// (another component backfills them).
    async fn create_document_node(&self, spec: &DocumentNodeSpec) -> Result<()>;

    /// Exact-duplicate lookup: any document in the group with this
    /// content hash. Returns the earliest matching guid.
    async fn find_document_by_content_hash(
        &self,
        group_guid: Uuid,
        content_hash: &str,
    ) -> Result<Option<Uuid>>;

    /// Near-duplicate lookup by story fingerprint within the group.
    async fn find_document_by_fingerprint(
        &self,
        group_guid: Uuid,
        fingerprint: &str,
    ) -> Result<Option<Uuid>>;

    /// AFFECTS edge to an Instrument or Factor node (by guid).
    async fn add_affects_edge(
        &self,
        doc_guid: Uuid,
        target_label: NodeLabel,
        target_guid: &str,
        direction: Direction,
        magnitude: f64,
    ) -> Result<bool>;

    /// TRIGGERED_BY edge to an EventType node.
    async fn add_triggered_by_edge(&self, doc_guid: Uuid, event_code: &str) -> Result<bool>;

    /// MENTIONS edge to a Company node.
    async fn add_mentions_edge(&self, doc_guid: Uuid, company_guid: &str) -> Result<bool>;

    /// Projection of one Document node.
    async fn get_document_record(&self, doc_guid: Uuid) -> Result<Option<DocumentRecord>>;

    /// Documents produced by a source, newest first.
    async fn get_documents_by_source(
        &self,
        source_guid: Uuid,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>>;

    /// Documents whose AFFECTS or MENTIONS reach the given ticker, newest
    /// first.
    async fn get_documents_mentioning(
        &self,
        ticker: &str,
        limit: usize,
    ) -> Result<Vec<DocumentRecord>>;

    /// Documents related through shared companies or a shared source,
    /// deduplicated.
    async fn get_related_documents(
        &self,
        doc_guid: Uuid,
        limit: usize,
    ) -> Result<Vec<RelatedDocument>>;

    // ---- aliases ----

    /// Find the canonical guid behind an alias value (and scheme, when
    /// given). Values are matched case-insensitively.
    async fn lookup_alias(&self, value: &str, scheme: Option<&str>) -> Result<Option<String>>;

    /// Register an alias for a canonical entity.
    async fn add_alias(&self, value: &str, scheme: &str, canonical_guid: &str) -> Result<()>;

    // ---- universe ----

    /// Merge an Instrument node (guid = ticker) and a TICKER alias.
    async fn upsert_instrument(&self, spec: &InstrumentSpec) -> Result<()>;

    /// Merge a Company node (guid = ticker), its ISSUED_BY link from the
    /// instrument, a BELONGS_TO link to its sector, and NAME_VARIANT
    /// aliases.
    async fn upsert_company(&self, spec: &CompanySpec) -> Result<()>;

    /// Merge a Group node.
    async fn upsert_group_node(&self, group_guid: Uuid, name: &str) -> Result<()>;

    /// Mirror a Source record (including `active`) into the graph.
    async fn upsert_source_node(&self, source: &Source) -> Result<()>;

    /// Company-to-company relation (PEER_OF, SUPPLIES_TO, COMPETES_WITH).
    async fn relate_companies(
        &self,
        rel: RelationType,
        from_ticker: &str,
        to_ticker: &str,
    ) -> Result<bool>;

    /// EXPOSED_TO edge with a signed beta.
    async fn set_factor_exposure(
        &self,
        company_ticker: &str,
        factor_id: &str,
        beta: f64,
    ) -> Result<bool>;

    // ---- clients ----

    /// Merge a Client node with its IN_GROUP link, plus its (empty)
    /// Portfolio and Watchlist.
    async fn upsert_client(&self, client: &Client) -> Result<()>;

    /// HOLDS edge from the client's portfolio to an instrument.
    async fn add_portfolio_holding(
        &self,
        client_guid: Uuid,
        ticker: &str,
        weight: f64,
        sentiment: Option<&str>,
        shares: Option<f64>,
        avg_cost: Option<f64>,
    ) -> Result<bool>;

    /// WATCHES edge from the client's watchlist to an instrument.
    async fn add_watchlist_entry(
        &self,
        client_guid: Uuid,
        ticker: &str,
        alert_threshold: Option<f64>,
    ) -> Result<bool>;

    /// Merge the HAS_PROFILE-linked ClientProfile node.
    async fn upsert_client_profile(
        &self,
        client_guid: Uuid,
        profile: &ClientProfile,
    ) -> Result<()>;

    /// One traversal batch: client, holdings, watchlist and profile.
    async fn get_client_context(&self, client_guid: Uuid) -> Result<Option<ClientContext>>;

    /// Clients, optionally restricted to one group.
    async fn list_clients(&self, group_guid: Option<Uuid>) -> Result<Vec<Client>>;

    // ---- feed traversals ----

    /// Documents in the permitted groups created since `since` that
    /// AFFECT at least one of `tickers`.
    async fn documents_affecting(
        &self,
        tickers: &[String],
        group_guids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedCandidate>>;

    /// Documents in the permitted groups created since `since` carrying
    /// at least one of `themes`.
    async fn documents_with_themes(
        &self,
        themes: &[String],
        group_guids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<Vec<FeedCandidate>>;

    // ---- market context / exploration ----

    /// Consolidated context around one instrument: issuer, sector,
    /// peers, suppliers, competitors and factor exposures.
    async fn instrument_overview(&self, ticker: &str) -> Result<Option<InstrumentOverview>>;

    /// Bounded breadth-first exploration from a node, following the
    /// given relationship types (all when `None`), up to `max_depth` ≤ 3.
    async fn explore(
        &self,
        label: NodeLabel,
        guid: &str,
        relationship_types: Option<&[RelationType]>,
        max_depth: usize,
        limit: usize,
    ) -> Result<ExploreResult>;
}
