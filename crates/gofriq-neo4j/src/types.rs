//! Shared graph types: labels, relationship types, node payloads and the
//! record shapes returned by traversals.
//!
//! Identifier conventions: taxonomy and universe nodes use their natural
//! key as the node guid (Instrument/Company → ticker, EventType/Sector/
//! Region → code, Factor → factor_id, Alias → `SCHEME:value`), matching
//! the singleton constraints. Documents, clients, groups and sources use
//! their UUIDs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use gofriq::models::{Client, ClientProfile, Direction, ImpactTier};

/// Free-form property bag attached to nodes and edges.
pub type PropMap = BTreeMap<String, Value>;

/// Node labels of the graph schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeLabel {
    Document,
    Source,
    Instrument,
    Company,
    Client,
    ClientProfile,
    Portfolio,
    Watchlist,
    Factor,
    EventType,
    Sector,
    Region,
    Group,
    Alias,
    ClientType,
    Index,
}

impl NodeLabel {
    /// Cypher label text.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeLabel::Document => "Document",
            NodeLabel::Source => "Source",
            NodeLabel::Instrument => "Instrument",
            NodeLabel::Company => "Company",
            NodeLabel::Client => "Client",
            NodeLabel::ClientProfile => "ClientProfile",
            NodeLabel::Portfolio => "Portfolio",
            NodeLabel::Watchlist => "Watchlist",
            NodeLabel::Factor => "Factor",
            NodeLabel::EventType => "EventType",
            NodeLabel::Sector => "Sector",
            NodeLabel::Region => "Region",
            NodeLabel::Group => "Group",
            NodeLabel::Alias => "Alias",
            NodeLabel::ClientType => "ClientType",
            NodeLabel::Index => "Index",
        }
    }

    /// Every label, for schema initialization.
    #[must_use]
    pub fn all() -> &'static [NodeLabel] {
        &[
            NodeLabel::Document,
            NodeLabel::Source,
            NodeLabel::Instrument,
            NodeLabel::Company,
            NodeLabel::Client,
            NodeLabel::ClientProfile,
            NodeLabel::Portfolio,
            NodeLabel::Watchlist,
            NodeLabel::Factor,
            NodeLabel::EventType,
            NodeLabel::Sector,
            NodeLabel::Region,
            NodeLabel::Group,
            NodeLabel::Alias,
            NodeLabel::ClientType,
            NodeLabel::Index,
        ]
    }

    /// Parse a label name (used by the explore tool input).
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        NodeLabel::all().iter().copied().find(|l| l.as_str().eq_ignore_ascii_case(value))
    }
}

impl std::fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relationship types of the graph schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationType {
    /// Document → Instrument/Factor, carries direction and magnitude.
    Affects,
    /// Instrument → Company.
    IssuedBy,
    /// Portfolio → Instrument, carries weight/sentiment.
    Holds,
    /// Watchlist → Instrument, may carry an alert threshold.
    Watches,
    /// Company → Factor, carries a signed beta.
    ExposedTo,
    /// Company ↔ Company.
    PeerOf,
    /// Company → Company.
    SuppliesTo,
    /// Company ↔ Company.
    CompetesWith,
    /// Document/Source/Client → Group.
    InGroup,
    /// Client → ClientProfile.
    HasProfile,
    /// Client → Portfolio.
    HasPortfolio,
    /// Client → Watchlist.
    HasWatchlist,
    /// Document → Company.
    Mentions,
    /// Document → EventType.
    TriggeredBy,
    /// Canonical entity → Alias.
    HasAlias,
    /// Document → Source.
    ProducedBy,
    /// Company → Sector, Document → Region.
    BelongsTo,
}

impl RelationType {
    /// Cypher relationship type text.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::Affects => "AFFECTS",
            RelationType::IssuedBy => "ISSUED_BY",
            RelationType::Holds => "HOLDS",
            RelationType::Watches => "WATCHES",
            RelationType::ExposedTo => "EXPOSED_TO",
            RelationType::PeerOf => "PEER_OF",
            RelationType::SuppliesTo => "SUPPLIES_TO",
            RelationType::CompetesWith => "COMPETES_WITH",
            RelationType::InGroup => "IN_GROUP",
            RelationType::HasProfile => "HAS_PROFILE",
            RelationType::HasPortfolio => "HAS_PORTFOLIO",
            RelationType::HasWatchlist => "HAS_WATCHLIST",
            RelationType::Mentions => "MENTIONS",
            RelationType::TriggeredBy => "TRIGGERED_BY",
            RelationType::HasAlias => "HAS_ALIAS",
            RelationType::ProducedBy => "PRODUCED_BY",
            RelationType::BelongsTo => "BELONGS_TO",
        }
    }

    /// Parse a relationship type name.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        [
            RelationType::Affects,
            RelationType::IssuedBy,
            RelationType::Holds,
            RelationType::Watches,
            RelationType::ExposedTo,
            RelationType::PeerOf,
            RelationType::SuppliesTo,
            RelationType::CompetesWith,
            RelationType::InGroup,
            RelationType::HasProfile,
            RelationType::HasPortfolio,
            RelationType::HasWatchlist,
            RelationType::Mentions,
            RelationType::TriggeredBy,
            RelationType::HasAlias,
            RelationType::ProducedBy,
            RelationType::BelongsTo,
        ]
        .into_iter()
        .find(|r| r.as_str().eq_ignore_ascii_case(value))
    }
}

impl std::fmt::Display for RelationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generic node as returned by lookups and explorations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub label: NodeLabel,
    pub guid: String,
    #[serde(default)]
    pub properties: PropMap,
}

/// Everything needed to create a Document node with its best-effort
/// PRODUCED_BY / IN_GROUP links.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentNodeSpec {
    pub doc_guid: Uuid,
    pub source_guid: Uuid,
    pub group_guid: Uuid,
    pub title: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub impact_score: Option<f64>,
    pub impact_tier: Option<ImpactTier>,
    pub event_type: Option<String>,
    pub themes: Vec<String>,
    pub regions: Vec<String>,
    pub sectors: Vec<String>,
    pub content_hash: Option<String>,
    pub story_fingerprint: Option<String>,
    pub is_duplicate: bool,
    pub metadata: PropMap,
}

/// Projection of a Document node used by query enrichment and listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub guid: Uuid,
    pub title: String,
    pub source_guid: Option<Uuid>,
    pub group_guid: Option<Uuid>,
    pub language: String,
    pub created_at: Option<DateTime<Utc>>,
    pub impact_score: Option<f64>,
    pub impact_tier: Option<ImpactTier>,
    pub event_type: Option<String>,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub sectors: Vec<String>,
    #[serde(default)]
    pub is_duplicate: bool,
}

/// A document reached through graph expansion, with the path kind that
/// surfaced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelatedDocument {
    pub record: DocumentRecord,
    /// `company` or `source`.
    pub via: String,
}

/// A candidate story for the avatar feed, with the graph context the
/// channels need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedCandidate {
    pub record: DocumentRecord,
    /// Tickers of every instrument the document AFFECTS.
    #[serde(default)]
    pub affected_tickers: Vec<String>,
    /// Sectors of the issuing companies behind those instruments.
    #[serde(default)]
    pub affected_sectors: Vec<String>,
}

/// A portfolio position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub ticker: String,
    pub weight: f64,
    #[serde(default)]
    pub sentiment: Option<String>,
    #[serde(default)]
    pub shares: Option<f64>,
    #[serde(default)]
    pub avg_cost: Option<f64>,
}

/// A watchlist entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub ticker: String,
    #[serde(default)]
    pub alert_threshold: Option<f64>,
}

/// One traversal batch of everything the feed needs about a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientContext {
    pub client: Client,
    #[serde(default)]
    pub holdings: Vec<Holding>,
    #[serde(default)]
    pub watchlist: Vec<WatchEntry>,
    #[serde(default)]
    pub profile: Option<ClientProfile>,
}

impl ClientContext {
    /// Holdings ∪ watchlist tickers.
    #[must_use]
    pub fn position_tickers(&self) -> Vec<String> {
        let mut tickers: Vec<String> =
            self.holdings.iter().map(|h| h.ticker.clone()).collect();
        for entry in &self.watchlist {
            if !tickers.contains(&entry.ticker) {
                tickers.push(entry.ticker.clone());
            }
        }
        tickers
    }

    /// 1.0 for a held ticker, 0.5 for a watched-only ticker, None
    /// otherwise.
    #[must_use]
    pub fn position_weight(&self, ticker: &str) -> Option<f64> {
        if self.holdings.iter().any(|h| h.ticker == ticker) {
            Some(1.0)
        } else if self.watchlist.iter().any(|w| w.ticker == ticker) {
            Some(0.5)
        } else {
            None
        }
    }
}

/// An edge surfaced by the explore tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreRelationship {
    pub from_label: NodeLabel,
    pub from_guid: String,
    pub relation: RelationType,
    pub to_label: NodeLabel,
    pub to_guid: String,
    /// Hops from the start node (1-based).
    pub depth: usize,
}

/// Result of a bounded graph exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreResult {
    pub start_node: GraphNode,
    pub relationships: Vec<ExploreRelationship>,
    pub total_found: usize,
}

/// Instrument universe entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub instrument_type: Option<String>,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// Company universe entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanySpec {
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// A factor exposure of a company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorExposure {
    pub factor_id: String,
    pub beta: f64,
}

/// Consolidated market context around one instrument.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentOverview {
    pub ticker: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub sector: Option<String>,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default)]
    pub suppliers: Vec<String>,
    #[serde(default)]
    pub competitors: Vec<String>,
    #[serde(default)]
    pub factor_exposures: Vec<FactorExposure>,
}

/// An AFFECTS edge payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffectsEdge {
    pub direction: Direction,
    pub magnitude: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_parse() {
        assert_eq!(NodeLabel::parse("document"), Some(NodeLabel::Document));
        assert_eq!(NodeLabel::parse("Instrument"), Some(NodeLabel::Instrument));
        assert_eq!(NodeLabel::parse("Widget"), None);
    }

    #[test]
    fn test_relation_parse() {
        assert_eq!(RelationType::parse("affects"), Some(RelationType::Affects));
        assert_eq!(RelationType::parse("SUPPLIES_TO"), Some(RelationType::SuppliesTo));
        assert_eq!(RelationType::parse("LIKES"), None);
    }

    #[test]
    fn test_position_tickers_union() {
        let ctx = ClientContext {
            client: Client {
                client_guid: Uuid::new_v4(),
                name: "Quantum".into(),
                client_type_code: None,
                group_guid: Uuid::new_v4(),
                primary_contact: None,
                alert_frequency: None,
            },
            holdings: vec![Holding {
                ticker: "TRUCK".into(),
                weight: 1.0,
                sentiment: None,
                shares: None,
                avg_cost: None,
            }],
            watchlist: vec![
                WatchEntry { ticker: "TRUCK".into(), alert_threshold: None },
                WatchEntry { ticker: "FIN".into(), alert_threshold: Some(50.0) },
            ],
            profile: None,
        };
        assert_eq!(ctx.position_tickers(), vec!["TRUCK".to_string(), "FIN".to_string()]);
        assert_eq!(ctx.position_weight("TRUCK"), Some(1.0));
        assert_eq!(ctx.position_weight("FIN"), Some(0.5));
        assert_eq!(ctx.position_weight("OMNI"), None);
    }
}
