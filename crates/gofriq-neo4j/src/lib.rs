//! Typed property-graph index for gofr-iq.
//!
//! The graph holds the relationship fabric of the system: documents and
//! what they affect, the instrument/company universe with its
//! supplier/competitor/peer links, clients with their portfolios,
//! watchlists and profiles, and the taxonomy of sectors, regions, event
//! types and macro factors.
//!
//! [`GraphStore`] is the capability seam. Two implementations ship:
//! [`Neo4jGraph`] speaks Bolt to a real Neo4j instance, and
//! [`MemoryGraph`] backs embedded deployments and the test suite.

pub mod alias;
pub mod graph_store;
pub mod memory_graph;
pub mod mirror;
pub mod neo4j_graph;
pub mod schema;
pub mod types;
pub mod universe;

pub use alias::AliasResolver;
pub use graph_store::GraphStore;
pub use memory_graph::MemoryGraph;
pub use mirror::GraphSourceMirror;
pub use neo4j_graph::Neo4jGraph;
pub use types::{
    ClientContext, CompanySpec, DocumentNodeSpec, DocumentRecord, ExploreResult, FeedCandidate,
    GraphNode, Holding, InstrumentOverview, InstrumentSpec, NodeLabel, PropMap, RelatedDocument,
    RelationType, WatchEntry,
};
