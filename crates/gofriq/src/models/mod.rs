//! Domain models: documents, sources, groups, clients and query types.

pub mod client;
pub mod document;
pub mod extraction;
pub mod group;
pub mod query;
pub mod source;

pub use client::{Client, ClientProfile, EthicalSector, Horizon, Restrictions};
pub use document::{count_words, validate_word_count, Document, ImpactTier, MAX_WORD_COUNT};
pub use extraction::{Direction, EventDetection, ExtractionResult, InstrumentMention};
pub use group::{Group, ADMIN_GROUP, PUBLIC_GROUP};
pub use query::{DiscoveredVia, QueryFilters, QueryResponse, QueryResult, ScoringWeights};
pub use source::{Source, SourceType, TrustLevel};
