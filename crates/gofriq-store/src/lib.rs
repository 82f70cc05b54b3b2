//! File-backed storage for gofr-iq.
//!
//! Three stores live here, all rooted under the configured storage
//! directory:
//!
//! - [`DocumentStore`] — the canonical, immutable document files,
//!   partitioned by group and date. This is the commit point of every
//!   ingest; the vector and graph indexes are projections of it.
//! - [`SourceRegistry`] — news-source records with a per-source JSONL
//!   audit trail and optional mirroring into an attached graph.
//! - [`AuditLog`] — append-only JSONL logs of ingests, queries and
//!   registry changes.

pub mod audit;
pub mod document_store;
pub mod source_registry;

pub use audit::{AuditLog, AuditRecord};
pub use document_store::DocumentStore;
pub use source_registry::{SourceMirror, SourceRegistry, SourceUpdate};
